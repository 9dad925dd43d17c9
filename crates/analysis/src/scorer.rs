use serde::{Deserialize, Serialize};

use crate::signals::Signals;

pub const WEIGHT_PROVENANCE: f64 = 0.35;
pub const WEIGHT_ACCOUNT_AGE: f64 = 0.15;
pub const WEIGHT_ORG_MEMBER: f64 = 0.10;
pub const WEIGHT_PROPORTION: f64 = 0.15;
pub const WEIGHT_RECENCY: f64 = 0.10;
pub const WEIGHT_FOLLOWERS: f64 = 0.10;
pub const WEIGHT_REPOS: f64 = 0.05;

const AGE_CEILING_DAYS: f64 = 730.0;
const FOLLOWER_RATIO_CEILING: f64 = 10.0;
const REPO_COUNT_CEILING: f64 = 30.0;
const MAX_HALF_LIFE_DAYS: f64 = 90.0;
const MIN_PROPORTION_CEILING: f64 = 0.05;
const STRONG_AUTH_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub name: String,
    pub value: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    pub score: f64,
    pub categories: Vec<CategoryScore>,
}

impl ScoreOutcome {
    fn new() -> Self {
        Self {
            score: 0.0,
            categories: Vec::new(),
        }
    }

    fn push(&mut self, name: &str, value: f64, weight: f64) {
        let value = value.clamp(0.0, 1.0);
        self.score += value * weight;
        self.categories.push(CategoryScore {
            name: name.to_string(),
            value,
            weight,
        });
    }

    fn finish(mut self) -> Self {
        self.score = round2(self.score.clamp(0.0, 1.0));
        self
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `min(1, value / ceiling)` when both are positive, else 0.
pub fn clamped_ratio(value: f64, ceiling: f64) -> f64 {
    if value <= 0.0 || ceiling <= 0.0 {
        return 0.0;
    }
    (value / ceiling).min(1.0)
}

pub fn log_curve(value: f64, ceiling: f64) -> f64 {
    if value <= 0.0 || ceiling <= 0.0 {
        return 0.0;
    }
    ((1.0 + value).ln() / (1.0 + ceiling).ln()).clamp(0.0, 1.0)
}

pub fn exp_decay(value: f64, half_life: f64) -> f64 {
    if value <= 0.0 {
        return 1.0;
    }
    (-value * std::f64::consts::LN_2 / half_life).exp()
}

fn proportion(signals: &Signals) -> f64 {
    if signals.total_commits <= 0 {
        return 0.0;
    }
    signals.commits as f64 / signals.total_commits as f64
}

/// `max(1/n, 0.05)`; with no contributors `1/n` is unbounded, so every share clamps to zero.
fn proportion_ceiling(total_contributors: i64) -> f64 {
    if total_contributors <= 0 {
        return f64::INFINITY;
    }
    (1.0 / total_contributors as f64).max(MIN_PROPORTION_CEILING)
}

fn confidence(signals: &Signals) -> f64 {
    let expected = (signals.total_contributors as f64 * 10.0).max(30.0);
    (signals.total_commits.max(0) as f64 / expected).min(1.0)
}

/// Recency half-life shrinks as the contributor base grows, never above 90 days.
fn half_life(total_contributors: i64) -> f64 {
    let contributors = total_contributors.max(0) as f64;
    let log = (1.0 + contributors).ln();
    if log <= 0.0 {
        return MAX_HALF_LIFE_DAYS;
    }
    (MAX_HALF_LIFE_DAYS * (1.0 / log).max(0.25)).min(MAX_HALF_LIFE_DAYS)
}

/// Merged share of the developer's pull requests, weighted down for
/// heavy contributors without strong authentication.
fn provenance(signals: &Signals, share: f64) -> f64 {
    let verified = clamped_ratio(signals.merged_prs as f64, signals.prs as f64);
    if signals.strong_auth {
        if signals.commits > 0 {
            return verified.max(STRONG_AUTH_FLOOR);
        }
        return verified;
    }
    verified * (1.0 - 0.5 * share)
}

/// Risk-weighted reputation in `[0, 1]`, rounded to two decimals.
pub fn compute_score(signals: &Signals) -> ScoreOutcome {
    let mut outcome = ScoreOutcome::new();
    if signals.suspended {
        return outcome.finish();
    }

    let share = clamped_ratio(proportion(signals), proportion_ceiling(signals.total_contributors));
    outcome.push("provenance", provenance(signals, share), WEIGHT_PROVENANCE);

    let age = signals.age_days.map_or(0.0, |days| log_curve(days as f64, AGE_CEILING_DAYS));
    outcome.push("account_age", age, WEIGHT_ACCOUNT_AGE);
    outcome.push("org_member", if signals.org_member { 1.0 } else { 0.0 }, WEIGHT_ORG_MEMBER);
    outcome.push("proportion", share * confidence(signals), WEIGHT_PROPORTION);

    let recency = signals.last_commit_days.map_or(0.0, |days| {
        exp_decay(days as f64, half_life(signals.total_contributors))
    });
    outcome.push("recency", recency, WEIGHT_RECENCY);

    let follower_ratio = signals.followers.max(0) as f64 / signals.following.max(1) as f64;
    outcome.push("followers", log_curve(follower_ratio, FOLLOWER_RATIO_CEILING), WEIGHT_FOLLOWERS);

    let repos = (signals.public_repos.max(0) + signals.private_repos.max(0)) as f64;
    outcome.push("repositories", log_curve(repos, REPO_COUNT_CEILING), WEIGHT_REPOS);

    outcome.finish()
}
