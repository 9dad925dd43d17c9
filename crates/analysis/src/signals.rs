use chrono::{DateTime, NaiveDate, Utc};
use common::time::parse_date;
use db::LocalActivity;
use normalizer::UserPayload;
use serde::{Deserialize, Serialize};

/// Scoring inputs. Local fields come from the store; the rest need the remote profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Signals {
    pub commits: i64,
    pub total_commits: i64,
    pub total_contributors: i64,
    pub last_commit_days: Option<i64>,
    pub prs: i64,
    pub merged_prs: i64,

    pub age_days: Option<i64>,
    pub followers: i64,
    pub following: i64,
    pub public_repos: i64,
    pub private_repos: i64,
    pub strong_auth: bool,
    pub suspended: bool,
    pub org_member: bool,
}

impl Signals {
    pub fn from_local(activity: &LocalActivity, today: NaiveDate) -> Self {
        let last_commit_days = activity
            .last_commit_date
            .as_deref()
            .and_then(parse_date)
            .map(|last| (today - last).num_days().max(0));
        Self {
            commits: activity.commits,
            total_commits: activity.total_commits,
            total_contributors: activity.total_contributors,
            last_commit_days,
            prs: activity.prs,
            merged_prs: activity.merged_prs,
            ..Self::default()
        }
    }

    pub fn with_profile(mut self, profile: &UserPayload, org_member: bool, now: DateTime<Utc>) -> Self {
        self.age_days = profile.created_at.map(|created| (now - created).num_days().max(0));
        self.followers = profile.followers;
        self.following = profile.following;
        self.public_repos = profile.public_repos;
        self.private_repos = profile.owned_private_repos.unwrap_or(0);
        self.strong_auth = profile.two_factor_authentication.unwrap_or(false);
        self.suspended = profile.suspended_at.is_some();
        self.org_member = org_member;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_signals_count_days_since_last_event() {
        let activity = LocalActivity {
            commits: 4,
            total_commits: 40,
            total_contributors: 5,
            last_commit_date: Some("2025-03-01".into()),
            prs: 2,
            merged_prs: 1,
        };
        let today = NaiveDate::from_ymd_opt(2025, 3, 11).unwrap();
        let signals = Signals::from_local(&activity, today);
        assert_eq!(signals.last_commit_days, Some(10));
        assert_eq!(signals.age_days, None);
        assert!(!signals.strong_auth);
    }
}
