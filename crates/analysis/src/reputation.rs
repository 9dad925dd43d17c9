use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use collector::DataFetcher;
use common::config::ReputationConfig;
use common::time::{format_ts, parse_ts};
use db::{DbError, ReputationRow, ReputationUpdate, Repositories, Scope};
use normalizer::UserPayload;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::scorer::{compute_score, ScoreOutcome};
use crate::signals::Signals;

#[derive(Debug, thiserror::Error)]
pub enum ReputationError {
    #[error("developer not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] DbError),
    #[error("remote lookup failed: {0}")]
    Remote(#[source] anyhow::Error),
    #[error("stored signals for {username} are unreadable")]
    Signals {
        username: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReputationReport {
    pub username: String,
    pub score: f64,
    pub deep: bool,
    pub updated_at: String,
    pub cached: bool,
    pub signals: Signals,
    pub categories: Vec<crate::scorer::CategoryScore>,
}

impl ReputationReport {
    fn new(username: &str, outcome: ScoreOutcome, signals: Signals, deep: bool, updated_at: String) -> Self {
        Self {
            username: username.to_string(),
            score: outcome.score,
            deep,
            updated_at,
            cached: false,
            signals,
            categories: outcome.categories,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSummary {
    pub scored: usize,
    pub failed: usize,
}

/// `@Acme-Corp ` -> `acme-corp`
fn company_key(profile: &UserPayload) -> Option<String> {
    let company = profile.company.as_deref()?.trim().trim_start_matches('@').trim().to_lowercase();
    (!company.is_empty()).then_some(company)
}

pub struct ReputationService {
    store: Arc<dyn Repositories>,
    fetcher: Arc<dyn DataFetcher>,
    ttl: Duration,
    bot_suffix: String,
}

impl ReputationService {
    pub fn new(
        store: Arc<dyn Repositories>,
        fetcher: Arc<dyn DataFetcher>,
        config: &ReputationConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            ttl: Duration::hours(config.ttl_hours.max(0)),
            bot_suffix: config.bot_suffix.clone(),
        }
    }

    fn is_fresh(&self, row: &ReputationRow, now: DateTime<Utc>) -> bool {
        row.reputation_updated_at
            .as_deref()
            .and_then(parse_ts)
            .is_some_and(|updated| now - updated < self.ttl)
    }

    /// Shallow scores for every non-bot developer with a missing or stale score.
    #[instrument(skip(self))]
    pub async fn refresh_shallow(&self) -> Result<RefreshSummary, DbError> {
        let now = Utc::now();
        let stale_before = format_ts(&(now - self.ttl));
        let usernames = self
            .store
            .reputation()
            .needing_refresh(&stale_before, &self.bot_suffix)
            .await?;

        let mut summary = RefreshSummary::default();
        for username in usernames {
            match self.score_shallow(&username, now).await {
                Ok(_) => summary.scored += 1,
                Err(err @ DbError::NotFound(_)) => {
                    warn!(username = %username, error = %err, "shallow score skipped");
                    summary.failed += 1;
                }
                Err(err) => return Err(err),
            }
        }
        info!(scored = summary.scored, failed = summary.failed, "shallow reputation refreshed");
        Ok(summary)
    }

    async fn score_shallow(&self, username: &str, now: DateTime<Utc>) -> Result<ReputationReport, DbError> {
        let activity = self.store.reputation().local_activity(username).await?;
        let signals = Signals::from_local(&activity, now.date_naive());
        let outcome = compute_score(&signals);
        let report = ReputationReport::new(username, outcome, signals, false, format_ts(&now));
        self.save(&report).await?;
        Ok(report)
    }

    /// Local signals plus the remote profile; always recomputed and stored.
    #[instrument(skip(self))]
    pub async fn score_deep(&self, username: &str) -> Result<ReputationReport, ReputationError> {
        let now = Utc::now();
        if self.store.developers().get(username).await?.is_none() {
            return Err(ReputationError::NotFound(username.to_string()));
        }
        let profile = self
            .fetcher
            .fetch_user(username)
            .await
            .map_err(ReputationError::Remote)?
            .ok_or_else(|| ReputationError::NotFound(username.to_string()))?;

        let org_member = self.org_member(&profile).await?;
        let activity = self.store.reputation().local_activity(username).await?;
        let signals = Signals::from_local(&activity, now.date_naive()).with_profile(&profile, org_member, now);
        let outcome = compute_score(&signals);
        let report = ReputationReport::new(username, outcome, signals, true, format_ts(&now));
        self.save(&report).await?;
        debug!(score = report.score, org_member, "deep score computed");
        Ok(report)
    }

    /// Cached deep score when younger than the TTL, otherwise a fresh one.
    pub async fn get_or_compute_deep(&self, username: &str) -> Result<ReputationReport, ReputationError> {
        let row = self
            .store
            .reputation()
            .get(username)
            .await?
            .ok_or_else(|| ReputationError::NotFound(username.to_string()))?;

        if row.reputation_deep && self.is_fresh(&row, Utc::now()) {
            if let (Some(score), Some(raw)) = (row.reputation, row.reputation_signals.as_deref()) {
                let signals: Signals = serde_json::from_str(raw).map_err(|source| ReputationError::Signals {
                    username: username.to_string(),
                    source,
                })?;
                let outcome = compute_score(&signals);
                return Ok(ReputationReport {
                    score,
                    cached: true,
                    ..ReputationReport::new(
                        username,
                        outcome,
                        signals,
                        true,
                        row.reputation_updated_at.clone().unwrap_or_default(),
                    )
                });
            }
        }
        self.score_deep(username).await
    }

    pub async fn list(&self, scope: Scope, limit: i64) -> Result<Vec<ReputationRow>, DbError> {
        self.store.reputation().list(scope, limit).await
    }

    /// Profile company naming a known org wins; otherwise ask each org in turn.
    async fn org_member(&self, profile: &UserPayload) -> Result<bool, ReputationError> {
        let orgs = self.store.events().orgs().await?;
        if let Some(company) = company_key(profile) {
            if orgs.iter().any(|org| org.to_lowercase() == company) {
                return Ok(true);
            }
        }
        for org in &orgs {
            let member = self
                .fetcher
                .is_org_member(org, &profile.login)
                .await
                .map_err(ReputationError::Remote)?;
            if member {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn save(&self, report: &ReputationReport) -> Result<(), DbError> {
        let signals = serde_json::to_value(&report.signals)
            .map_err(|err| DbError::InvalidData(err.to_string()))?;
        self.store
            .reputation()
            .save(ReputationUpdate {
                username: report.username.clone(),
                score: report.score,
                updated_at: report.updated_at.clone(),
                deep: report.deep,
                signals,
            })
            .await
    }
}
