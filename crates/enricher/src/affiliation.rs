use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use collector::client::is_unauthorized;
use collector::DataFetcher;
use common::time::format_date;
use db::{DbError, DeveloperRow, Repositories};
use normalizer::UserPayload;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::canonical::Canonicalizer;
use crate::download::{download_rosters, RosterSource};
use crate::roster::{parse_roster, RosterDeveloper};

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("username mismatch: roster has `{roster}`, remote returned `{remote}`")]
    UsernameMismatch { roster: String, remote: String },
    #[error("remote profile lookup failed for {login}")]
    Remote {
        login: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Store(#[from] DbError),
}

impl MergeError {
    /// Errors that abort the whole pass instead of one developer.
    pub fn is_fatal(&self) -> bool {
        match self {
            MergeError::Store(_) => true,
            MergeError::Remote { source, .. } => is_unauthorized(source),
            MergeError::UsernameMismatch { .. } => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichSummary {
    pub roster_files: usize,
    pub roster_developers: usize,
    pub matched: usize,
    pub updated: usize,
    pub skipped: usize,
    pub entities_cleaned: u64,
}

/// `@acme-corp ` -> `acme-corp`
fn company_name(profile: &UserPayload) -> Option<String> {
    let company = profile.company.as_deref()?.trim().trim_start_matches('@').trim();
    (!company.is_empty()).then(|| company.to_string())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Combines the stored developer, the remote profile and the roster entry.
///
/// Entity precedence is latest roster affiliation, then profile company, then
/// the stored value. Email precedence is stored, then profile, then the first
/// roster identity.
pub fn merge_developer(
    existing: &DeveloperRow,
    profile: Option<&UserPayload>,
    roster: &RosterDeveloper,
    canon: &Canonicalizer,
    now: DateTime<Utc>,
) -> DeveloperRow {
    let entity = roster
        .latest_affiliation()
        .map(|a| a.entity.clone())
        .or_else(|| profile.and_then(company_name))
        .unwrap_or_else(|| existing.entity.clone());

    let email = non_empty(Some(&existing.email))
        .or_else(|| profile.and_then(|p| non_empty(p.email.as_deref())))
        .or_else(|| roster.identities.first().cloned())
        .unwrap_or_default();

    let pick = |remote: Option<&str>, stored: &str| non_empty(remote).unwrap_or_else(|| stored.to_string());

    DeveloperRow {
        username: existing.username.clone(),
        id: profile.map(|p| p.id).filter(|id| *id != 0).unwrap_or(existing.id),
        full_name: pick(profile.and_then(|p| p.name.as_deref()), &existing.full_name),
        email,
        avatar: pick(profile.and_then(|p| p.avatar_url.as_deref()), &existing.avatar),
        url: pick(profile.and_then(|p| p.html_url.as_deref()), &existing.url),
        entity: canon.canonicalize(&entity),
        location: pick(profile.and_then(|p| p.location.as_deref()), &existing.location),
        update_date: format_date(&now),
    }
}

/// Folds roster affiliations and remote profiles into stored developers.
pub struct AffiliationMerger {
    store: Arc<dyn Repositories>,
    fetcher: Arc<dyn DataFetcher>,
    canon: Canonicalizer,
}

impl AffiliationMerger {
    pub async fn new(
        store: Arc<dyn Repositories>,
        fetcher: Arc<dyn DataFetcher>,
    ) -> Result<Self, DbError> {
        let canon = Canonicalizer::load(store.as_ref()).await?;
        Ok(Self {
            store,
            fetcher,
            canon,
        })
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canon
    }

    /// Download, merge and clean up in one go.
    pub async fn enrich(
        &self,
        source: &dyn RosterSource,
        urls: &[String],
    ) -> anyhow::Result<EnrichSummary> {
        let files = download_rosters(source, urls).await?;
        let roster: Vec<RosterDeveloper> = files.iter().flat_map(|f| parse_roster(f)).collect();
        let mut summary = self.merge(&roster).await.context("merge affiliations")?;
        summary.roster_files = files.len();
        summary.entities_cleaned = self
            .cleanup_entities()
            .await
            .context("clean up entities")?;
        Ok(summary)
    }

    /// Merges every roster developer that is already in the store.
    #[instrument(skip_all, fields(roster = roster.len()))]
    pub async fn merge(&self, roster: &[RosterDeveloper]) -> Result<EnrichSummary, MergeError> {
        let known: HashMap<String, String> = self
            .store
            .developers()
            .usernames()
            .await?
            .into_iter()
            .map(|name| (name.to_lowercase(), name))
            .collect();

        let mut summary = EnrichSummary {
            roster_developers: roster.len(),
            ..EnrichSummary::default()
        };
        for entry in roster {
            let Some(username) = known.get(&entry.username.to_lowercase()) else {
                continue;
            };
            summary.matched += 1;
            match self.merge_one(username, entry).await {
                Ok(true) => summary.updated += 1,
                Ok(false) => summary.skipped += 1,
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    warn!(username = %username, error = %err, "developer enrichment skipped");
                    summary.skipped += 1;
                }
            }
        }
        info!(
            matched = summary.matched,
            updated = summary.updated,
            skipped = summary.skipped,
            "affiliations merged"
        );
        Ok(summary)
    }

    async fn merge_one(&self, username: &str, entry: &RosterDeveloper) -> Result<bool, MergeError> {
        let Some(existing) = self.store.developers().get(username).await? else {
            return Ok(false);
        };
        let profile = self
            .fetcher
            .fetch_user(username)
            .await
            .map_err(|source| MergeError::Remote {
                login: username.to_string(),
                source,
            })?;
        if let Some(profile) = &profile {
            if !profile.login.eq_ignore_ascii_case(username) {
                return Err(MergeError::UsernameMismatch {
                    roster: username.to_string(),
                    remote: profile.login.clone(),
                });
            }
        }

        let merged = merge_developer(&existing, profile.as_ref(), entry, &self.canon, Utc::now());
        debug!(username, entity = %merged.entity, "developer merged");
        self.store.developers().upsert(merged).await?;
        Ok(true)
    }

    /// Re-canonicalizes every stored entity; returns developers changed.
    pub async fn cleanup_entities(&self) -> Result<u64, DbError> {
        let updates: Vec<(String, String)> = self
            .store
            .developers()
            .entities()
            .await?
            .into_iter()
            .filter_map(|(username, entity)| {
                let canonical = self.canon.canonicalize(&entity);
                (canonical != entity).then_some((username, canonical))
            })
            .collect();
        if updates.is_empty() {
            return Ok(0);
        }
        let changed = self.store.developers().update_entities(updates).await?;
        info!(changed, "entities canonicalized");
        Ok(changed)
    }
}
