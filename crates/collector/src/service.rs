use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use common::config::ImporterConfig;
use common::domain::EventType;
use common::time::{date_start, format_date, parse_date, window_start};
use db::{DbError, PageState, Repositories, StateKey};
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::batch::SharedBatch;
use crate::client::is_unauthorized;
use crate::fetcher::{DataFetcher, EventPage};
use crate::metrics::{self, ActiveRepoGuard};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("remote authorization failed: {0}")]
    Unauthorized(String),
    #[error("remote request failed: {0:#}")]
    Remote(#[source] anyhow::Error),
    #[error("store error: {0}")]
    Store(#[from] DbError),
    #[error("import cancelled")]
    Cancelled,
}

impl ImportError {
    fn from_remote(err: anyhow::Error) -> Self {
        if is_unauthorized(&err) {
            ImportError::Unauthorized(format!("{err:#}"))
        } else {
            ImportError::Remote(err)
        }
    }

    /// Errors that stop the whole run rather than one stream or repository.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ImportError::Unauthorized(_) | ImportError::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct RepoTarget {
    pub org: String,
    pub repo: String,
}

impl RepoTarget {
    pub fn new(org: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            repo: repo.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepoSummary {
    pub org: String,
    pub repo: String,
    /// Events fetched and normalized per event type.
    pub events: BTreeMap<String, u64>,
    /// Events that were new to the store.
    pub inserted: u64,
    pub releases: usize,
    pub assets: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportSummary {
    pub repositories: Vec<RepoSummary>,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub months: u32,
    pub per_page: u32,
    pub batch_size: usize,
    pub fresh: bool,
}

impl From<&ImporterConfig> for ImportOptions {
    fn from(config: &ImporterConfig) -> Self {
        Self {
            months: config.months,
            per_page: config.page_size,
            batch_size: config.batch_size,
            fresh: false,
        }
    }
}

/// Window shared by every stream of one repository run.
#[derive(Debug, Clone, Copy)]
struct RunWindow {
    started: DateTime<Utc>,
    lower: DateTime<Utc>,
}

pub struct Importer {
    fetcher: Arc<dyn DataFetcher>,
    store: Arc<dyn Repositories>,
    options: ImportOptions,
    cancel: CancellationToken,
}

impl Importer {
    pub fn new(
        fetcher: Arc<dyn DataFetcher>,
        store: Arc<dyn Repositories>,
        options: ImportOptions,
    ) -> Self {
        Self {
            fetcher,
            store,
            options,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Explicit repositories, every non-archived repository of `org`, or
    /// (with no org) every repository already present in the store.
    pub async fn resolve_targets(
        &self,
        org: Option<&str>,
        repos: &[String],
    ) -> anyhow::Result<Vec<RepoTarget>> {
        let Some(org) = org.filter(|o| !o.trim().is_empty()) else {
            if !repos.is_empty() {
                bail!("repositories {repos:?} were given without an organization");
            }
            let known = self
                .store
                .events()
                .repositories()
                .await
                .context("loading known repositories")?;
            return Ok(known
                .into_iter()
                .map(|(org, repo)| RepoTarget::new(org, repo))
                .collect());
        };

        if !repos.is_empty() {
            return Ok(repos.iter().map(|repo| RepoTarget::new(org, repo.as_str())).collect());
        }

        let listed = self
            .fetcher
            .fetch_org_repos(org)
            .await
            .with_context(|| format!("listing repositories of {org}"))?;
        Ok(listed
            .into_iter()
            .filter(|repo| !repo.archived)
            .map(|repo| RepoTarget::new(org, repo.name))
            .collect())
    }

    /// Imports every target in order.
    ///
    /// A failing repository is recorded and the run moves on; authorization
    /// failures and cancellation stop the run.
    #[instrument(skip(self, targets), fields(targets = targets.len()))]
    pub async fn run(&self, targets: &[RepoTarget]) -> Result<ImportSummary, ImportError> {
        if self.options.fresh {
            for target in targets {
                let cleared = self.store.states().clear(&target.org, &target.repo).await?;
                info!(org = %target.org, repo = %target.repo, cleared, "cleared stream state");
            }
        }

        let mut summary = ImportSummary::default();
        for target in targets {
            let started = Instant::now();
            match self.import_repo(target).await {
                Ok(repo_summary) => {
                    metrics::REPOS_PROCESSED_TOTAL
                        .with_label_values(&["success"])
                        .inc();
                    metrics::REPO_DURATION
                        .with_label_values(&["success"])
                        .observe(started.elapsed().as_secs_f64());
                    summary.repositories.push(repo_summary);
                }
                Err(err) if err.is_fatal() => {
                    metrics::REPOS_PROCESSED_TOTAL
                        .with_label_values(&["aborted"])
                        .inc();
                    return Err(err);
                }
                Err(err) => {
                    metrics::REPOS_PROCESSED_TOTAL
                        .with_label_values(&["error"])
                        .inc();
                    metrics::REPO_DURATION
                        .with_label_values(&["error"])
                        .observe(started.elapsed().as_secs_f64());
                    warn!(
                        org = %target.org,
                        repo = %target.repo,
                        error = %err,
                        "failed to import repository"
                    );
                    summary.failed += 1;
                    summary.repositories.push(RepoSummary {
                        org: target.org.clone(),
                        repo: target.repo.clone(),
                        errors: vec![err.to_string()],
                        ..RepoSummary::default()
                    });
                }
            }
        }
        Ok(summary)
    }

    /// Event streams, then forks, then releases and repository metadata.
    #[instrument(skip(self), fields(org = %target.org, repo = %target.repo))]
    pub async fn import_repo(&self, target: &RepoTarget) -> Result<RepoSummary, ImportError> {
        let _active = ActiveRepoGuard::new();
        let now = Utc::now();
        let window = RunWindow {
            started: now,
            lower: window_start(now, self.options.months),
        };
        let batch = SharedBatch::new(self.store.clone(), self.options.batch_size);
        let mut summary = RepoSummary {
            org: target.org.clone(),
            repo: target.repo.clone(),
            ..RepoSummary::default()
        };
        info!("importing repository");

        let streams = EventType::CONCURRENT
            .iter()
            .map(|kind| self.run_stream(*kind, target, &batch, window));
        let results = join_all(streams).await;
        batch.flush().await?;
        for (kind, outcome) in EventType::CONCURRENT.iter().copied().zip(results) {
            record_stream(kind, outcome, &mut summary)?;
        }

        let fork = self.run_stream(EventType::Fork, target, &batch, window).await;
        batch.flush().await?;
        record_stream(EventType::Fork, fork, &mut summary)?;
        summary.inserted = batch.totals().await.events_inserted;

        self.import_releases(target, &mut summary).await?;
        self.import_repo_meta(target, &mut summary).await?;

        info!(
            inserted = summary.inserted,
            releases = summary.releases,
            errors = summary.errors.len(),
            "repository imported"
        );
        Ok(summary)
    }

    /// Walks one stream from its stored cursor; returns the number of events appended.
    #[instrument(skip(self, target, batch, window), fields(stream = %kind))]
    async fn run_stream(
        &self,
        kind: EventType,
        target: &RepoTarget,
        batch: &SharedBatch,
        window: RunWindow,
    ) -> Result<u64, ImportError> {
        let key = StateKey {
            stream: kind.as_str().to_string(),
            org: target.org.clone(),
            repo: target.repo.clone(),
        };
        let state = self
            .store
            .states()
            .get(&key.stream, &key.org, &key.repo, &format_date(&window.lower))
            .await?;
        let lower = parse_date(&state.since)
            .map(date_start)
            .map_or(window.lower, |since| since.max(window.lower));
        let since = kind.supports_since().then_some(lower);
        // A resumed pass never saw the newest pages, so its watermark stays put
        // until a pass starting from page 1 completes.
        let finished = if state.page > 1 {
            PageState::new(1, state.since.clone())
        } else {
            PageState::new(1, format_date(&window.started))
        };

        let mut page = u32::try_from(state.page.max(1)).unwrap_or(1);
        let mut appended = 0u64;
        loop {
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ImportError::Cancelled),
                result = self.fetcher.fetch_events(
                    kind,
                    &target.org,
                    &target.repo,
                    since,
                    page,
                    self.options.per_page,
                ) => result.map_err(ImportError::from_remote)?,
            };

            if fetched.is_empty() || is_past_window(kind, &fetched, lower) {
                batch.append(&key, Vec::new(), finished.clone()).await?;
                break;
            }

            let next = fetched.next_page();
            let count = fetched.items.len() as u64;
            let cursor = if next == 0 {
                finished.clone()
            } else {
                PageState::new(i64::from(next), state.since.clone())
            };
            batch.append(&key, fetched.items, cursor).await?;
            appended += count;

            if next == 0 {
                break;
            }
            page = next;
        }
        Ok(appended)
    }

    async fn import_releases(
        &self,
        target: &RepoTarget,
        summary: &mut RepoSummary,
    ) -> Result<(), ImportError> {
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ImportError::Cancelled),
            result = self.fetcher.fetch_releases(&target.org, &target.repo) => result,
        };
        match fetched.map_err(ImportError::from_remote) {
            Ok(releases) => {
                summary.releases = releases.releases.len();
                summary.assets = releases.assets.len();
                self.store
                    .releases()
                    .upsert_releases(releases.releases, releases.assets)
                    .await?;
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(error = %err, "release import failed");
                summary.errors.push(format!("releases: {err}"));
                Ok(())
            }
        }
    }

    async fn import_repo_meta(
        &self,
        target: &RepoTarget,
        summary: &mut RepoSummary,
    ) -> Result<(), ImportError> {
        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ImportError::Cancelled),
            result = self.fetcher.fetch_repo_meta(&target.org, &target.repo) => result,
        };
        match fetched.map_err(ImportError::from_remote) {
            Ok(meta) => {
                self.store.releases().upsert_repo_meta(meta).await?;
                Ok(())
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                warn!(error = %err, "repository metadata import failed");
                summary.errors.push(format!("repo_meta: {err}"));
                Ok(())
            }
        }
    }
}

/// Folds one stream outcome into the summary; store and fatal errors end the repository.
fn record_stream(
    kind: EventType,
    outcome: Result<u64, ImportError>,
    summary: &mut RepoSummary,
) -> Result<(), ImportError> {
    match outcome {
        Ok(fetched) => {
            summary.events.insert(kind.as_str().to_string(), fetched);
            Ok(())
        }
        Err(err) if err.is_fatal() => Err(err),
        Err(ImportError::Store(err)) => Err(ImportError::Store(err)),
        Err(err) => {
            metrics::STREAM_ERRORS_TOTAL
                .with_label_values(&[kind.as_str()])
                .inc();
            warn!(stream = %kind, error = %err, "stream aborted");
            summary.errors.push(format!("{kind}: {err}"));
            Ok(())
        }
    }
}

/// Streams without a server-side `since` filter stop once a whole page predates the window.
fn is_past_window(kind: EventType, page: &EventPage, lower: DateTime<Utc>) -> bool {
    if kind.supports_since() {
        return false;
    }
    page.bounds()
        .map(|(first, last)| first < lower && last < lower)
        .unwrap_or(false)
}
