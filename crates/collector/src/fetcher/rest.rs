use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::domain::EventType;
use db::RepoMetaRow;
use http::StatusCode;
use normalizer::{normalize_release, normalize_repo, normalize_value, ReleasePayload, RepoPayload, UserPayload};
use serde::Deserialize;
use tracing::warn;

use crate::client::{status_of, GithubClient, Page};
use crate::fetcher::{DataFetcher, EventPage, OrgRepo, ReleaseBatch};
use crate::metrics;

const LISTING_PAGE_SIZE: u32 = 100;
/// Upper bound on pages walked by the unbounded listings (releases, org repos).
const MAX_LISTING_PAGES: u32 = 1000;

pub struct RestDataFetcher {
    client: Arc<dyn GithubClient>,
}

impl RestDataFetcher {
    pub fn new(client: Arc<dyn GithubClient>) -> Self {
        Self { client }
    }

    async fn list_page(
        &self,
        kind: EventType,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        page: u32,
        per_page: u32,
    ) -> Result<Page> {
        match kind {
            EventType::PullRequest => self.client.list_pull_requests(owner, repo, page, per_page).await,
            EventType::PullRequestReview => {
                self.client
                    .list_review_comments(owner, repo, since, page, per_page)
                    .await
            }
            EventType::Issue => self.client.list_issues(owner, repo, since, page, per_page).await,
            EventType::IssueComment => {
                self.client
                    .list_issue_comments(owner, repo, since, page, per_page)
                    .await
            }
            EventType::Fork => self.client.list_forks(owner, repo, page, per_page).await,
        }
    }
}

/// Times `fut` and records the outcome under `op`.
async fn observed<T, F>(op: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = fut.await;
    let outcome = if result.is_ok() { "success" } else { "error" };
    metrics::FETCH_REQUESTS_TOTAL
        .with_label_values(&[op, outcome])
        .inc();
    metrics::FETCH_LATENCY_SECONDS
        .with_label_values(&[op])
        .observe(start.elapsed().as_secs_f64());
    result
}

#[derive(Deserialize)]
struct OrgRepoPayload {
    name: String,
    #[serde(default)]
    archived: bool,
}

#[async_trait]
impl DataFetcher for RestDataFetcher {
    async fn fetch_events(
        &self,
        kind: EventType,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        page: u32,
        per_page: u32,
    ) -> Result<EventPage> {
        let raw = observed(
            kind.as_str(),
            self.list_page(kind, owner, repo, since, page, per_page),
        )
        .await?;

        let now = Utc::now();
        let mut items = Vec::with_capacity(raw.items.len());
        for value in &raw.items {
            match normalize_value(kind, owner, repo, value, now) {
                Ok(Some(item)) => items.push(item),
                Ok(None) => {}
                Err(err) => warn!(
                    kind = %kind,
                    owner = %owner,
                    repo = %repo,
                    error = ?err,
                    "skipping undecodable item"
                ),
            }
        }

        metrics::FETCH_ITEMS_TOTAL
            .with_label_values(&[kind.as_str()])
            .inc_by(items.len() as u64);
        Ok(EventPage {
            items,
            raw_count: raw.items.len(),
            meta: raw.meta,
        })
    }

    async fn fetch_releases(&self, owner: &str, repo: &str) -> Result<ReleaseBatch> {
        let mut batch = ReleaseBatch::default();
        let mut page = 1;
        while page > 0 && page <= MAX_LISTING_PAGES {
            let raw = observed(
                "releases",
                self.client.list_releases(owner, repo, page, LISTING_PAGE_SIZE),
            )
            .await?;
            if raw.is_empty() {
                break;
            }
            for value in raw.items {
                let payload: ReleasePayload =
                    serde_json::from_value(value).context("decoding release payload")?;
                if let Some((release, assets)) = normalize_release(owner, repo, &payload) {
                    batch.releases.push(release);
                    batch.assets.extend(assets);
                }
            }
            page = raw.meta.next_page;
        }
        Ok(batch)
    }

    async fn fetch_repo_meta(&self, owner: &str, repo: &str) -> Result<RepoMetaRow> {
        let value = observed("repo", self.client.get_repo(owner, repo)).await?;
        let payload: RepoPayload = serde_json::from_value(value).context("decoding repo payload")?;
        Ok(normalize_repo(owner, repo, &payload))
    }

    async fn fetch_user(&self, login: &str) -> Result<Option<UserPayload>> {
        match observed("user", self.client.get_user(login)).await {
            Ok(value) => {
                let payload: UserPayload =
                    serde_json::from_value(value).context("decoding user payload")?;
                Ok(Some(payload))
            }
            Err(err) if status_of(&err) == Some(StatusCode::NOT_FOUND) => {
                metrics::USERS_404_SKIPS_TOTAL.inc();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn is_org_member(&self, org: &str, login: &str) -> Result<bool> {
        observed("membership", self.client.is_org_member(org, login)).await
    }

    async fn fetch_org_repos(&self, org: &str) -> Result<Vec<OrgRepo>> {
        let mut repos = Vec::new();
        let mut page = 1;
        while page > 0 && page <= MAX_LISTING_PAGES {
            let raw = observed(
                "org_repos",
                self.client.list_org_repos(org, page, LISTING_PAGE_SIZE),
            )
            .await?;
            if raw.is_empty() {
                break;
            }
            for value in raw.items {
                let payload: OrgRepoPayload =
                    serde_json::from_value(value).context("decoding org repository")?;
                repos.push(OrgRepo {
                    name: payload.name,
                    archived: payload.archived,
                });
            }
            page = raw.meta.next_page;
        }
        Ok(repos)
    }
}
