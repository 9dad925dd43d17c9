use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::domain::EventType;
use db::{ReleaseAssetRow, ReleaseRow, RepoMetaRow};
use gh_broker::ResponseMeta;
use normalizer::{NormalizedEvent, UserPayload};

pub mod rest;

pub use rest::RestDataFetcher;

/// Typed reads the importer, enricher and reputation scorer need from the remote.
#[async_trait]
pub trait DataFetcher: Send + Sync {
    /// One page of the `kind` stream. `since` is ignored by streams without a server-side filter.
    async fn fetch_events(
        &self,
        kind: EventType,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        page: u32,
        per_page: u32,
    ) -> Result<EventPage>;

    /// Every release with its assets, all pages.
    async fn fetch_releases(&self, owner: &str, repo: &str) -> Result<ReleaseBatch>;

    async fn fetch_repo_meta(&self, owner: &str, repo: &str) -> Result<RepoMetaRow>;

    /// `None` when the user does not exist (404).
    async fn fetch_user(&self, login: &str) -> Result<Option<UserPayload>>;

    async fn is_org_member(&self, org: &str, login: &str) -> Result<bool>;

    async fn fetch_org_repos(&self, org: &str) -> Result<Vec<OrgRepo>>;
}

#[derive(Debug, Clone)]
pub struct EventPage {
    pub items: Vec<NormalizedEvent>,
    /// Items on the remote page, including those skipped during normalization.
    pub raw_count: usize,
    pub meta: ResponseMeta,
}

impl EventPage {
    pub fn is_empty(&self) -> bool {
        self.raw_count == 0
    }

    pub fn next_page(&self) -> u32 {
        self.meta.next_page
    }

    /// Creation times of the first and last item on the page.
    pub fn bounds(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.items.first()?.created_at;
        let last = self.items.last()?.created_at;
        Some((first, last))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReleaseBatch {
    pub releases: Vec<ReleaseRow>,
    pub assets: Vec<ReleaseAssetRow>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgRepo {
    pub name: String,
    pub archived: bool,
}
