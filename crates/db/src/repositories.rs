use async_trait::async_trait;

use crate::errors::Result;
use crate::models::{
    BatchOutcome, CadenceRow, DeveloperDetails, DeveloperListItem, DeveloperQuery, DeveloperRow,
    DownloadsRow, DurationRow, EntityDetails, EntityListItem, EventRow, EventSearch,
    ForkActivityRow, ImportBatch, LocalActivity, LookupKind, LookupRow, MonthTypeCount,
    NamedCount, PageState, PrReviewRow, ReleaseAssetRow, ReleaseRow, RepoEventCount, RepoMetaRow,
    ReputationRow, ReputationUpdate, RetentionRow, Scope, SubstitutionRow, TagDownloadsRow,
};

#[async_trait]
pub trait DeveloperRepository: Send + Sync {
    async fn upsert(&self, developer: DeveloperRow) -> Result<()>;
    async fn get(&self, username: &str) -> Result<Option<DeveloperRow>>;
    async fn list(&self, query: DeveloperQuery) -> Result<Vec<DeveloperListItem>>;
    async fn details(&self, username: &str) -> Result<Option<DeveloperDetails>>;
    async fn usernames(&self) -> Result<Vec<String>>;
    /// `(username, entity)` for every developer with a non-empty entity.
    async fn entities(&self) -> Result<Vec<(String, String)>>;
    /// Rewrites entities in one transaction; returns rows changed.
    async fn update_entities(&self, updates: Vec<(String, String)>) -> Result<u64>;
    async fn list_entities(&self, limit: i64) -> Result<Vec<EntityListItem>>;
    async fn entity_details(&self, entity: &str, limit: i64) -> Result<Option<EntityDetails>>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn search(&self, search: EventSearch) -> Result<Vec<EventRow>>;
    async fn count(&self) -> Result<i64>;
    /// Distinct `(org, repo)` pairs seen in the event table.
    async fn repositories(&self) -> Result<Vec<(String, String)>>;
    async fn orgs(&self) -> Result<Vec<String>>;
    async fn org_repos(&self, org: &str, limit: i64) -> Result<Vec<RepoEventCount>>;
    async fn min_date(&self, org: Option<&str>, repo: Option<&str>) -> Result<Option<String>>;
    async fn lookup(&self, kind: LookupKind, query: &str, limit: i64) -> Result<Vec<LookupRow>>;
}

#[async_trait]
pub trait StateRepository: Send + Sync {
    async fn get(&self, stream: &str, org: &str, repo: &str, default_since: &str)
        -> Result<PageState>;
    async fn save(&self, stream: &str, org: &str, repo: &str, state: PageState) -> Result<()>;
    async fn clear(&self, org: &str, repo: &str) -> Result<u64>;
}

#[async_trait]
pub trait ReleaseRepository: Send + Sync {
    async fn upsert_releases(
        &self,
        releases: Vec<ReleaseRow>,
        assets: Vec<ReleaseAssetRow>,
    ) -> Result<()>;
    async fn upsert_repo_meta(&self, meta: RepoMetaRow) -> Result<()>;
    async fn list_repo_meta(&self, org: Option<&str>, repo: Option<&str>)
        -> Result<Vec<RepoMetaRow>>;
    async fn assets(&self, org: &str, repo: &str, tag: &str) -> Result<Vec<ReleaseAssetRow>>;
}

#[async_trait]
pub trait SubstitutionRepository: Send + Sync {
    /// Records the substitution and applies it; returns developers updated.
    async fn save_and_apply(&self, kind: &str, old: &str, new: &str) -> Result<u64>;
    /// Reapplies every stored substitution in insertion order.
    async fn apply_all(&self) -> Result<u64>;
    async fn list(&self) -> Result<Vec<SubstitutionRow>>;
}

#[async_trait]
pub trait ReputationRepository: Send + Sync {
    /// Non-bot developers with no score or a score older than `stale_before`.
    async fn needing_refresh(&self, stale_before: &str, bot_suffix: &str) -> Result<Vec<String>>;
    async fn get(&self, username: &str) -> Result<Option<ReputationRow>>;
    async fn save(&self, update: ReputationUpdate) -> Result<()>;
    async fn list(&self, scope: Scope, limit: i64) -> Result<Vec<ReputationRow>>;
    async fn local_activity(&self, username: &str) -> Result<LocalActivity>;
}

/// Raw aggregates behind the dashboard insights.
#[async_trait]
pub trait InsightRepository: Send + Sync {
    async fn developer_event_counts(&self, scope: Scope) -> Result<Vec<NamedCount>>;
    async fn entity_event_counts(&self, scope: Scope) -> Result<Vec<NamedCount>>;
    async fn event_type_series(&self, scope: Scope) -> Result<Vec<MonthTypeCount>>;
    async fn retention(&self, scope: Scope) -> Result<Vec<RetentionRow>>;
    async fn time_to_merge(&self, scope: Scope) -> Result<Vec<DurationRow>>;
    async fn time_to_close(&self, scope: Scope) -> Result<Vec<DurationRow>>;
    async fn pr_review_counts(&self, scope: Scope) -> Result<Vec<PrReviewRow>>;
    async fn forks_and_activity(&self, scope: Scope) -> Result<Vec<ForkActivityRow>>;
    async fn release_cadence(&self, scope: Scope) -> Result<Vec<CadenceRow>>;
    async fn release_downloads(&self, scope: Scope) -> Result<Vec<DownloadsRow>>;
    async fn release_downloads_by_tag(&self, scope: Scope) -> Result<Vec<TagDownloadsRow>>;
}

#[async_trait]
pub trait ImportRepository: Send + Sync {
    /// Developers, events and cursors in a single transaction.
    async fn commit_batch(&self, batch: ImportBatch) -> Result<BatchOutcome>;
}

pub trait Repositories: Send + Sync {
    fn developers(&self) -> &dyn DeveloperRepository;
    fn events(&self) -> &dyn EventRepository;
    fn states(&self) -> &dyn StateRepository;
    fn releases(&self) -> &dyn ReleaseRepository;
    fn substitutions(&self) -> &dyn SubstitutionRepository;
    fn reputation(&self) -> &dyn ReputationRepository;
    fn insights(&self) -> &dyn InsightRepository;
    fn imports(&self) -> &dyn ImportRepository;
}
