use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DeveloperRow {
    pub username: String,
    pub id: i64,
    pub full_name: String,
    pub email: String,
    pub avatar: String,
    pub url: String,
    pub entity: String,
    pub location: String,
    pub update_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeveloperListItem {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub entity: String,
    pub events: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RepoEventCount {
    pub org: String,
    pub repo: String,
    pub events: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeveloperDetails {
    pub developer: DeveloperRow,
    pub reputation: Option<ReputationRow>,
    pub repos: Vec<RepoEventCount>,
}

#[derive(Debug, Clone, Default)]
pub struct DeveloperQuery {
    pub username: Option<String>,
    pub entity: Option<String>,
    pub limit: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EntityListItem {
    pub entity: String,
    pub developers: i64,
    pub events: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDetails {
    pub entity: String,
    pub developers: Vec<DeveloperListItem>,
    pub repos: Vec<RepoEventCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct EventRow {
    pub id: i64,
    pub org: String,
    pub repo: String,
    pub username: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub event_type: String,
    pub date: String,
    pub state: String,
    pub number: i64,
    pub created_at: Option<String>,
    pub closed_at: Option<String>,
    pub merged_at: Option<String>,
    pub url: String,
    pub mentions: String,
    pub labels: String,
    pub additions: i64,
    pub deletions: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSearch {
    pub org: Option<String>,
    pub repo: Option<String>,
    pub username: Option<String>,
    pub entity: Option<String>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
    pub from_date: Option<String>,
    pub mention: Option<String>,
    pub label: Option<String>,
    pub page: i64,
    pub page_size: i64,
}

pub const MAX_PAGE_SIZE: i64 = 500;
pub const DEFAULT_PAGE_SIZE: i64 = 100;

impl EventSearch {
    /// Unset sizes fall back to the default; anything else is clamped to `1..=500`.
    pub fn clamped_page_size(&self) -> i64 {
        if self.page_size <= 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.page_size.min(MAX_PAGE_SIZE)
        }
    }

    /// Saturates for absurd page numbers; such pages are simply empty.
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1).saturating_mul(self.clamped_page_size())
    }
}

/// Resumable cursor for one `(stream, org, repo)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PageState {
    pub page: i64,
    pub since: String,
}

impl PageState {
    pub fn new(page: i64, since: impl Into<String>) -> Self {
        Self {
            page: page.max(1),
            since: since.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StateKey {
    pub stream: String,
    pub org: String,
    pub repo: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReleaseRow {
    pub org: String,
    pub repo: String,
    pub tag: String,
    pub name: String,
    pub published_at: String,
    pub prerelease: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReleaseAssetRow {
    pub org: String,
    pub repo: String,
    pub tag: String,
    pub name: String,
    pub content_type: String,
    pub size: i64,
    pub download_count: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RepoMetaRow {
    pub org: String,
    pub repo: String,
    pub stars: i64,
    pub forks: i64,
    pub open_issues: i64,
    pub language: String,
    pub license: String,
    pub archived: bool,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct SubstitutionRow {
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: String,
    pub old: String,
    pub new: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct ReputationRow {
    pub username: String,
    pub reputation: Option<f64>,
    pub reputation_updated_at: Option<String>,
    pub reputation_deep: bool,
    pub reputation_signals: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReputationUpdate {
    pub username: String,
    pub score: f64,
    pub updated_at: String,
    pub deep: bool,
    pub signals: serde_json::Value,
}

/// Local activity used for shallow reputation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LocalActivity {
    pub commits: i64,
    pub total_commits: i64,
    pub total_contributors: i64,
    pub last_commit_date: Option<String>,
    pub prs: i64,
    pub merged_prs: i64,
}

/// Everything a single importer flush writes atomically.
#[derive(Debug, Clone, Default)]
pub struct ImportBatch {
    pub developers: Vec<DeveloperRow>,
    pub events: Vec<EventRow>,
    pub states: Vec<(StateKey, PageState)>,
}

impl ImportBatch {
    pub fn is_empty(&self) -> bool {
        self.developers.is_empty() && self.events.is_empty() && self.states.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub developers: u64,
    pub events_inserted: u64,
    pub states: u64,
}

/// Analytics scope shared by every windowed query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub org: Option<String>,
    pub repo: Option<String>,
    pub entity: Option<String>,
    /// Inclusive lower bound, `YYYY-MM-DD`.
    pub since: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct MonthTypeCount {
    pub month: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub event_type: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct RetentionRow {
    pub month: String,
    pub new: i64,
    pub returning: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct DurationRow {
    pub month: String,
    pub count: i64,
    pub avg_days: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct PrReviewRow {
    pub month: String,
    pub prs: i64,
    pub reviews: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ForkActivityRow {
    pub month: String,
    pub forks: i64,
    pub events: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CadenceRow {
    pub month: String,
    pub total: i64,
    pub stable: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DownloadsRow {
    pub month: String,
    pub downloads: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TagDownloadsRow {
    pub org: String,
    pub repo: String,
    pub tag: String,
    pub published_at: String,
    pub downloads: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupKind {
    Org,
    Repo,
    Entity,
}

impl std::str::FromStr for LookupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "org" => Ok(LookupKind::Org),
            "repo" => Ok(LookupKind::Repo),
            "entity" => Ok(LookupKind::Entity),
            other => Err(format!("unsupported lookup `{other}`")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LookupRow {
    pub value: String,
    pub count: i64,
}
