use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct UserRef {
    pub id: i64,
    pub login: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPayload {
    pub id: i64,
    pub number: i64,
    pub state: String,
    #[serde(default)]
    pub html_url: String,
    pub user: Option<UserRef>,
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub additions: Option<i64>,
    #[serde(default)]
    pub deletions: Option<i64>,
}

/// Entry from the repository-wide pull request review comment listing.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewCommentPayload {
    pub id: i64,
    #[serde(default)]
    pub html_url: String,
    pub user: Option<UserRef>,
    pub body: Option<String>,
    #[serde(default)]
    pub pull_request_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssuePayload {
    pub id: i64,
    pub number: i64,
    pub state: String,
    #[serde(default)]
    pub html_url: String,
    pub user: Option<UserRef>,
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<Label>,
    pub pull_request: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentPayload {
    pub id: i64,
    #[serde(default)]
    pub html_url: String,
    pub user: Option<UserRef>,
    pub body: Option<String>,
    #[serde(default)]
    pub issue_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ForkPayload {
    pub id: i64,
    #[serde(default)]
    pub html_url: String,
    pub owner: Option<UserRef>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPayload {
    pub name: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub download_count: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReleasePayload {
    pub tag_name: String,
    pub name: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub assets: Vec<AssetPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LicenseRef {
    pub spdx_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoPayload {
    pub name: String,
    #[serde(default)]
    pub stargazers_count: i64,
    #[serde(default)]
    pub forks_count: i64,
    #[serde(default)]
    pub open_issues_count: i64,
    pub language: Option<String>,
    pub license: Option<LicenseRef>,
    #[serde(default)]
    pub archived: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPayload {
    pub id: i64,
    pub login: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub html_url: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub followers: i64,
    #[serde(default)]
    pub following: i64,
    #[serde(default)]
    pub public_repos: i64,
    #[serde(default)]
    pub owned_private_repos: Option<i64>,
    #[serde(default)]
    pub two_factor_authentication: Option<bool>,
    #[serde(default)]
    pub suspended_at: Option<DateTime<Utc>>,
}
