use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::domain::EventType;
use common::text::{join_pipe, mentions_field, normalize_username};
use common::time::{activity_date, format_date, format_ts};
use db::{DeveloperRow, EventRow, ReleaseAssetRow, ReleaseRow, RepoMetaRow};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::trace;

use crate::payloads::{
    CommentPayload, ForkPayload, IssuePayload, Label, PullRequestPayload, ReleasePayload,
    RepoPayload, ReviewCommentPayload, UserPayload, UserRef,
};

/// One fetched item turned into a stored event plus its author.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    pub event: EventRow,
    pub author: DeveloperRow,
    /// Creation time of the underlying item, used for the stream age guard.
    pub created_at: DateTime<Utc>,
}

/// Normalizes a raw item from the stream of `kind`.
///
/// `Ok(None)` means the item is deliberately skipped: no author, or an issue
/// that is really a pull request.
pub fn normalize_value(
    kind: EventType,
    org: &str,
    repo: &str,
    raw: &Value,
    now: DateTime<Utc>,
) -> Result<Option<NormalizedEvent>> {
    let normalized = match kind {
        EventType::PullRequest => normalize_pull_request(org, repo, &parse(kind, raw)?, now),
        EventType::PullRequestReview => normalize_review(org, repo, &parse(kind, raw)?, now),
        EventType::Issue => normalize_issue(org, repo, &parse(kind, raw)?, now),
        EventType::IssueComment => normalize_comment(org, repo, &parse(kind, raw)?, now),
        EventType::Fork => normalize_fork(org, repo, &parse(kind, raw)?, now),
    };
    if normalized.is_none() {
        trace!(%kind, org, repo, "item skipped");
    }
    Ok(normalized)
}

fn parse<T: DeserializeOwned>(kind: EventType, raw: &Value) -> Result<T> {
    T::deserialize(raw).with_context(|| format!("decoding {kind} payload"))
}

pub fn normalize_pull_request(
    org: &str,
    repo: &str,
    payload: &PullRequestPayload,
    now: DateTime<Utc>,
) -> Option<NormalizedEvent> {
    let user = payload.user.as_ref()?;
    let event = EventRow {
        id: payload.id,
        org: org.to_string(),
        repo: repo.to_string(),
        username: normalize_username(&user.login),
        event_type: EventType::PullRequest.as_str().to_string(),
        date: activity_date(&payload.created_at, &now),
        state: payload.state.clone(),
        number: payload.number,
        created_at: Some(format_ts(&payload.created_at)),
        closed_at: payload.closed_at.as_ref().map(format_ts),
        merged_at: payload.merged_at.as_ref().map(format_ts),
        url: payload.html_url.clone(),
        mentions: mentions_field(payload.body.as_deref()),
        labels: labels_field(&payload.labels),
        additions: payload.additions.unwrap_or_default(),
        deletions: payload.deletions.unwrap_or_default(),
    };
    Some(NormalizedEvent {
        event,
        author: developer_from_ref(user, now),
        created_at: payload.created_at,
    })
}

pub fn normalize_review(
    org: &str,
    repo: &str,
    payload: &ReviewCommentPayload,
    now: DateTime<Utc>,
) -> Option<NormalizedEvent> {
    let user = payload.user.as_ref()?;
    let touched = payload.updated_at.unwrap_or(payload.created_at);
    let event = EventRow {
        id: payload.id,
        org: org.to_string(),
        repo: repo.to_string(),
        username: normalize_username(&user.login),
        event_type: EventType::PullRequestReview.as_str().to_string(),
        date: activity_date(&touched, &now),
        state: String::new(),
        number: trailing_number(&payload.pull_request_url),
        created_at: Some(format_ts(&payload.created_at)),
        closed_at: None,
        merged_at: None,
        url: payload.html_url.clone(),
        mentions: mentions_field(payload.body.as_deref()),
        labels: String::new(),
        additions: 0,
        deletions: 0,
    };
    Some(NormalizedEvent {
        event,
        author: developer_from_ref(user, now),
        created_at: payload.created_at,
    })
}

pub fn normalize_issue(
    org: &str,
    repo: &str,
    payload: &IssuePayload,
    now: DateTime<Utc>,
) -> Option<NormalizedEvent> {
    if payload.pull_request.is_some() {
        return None;
    }
    let user = payload.user.as_ref()?;
    let event = EventRow {
        id: payload.id,
        org: org.to_string(),
        repo: repo.to_string(),
        username: normalize_username(&user.login),
        event_type: EventType::Issue.as_str().to_string(),
        date: activity_date(&payload.created_at, &now),
        state: payload.state.clone(),
        number: payload.number,
        created_at: Some(format_ts(&payload.created_at)),
        closed_at: payload.closed_at.as_ref().map(format_ts),
        merged_at: None,
        url: payload.html_url.clone(),
        mentions: mentions_field(payload.body.as_deref()),
        labels: labels_field(&payload.labels),
        additions: 0,
        deletions: 0,
    };
    Some(NormalizedEvent {
        event,
        author: developer_from_ref(user, now),
        created_at: payload.created_at,
    })
}

pub fn normalize_comment(
    org: &str,
    repo: &str,
    payload: &CommentPayload,
    now: DateTime<Utc>,
) -> Option<NormalizedEvent> {
    let user = payload.user.as_ref()?;
    let touched = payload.updated_at.unwrap_or(payload.created_at);
    let event = EventRow {
        id: payload.id,
        org: org.to_string(),
        repo: repo.to_string(),
        username: normalize_username(&user.login),
        event_type: EventType::IssueComment.as_str().to_string(),
        date: activity_date(&touched, &now),
        state: String::new(),
        number: trailing_number(&payload.issue_url),
        created_at: Some(format_ts(&payload.created_at)),
        closed_at: None,
        merged_at: None,
        url: payload.html_url.clone(),
        mentions: mentions_field(payload.body.as_deref()),
        labels: String::new(),
        additions: 0,
        deletions: 0,
    };
    Some(NormalizedEvent {
        event,
        author: developer_from_ref(user, now),
        created_at: payload.created_at,
    })
}

pub fn normalize_fork(
    org: &str,
    repo: &str,
    payload: &ForkPayload,
    now: DateTime<Utc>,
) -> Option<NormalizedEvent> {
    let owner = payload.owner.as_ref()?;
    let event = EventRow {
        id: payload.id,
        org: org.to_string(),
        repo: repo.to_string(),
        username: normalize_username(&owner.login),
        event_type: EventType::Fork.as_str().to_string(),
        date: activity_date(&payload.created_at, &now),
        state: String::new(),
        number: 0,
        created_at: Some(format_ts(&payload.created_at)),
        closed_at: None,
        merged_at: None,
        url: payload.html_url.clone(),
        mentions: String::new(),
        labels: String::new(),
        additions: 0,
        deletions: 0,
    };
    Some(NormalizedEvent {
        event,
        author: developer_from_ref(owner, now),
        created_at: payload.created_at,
    })
}

/// Drafts carry no publish date and are skipped.
pub fn normalize_release(
    org: &str,
    repo: &str,
    payload: &ReleasePayload,
) -> Option<(ReleaseRow, Vec<ReleaseAssetRow>)> {
    let published_at = payload.published_at?;
    let release = ReleaseRow {
        org: org.to_string(),
        repo: repo.to_string(),
        tag: payload.tag_name.clone(),
        name: payload.name.clone().unwrap_or_default(),
        published_at: format_ts(&published_at),
        prerelease: payload.prerelease,
    };
    let assets = payload
        .assets
        .iter()
        .map(|asset| ReleaseAssetRow {
            org: org.to_string(),
            repo: repo.to_string(),
            tag: payload.tag_name.clone(),
            name: asset.name.clone(),
            content_type: asset.content_type.clone(),
            size: asset.size,
            download_count: asset.download_count,
            updated_at: asset.updated_at.as_ref().map(format_ts).unwrap_or_default(),
        })
        .collect();
    Some((release, assets))
}

pub fn normalize_repo(org: &str, repo: &str, payload: &RepoPayload) -> RepoMetaRow {
    RepoMetaRow {
        org: org.to_string(),
        repo: repo.to_string(),
        stars: payload.stargazers_count,
        forks: payload.forks_count,
        open_issues: payload.open_issues_count,
        language: payload.language.clone().unwrap_or_default(),
        license: payload
            .license
            .as_ref()
            .and_then(|l| l.spdx_id.clone())
            .unwrap_or_default(),
        archived: payload.archived,
        updated_at: payload.updated_at.as_ref().map(format_ts).unwrap_or_default(),
    }
}

/// Full profile as a developer row. `entity` is left to the enricher.
pub fn normalize_user(payload: &UserPayload, now: DateTime<Utc>) -> DeveloperRow {
    DeveloperRow {
        username: normalize_username(&payload.login),
        id: payload.id,
        full_name: payload.name.clone().unwrap_or_default(),
        email: payload.email.clone().unwrap_or_default(),
        avatar: payload.avatar_url.clone().unwrap_or_default(),
        url: payload.html_url.clone().unwrap_or_default(),
        entity: String::new(),
        location: payload.location.clone().unwrap_or_default(),
        update_date: format_date(&now),
    }
}

fn developer_from_ref(user: &UserRef, now: DateTime<Utc>) -> DeveloperRow {
    DeveloperRow {
        username: normalize_username(&user.login),
        id: user.id,
        avatar: user.avatar_url.clone().unwrap_or_default(),
        url: user.html_url.clone().unwrap_or_default(),
        update_date: format_date(&now),
        ..DeveloperRow::default()
    }
}

fn labels_field(labels: &[Label]) -> String {
    join_pipe(labels.iter().map(|l| l.name.as_str()))
}

/// `.../issues/42` -> 42
fn trailing_number(url: &str) -> i64 {
    url.rsplit('/')
        .next()
        .and_then(|tail| tail.parse().ok())
        .unwrap_or_default()
}
