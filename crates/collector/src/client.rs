use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use gh_broker::{GithubBroker, HttpStatusError, ResponseMeta};
use http::{header, Request, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, Error)]
pub enum GithubApiError {
    #[error("github api error: {status} for {endpoint}")]
    Http {
        status: StatusCode,
        endpoint: String,
    },
    #[error("unexpected payload for {endpoint}: {message}")]
    Payload { endpoint: String, message: String },
}

impl GithubApiError {
    pub fn status(status: StatusCode, endpoint: impl Into<String>) -> Self {
        Self::Http {
            status,
            endpoint: endpoint.into(),
        }
    }

    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            GithubApiError::Http { status, .. } => Some(*status),
            GithubApiError::Payload { .. } => None,
        }
    }

    pub fn endpoint(&self) -> &str {
        match self {
            GithubApiError::Http { endpoint, .. } | GithubApiError::Payload { endpoint, .. } => {
                endpoint.as_str()
            }
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self.status_code(),
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
        )
    }
}

/// True when `err` carries a 401/403 from the remote.
pub fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<GithubApiError>()
            .map(GithubApiError::is_unauthorized)
            .or_else(|| {
                cause
                    .downcast_ref::<HttpStatusError>()
                    .map(HttpStatusError::is_unauthorized)
            })
            .unwrap_or(false)
    })
}

/// Status code carried by `err`, if it came from a non-2xx response.
pub fn status_of(err: &anyhow::Error) -> Option<StatusCode> {
    err.chain().find_map(|cause| {
        cause
            .downcast_ref::<GithubApiError>()
            .and_then(GithubApiError::status_code)
            .or_else(|| cause.downcast_ref::<HttpStatusError>().map(|e| e.status))
    })
}

/// One page of a listing plus the response metadata.
#[derive(Debug, Clone)]
pub struct Page {
    pub items: Vec<Value>,
    pub meta: ResponseMeta,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
pub trait GithubClient: Send + Sync {
    async fn list_pull_requests(&self, owner: &str, repo: &str, page: u32, per_page: u32)
        -> Result<Page>;
    async fn list_review_comments(
        &self,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        page: u32,
        per_page: u32,
    ) -> Result<Page>;
    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        page: u32,
        per_page: u32,
    ) -> Result<Page>;
    async fn list_issue_comments(
        &self,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        page: u32,
        per_page: u32,
    ) -> Result<Page>;
    async fn list_forks(&self, owner: &str, repo: &str, page: u32, per_page: u32) -> Result<Page>;
    async fn list_releases(&self, owner: &str, repo: &str, page: u32, per_page: u32)
        -> Result<Page>;
    async fn get_repo(&self, owner: &str, repo: &str) -> Result<Value>;
    async fn get_user(&self, login: &str) -> Result<Value>;
    async fn is_org_member(&self, org: &str, login: &str) -> Result<bool>;
    async fn list_org_repos(&self, org: &str, page: u32, per_page: u32) -> Result<Page>;
}

pub struct BrokerGithubClient {
    broker: Arc<dyn GithubBroker>,
    base: Url,
    user_agent: String,
}

impl BrokerGithubClient {
    pub fn new(broker: Arc<dyn GithubBroker>, base: &str, user_agent: String) -> Result<Self> {
        let mut base = Url::parse(base)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            broker,
            base,
            user_agent,
        })
    }

    async fn get_json(&self, url: Url) -> Result<(Value, ResponseMeta)> {
        let endpoint = url.path().trim_start_matches('/').to_string();
        debug!(endpoint = %endpoint, url = %url, "Dispatching GitHub request");
        let response = match self.execute(url).await {
            Ok(resp) => resp,
            Err(err) => {
                if let Some(status_err) = err.downcast_ref::<HttpStatusError>() {
                    return Err(GithubApiError::status(status_err.status, endpoint).into());
                }
                return Err(err);
            }
        };
        let meta = ResponseMeta::from_parts(response.status(), response.headers());
        let body = response.into_body();
        if body.is_empty() {
            return Ok((Value::Null, meta));
        }
        let value: Value = serde_json::from_slice(&body).map_err(|err| GithubApiError::Payload {
            endpoint: endpoint.clone(),
            message: err.to_string(),
        })?;
        Ok((value, meta))
    }

    async fn get_page(&self, url: Url) -> Result<Page> {
        let endpoint = url.path().trim_start_matches('/').to_string();
        let (value, meta) = self.get_json(url).await?;
        let items = match value {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            _ => {
                return Err(GithubApiError::Payload {
                    endpoint,
                    message: "expected array response".to_string(),
                }
                .into())
            }
        };
        Ok(Page { items, meta })
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn execute(&self, url: Url) -> Result<http::Response<Vec<u8>>> {
        let uri: http::Uri = url.as_str().parse()?;
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::USER_AGENT, self.user_agent.clone())
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .body(Vec::new())?;

        self.broker.enqueue(request).await
    }

    fn join(&self, path: &str) -> Result<Url> {
        Ok(self.base.join(path)?)
    }

    fn with_query(url: &mut Url, params: &[(&str, String)]) {
        let mut query_pairs = url.query_pairs_mut();
        for (key, val) in params {
            query_pairs.append_pair(key, val);
        }
    }

    fn listing(
        &self,
        path: &str,
        mut params: Vec<(&str, String)>,
        since: Option<DateTime<Utc>>,
        page: u32,
        per_page: u32,
    ) -> Result<Url> {
        let mut url = self.join(path)?;
        if let Some(since) = since {
            params.push(("since", since.to_rfc3339_opts(SecondsFormat::Secs, true)));
        }
        params.push(("page", page.max(1).to_string()));
        params.push(("per_page", per_page.to_string()));
        Self::with_query(&mut url, &params);
        Ok(url)
    }
}

fn newest_first() -> Vec<(&'static str, String)> {
    vec![
        ("sort", "created".to_string()),
        ("direction", "desc".to_string()),
    ]
}

#[async_trait]
impl GithubClient for BrokerGithubClient {
    async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page> {
        let mut params = vec![("state", "all".to_string())];
        params.extend(newest_first());
        let url = self.listing(&format!("repos/{owner}/{repo}/pulls"), params, None, page, per_page)?;
        self.get_page(url).await
    }

    async fn list_review_comments(
        &self,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        page: u32,
        per_page: u32,
    ) -> Result<Page> {
        let url = self.listing(
            &format!("repos/{owner}/{repo}/pulls/comments"),
            newest_first(),
            since,
            page,
            per_page,
        )?;
        self.get_page(url).await
    }

    async fn list_issues(
        &self,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        page: u32,
        per_page: u32,
    ) -> Result<Page> {
        let mut params = vec![("state", "all".to_string())];
        params.extend(newest_first());
        let url = self.listing(&format!("repos/{owner}/{repo}/issues"), params, since, page, per_page)?;
        self.get_page(url).await
    }

    async fn list_issue_comments(
        &self,
        owner: &str,
        repo: &str,
        since: Option<DateTime<Utc>>,
        page: u32,
        per_page: u32,
    ) -> Result<Page> {
        let url = self.listing(
            &format!("repos/{owner}/{repo}/issues/comments"),
            newest_first(),
            since,
            page,
            per_page,
        )?;
        self.get_page(url).await
    }

    async fn list_forks(&self, owner: &str, repo: &str, page: u32, per_page: u32) -> Result<Page> {
        let params = vec![("sort", "newest".to_string())];
        let url = self.listing(&format!("repos/{owner}/{repo}/forks"), params, None, page, per_page)?;
        self.get_page(url).await
    }

    async fn list_releases(
        &self,
        owner: &str,
        repo: &str,
        page: u32,
        per_page: u32,
    ) -> Result<Page> {
        let url = self.listing(&format!("repos/{owner}/{repo}/releases"), Vec::new(), None, page, per_page)?;
        self.get_page(url).await
    }

    async fn get_repo(&self, owner: &str, repo: &str) -> Result<Value> {
        let url = self.join(&format!("repos/{owner}/{repo}"))?;
        Ok(self.get_json(url).await?.0)
    }

    async fn get_user(&self, login: &str) -> Result<Value> {
        let url = self.join(&format!("users/{login}"))?;
        Ok(self.get_json(url).await?.0)
    }

    /// 204 means member; 404 (or a 302 for non-visible membership) means not.
    async fn is_org_member(&self, org: &str, login: &str) -> Result<bool> {
        let url = self.join(&format!("orgs/{org}/members/{login}"))?;
        match self.get_json(url).await {
            Ok(_) => Ok(true),
            Err(err) => match err.downcast_ref::<GithubApiError>().and_then(GithubApiError::status_code) {
                Some(StatusCode::NOT_FOUND | StatusCode::FOUND) => Ok(false),
                _ => Err(err),
            },
        }
    }

    async fn list_org_repos(&self, org: &str, page: u32, per_page: u32) -> Result<Page> {
        let url = self.listing(&format!("orgs/{org}/repos"), Vec::new(), None, page, per_page)?;
        self.get_page(url).await
    }
}

/// Builds a client from the application config and a resolved token.
pub fn client_from_config(
    config: &common::config::GithubConfig,
    broker: Arc<dyn GithubBroker>,
) -> Result<BrokerGithubClient> {
    if config.api_url.trim().is_empty() {
        return Err(anyhow!("github.api_url must not be empty"));
    }
    BrokerGithubClient::new(broker, &config.api_url, config.user_agent.clone())
}
