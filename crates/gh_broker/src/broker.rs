use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use http::{header, HeaderValue, Request, Response, StatusCode};
use tracing::debug;

use crate::coordinator::RateLimitCoordinator;
use crate::error::HttpStatusError;
use crate::metrics;
use crate::model::parse_rate_limit;
use crate::token::BearerToken;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[async_trait]
pub trait HttpExec: Send + Sync {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(REQUEST_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("building http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpExec for ReqwestExecutor {
    async fn execute(&self, req: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let (parts, body) = req.into_parts();
        let mut builder = self.client.request(parts.method, parts.uri.to_string());
        builder = builder.headers(parts.headers);
        let resp = builder.body(body).send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await?;
        let mut response = Response::new(bytes.to_vec());
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}

/// Authenticated, rate-limit aware request execution.
///
/// Non-2xx responses come back as [`HttpStatusError`].
pub trait GithubBroker: Send + Sync {
    fn enqueue(&self, request: Request<Vec<u8>>) -> BoxFuture<'static, Result<Response<Vec<u8>>>>;
}

pub struct GithubBrokerBuilder {
    token: Option<BearerToken>,
    http_exec: Option<Arc<dyn HttpExec>>,
    coordinator: Option<Arc<RateLimitCoordinator>>,
    user_agent: String,
}

impl GithubBrokerBuilder {
    pub fn new(token: Option<BearerToken>) -> Self {
        Self {
            token,
            http_exec: None,
            coordinator: None,
            user_agent: "devpulse".to_string(),
        }
    }

    pub fn http_exec(mut self, exec: Arc<dyn HttpExec>) -> Self {
        self.http_exec = Some(exec);
        self
    }

    pub fn coordinator(mut self, coordinator: Arc<RateLimitCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn build(self) -> Result<Arc<dyn GithubBroker>> {
        let http_exec = match self.http_exec {
            Some(exec) => exec,
            None => Arc::new(ReqwestExecutor::new(&self.user_agent)?),
        };
        let inner = Inner {
            token: self.token,
            http_exec,
            coordinator: self
                .coordinator
                .unwrap_or_else(|| Arc::new(RateLimitCoordinator::default())),
        };
        Ok(Arc::new(LocalGithubBroker {
            inner: Arc::new(inner),
        }))
    }
}

struct Inner {
    token: Option<BearerToken>,
    http_exec: Arc<dyn HttpExec>,
    coordinator: Arc<RateLimitCoordinator>,
}

struct LocalGithubBroker {
    inner: Arc<Inner>,
}

impl GithubBroker for LocalGithubBroker {
    fn enqueue(&self, request: Request<Vec<u8>>) -> BoxFuture<'static, Result<Response<Vec<u8>>>> {
        let inner = self.inner.clone();
        async move { execute_once(inner, request).await }.boxed()
    }
}

#[derive(Clone, Debug)]
pub struct BrokerResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl BrokerResponse {
    pub fn from_http(resp: &Response<Vec<u8>>) -> Self {
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|val| (k.as_str().to_string(), val.to_string()))
            })
            .collect();
        Self {
            status,
            headers,
            body: resp.body().clone(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

async fn execute_once(inner: Arc<Inner>, mut request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
    let endpoint = request.uri().path().trim_start_matches('/').to_string();
    if let Some(token) = &inner.token {
        request.headers_mut().insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&token.header_value())?,
        );
    }

    let start = Instant::now();
    let resp = inner.http_exec.execute(request).await?;
    metrics::LATENCY.observe(start.elapsed().as_secs_f64());

    let status = resp.status();
    metrics::REQUESTS_TOTAL
        .with_label_values(&[status_class(status)])
        .inc();

    if let Some(update) = parse_rate_limit(resp.headers()) {
        inner.coordinator.observe(&update).await;
    }

    if status.is_success() {
        return Ok(resp);
    }

    let snapshot = BrokerResponse::from_http(&resp);
    debug!(
        status = %status,
        endpoint = %endpoint,
        github_request_id = snapshot.header("x-github-request-id").unwrap_or("-"),
        headers = ?snapshot.headers,
        body_preview = %body_preview(&snapshot.body),
        "GitHub returned error response"
    );
    Err(HttpStatusError::with_endpoint(status, endpoint).into())
}

fn body_preview(body: &[u8]) -> String {
    if body.is_empty() {
        return String::new();
    }
    common::text::preview(&String::from_utf8_lossy(body), 256)
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}
