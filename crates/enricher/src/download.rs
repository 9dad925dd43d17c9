use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info};

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Fetches one roster file; `Ok(None)` marks the end of the sequence.
#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Option<String>>;
}

pub struct HttpRosterSource {
    client: reqwest::Client,
}

impl HttpRosterSource {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .connect_timeout(HTTP_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .build()
            .context("build roster http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl RosterSource for HttpRosterSource {
    async fn fetch(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("request roster {url}"))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("roster {url}"))?;
        let body = response
            .text()
            .await
            .with_context(|| format!("read roster {url}"))?;
        Ok(Some(body))
    }
}

/// Downloads `urls` in order, stopping at the first missing file.
pub async fn download_rosters(source: &dyn RosterSource, urls: &[String]) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for url in urls {
        match source.fetch(url).await? {
            Some(body) => {
                debug!(url = %url, bytes = body.len(), "roster downloaded");
                files.push(body);
            }
            None => {
                debug!(url = %url, "roster sequence ended");
                break;
            }
        }
    }
    info!(files = files.len(), "rosters downloaded");
    Ok(files)
}
