use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use collector::client::client_from_config;
use collector::{DataFetcher, RestDataFetcher};
use common::{AppConfig, AppError};
use db::SqliteDatabase;
use gh_broker::{BearerToken, GithubBrokerBuilder};

use crate::args::{Cli, Format};

/// Configuration after global flags have been applied.
pub struct AppContext {
    pub config: AppConfig,
    pub db_path: PathBuf,
    pub format: Format,
}

impl AppContext {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let config = AppConfig::load().context("load configuration")?;
        let db_path = match cli.db.clone() {
            Some(path) => path,
            None => config
                .database
                .resolved_path()
                .ok_or(AppError::MissingConfig("database.path (HOME is not set)"))?,
        };
        Ok(Self {
            config,
            db_path,
            format: cli.format,
        })
    }

    pub async fn open_store(&self) -> Result<SqliteDatabase> {
        SqliteDatabase::open(&self.db_path)
            .await
            .with_context(|| format!("open store {}", self.db_path.display()))
    }

    /// Remote fetcher; `require_token` turns a missing token into an error.
    pub fn fetcher(&self, require_token: bool) -> Result<Arc<dyn DataFetcher>> {
        let token = self.config.github.resolved_token().and_then(BearerToken::new);
        if token.is_none() && require_token {
            return Err(AppError::MissingConfig(
                "github token (run `devpulse auth` or set GITHUB_TOKEN)",
            )
            .into());
        }
        let broker = GithubBrokerBuilder::new(token)
            .user_agent(self.config.github.user_agent.clone())
            .build()
            .context("build github broker")?;
        let client = client_from_config(&self.config.github, broker)?;
        Ok(Arc::new(RestDataFetcher::new(Arc::new(client))))
    }
}
