use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::paths;

/// Environment variable that overrides any configured GitHub token.
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub github: GithubConfig,
    pub importer: ImporterConfig,
    pub roster: RosterConfig,
    pub reputation: ReputationConfig,
    pub server: ServerConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(".")
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(home) = paths::data_dir() {
            builder = builder.add_source(
                File::with_name(home.join("config").to_string_lossy().as_ref()).required(false),
            );
        }

        builder
            .add_source(
                File::with_name(
                    path.as_ref()
                        .join("config/local")
                        .to_string_lossy()
                        .as_ref(),
                )
                .required(false),
            )
            .add_source(Environment::with_prefix("DEVPULSE").separator("__"))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Configured path, or `$HOME/.devpulse/data.db`.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(paths::default_db_path)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: String,
    pub user_agent: String,
    pub token: Option<String>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com/".to_string(),
            user_agent: "devpulse".to_string(),
            token: None,
        }
    }
}

impl GithubConfig {
    /// `GITHUB_TOKEN` wins over the configured token, which wins over the token file.
    pub fn resolved_token(&self) -> Option<String> {
        if let Ok(token) = std::env::var(TOKEN_ENV) {
            let token = token.trim().to_string();
            if !token.is_empty() {
                return Some(token);
            }
        }
        if let Some(token) = self.token.as_ref().filter(|t| !t.trim().is_empty()) {
            return Some(token.trim().to_string());
        }
        paths::token_file()
            .and_then(|path| std::fs::read_to_string(path).ok())
            .map(|raw| raw.trim().to_string())
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    pub months: u32,
    pub page_size: u32,
    pub batch_size: usize,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            months: 6,
            page_size: 100,
            batch_size: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    pub url_template: String,
    pub max_files: u32,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            url_template:
                "https://raw.githubusercontent.com/cncf/gitdm/master/developers_affiliations{n}.txt"
                    .to_string(),
            max_files: 99,
        }
    }
}

impl RosterConfig {
    pub fn urls(&self) -> Vec<String> {
        (1..=self.max_files)
            .map(|n| self.url_template.replace("{n}", &n.to_string()))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReputationConfig {
    pub ttl_hours: i64,
    pub bot_suffix: String,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            bot_suffix: "[bot]".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
