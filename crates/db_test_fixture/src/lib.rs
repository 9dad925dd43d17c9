use anyhow::{Context, Result};
use common::EventType;
use db::{DeveloperRow, EventRow, ImportBatch, ImportRepository, Repositories, SqliteDatabase};
use tempfile::TempDir;
use tracing::debug;

/// Throw-away SQLite store living in its own temporary directory.
pub struct DbFixture;

impl DbFixture {
    pub async fn create(prefix: &str) -> Result<DatabaseHandle> {
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir()
            .context("create temp dir for test database")?;
        let path = dir.path().join("data.db");
        let db = SqliteDatabase::open(&path)
            .await
            .with_context(|| format!("open test database at {}", path.display()))?;
        debug!(path = %path.display(), "test database ready");
        Ok(DatabaseHandle { db, dir })
    }
}

pub struct DatabaseHandle {
    db: SqliteDatabase,
    dir: TempDir,
}

impl DatabaseHandle {
    pub fn db(&self) -> &SqliteDatabase {
        &self.db
    }

    pub fn dir(&self) -> &std::path::Path {
        self.dir.path()
    }

    /// Writes developers and events through the import path.
    pub async fn seed(&self, developers: Vec<DeveloperRow>, events: Vec<EventRow>) -> Result<()> {
        self.db
            .imports()
            .commit_batch(ImportBatch {
                developers,
                events,
                states: Vec::new(),
            })
            .await?;
        Ok(())
    }

    pub async fn cleanup(self) -> Result<()> {
        self.db.close().await;
        self.dir.close().context("remove test database dir")?;
        Ok(())
    }
}

pub fn developer(username: &str) -> DeveloperRow {
    DeveloperRow {
        username: username.to_string(),
        update_date: "2025-01-01".to_string(),
        ..DeveloperRow::default()
    }
}

pub fn developer_with_entity(username: &str, entity: &str) -> DeveloperRow {
    DeveloperRow {
        entity: entity.to_string(),
        ..developer(username)
    }
}

/// Minimal event; `created_at` is midnight of `date`.
pub fn event(id: i64, username: &str, event_type: EventType, date: &str) -> EventRow {
    EventRow {
        id,
        org: "acme".to_string(),
        repo: "widgets".to_string(),
        username: username.to_string(),
        event_type: event_type.as_str().to_string(),
        date: date.to_string(),
        state: "open".to_string(),
        number: id,
        created_at: Some(format!("{date}T00:00:00Z")),
        closed_at: None,
        merged_at: None,
        url: format!("https://github.com/acme/widgets/issues/{id}"),
        mentions: String::new(),
        labels: String::new(),
        additions: 0,
        deletions: 0,
    }
}
