mod developers;
mod events;
mod imports;
mod insights;
mod releases;
mod reputation;
mod scope;
mod state;
mod substitutions;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{error, info, instrument};

use crate::errors::{DbError, Result};
use crate::migrations::run_migrations;
use crate::repositories::{
    DeveloperRepository, EventRepository, ImportRepository, InsightRepository, ReleaseRepository,
    Repositories, ReputationRepository, StateRepository, SubstitutionRepository,
};

use developers::SqliteDeveloperRepository;
use events::SqliteEventRepository;
use imports::SqliteImportRepository;
use insights::SqliteInsightRepository;
use releases::SqliteReleaseRepository;
use reputation::SqliteReputationRepository;
use state::SqliteStateRepository;
use substitutions::SqliteSubstitutionRepository;

pub use imports::write_batch;
pub use state::{clear_state, save_state};
pub use substitutions::ENTITY_SUBSTITUTION;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const STATEMENT_CACHE_CAPACITY: usize = 256;
const MAX_CONNECTIONS: u32 = 4;

#[derive(Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
    path: PathBuf,
    developer_repo: Arc<SqliteDeveloperRepository>,
    event_repo: Arc<SqliteEventRepository>,
    state_repo: Arc<SqliteStateRepository>,
    release_repo: Arc<SqliteReleaseRepository>,
    substitution_repo: Arc<SqliteSubstitutionRepository>,
    reputation_repo: Arc<SqliteReputationRepository>,
    insight_repo: Arc<SqliteInsightRepository>,
    import_repo: Arc<SqliteImportRepository>,
}

impl SqliteDatabase {
    /// Opens (creating if needed) the database file and brings the schema up to date.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            common::paths::ensure_private_dir(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .statement_cache_capacity(STATEMENT_CACHE_CAPACITY);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(DbError::Query)?;

        run_migrations(&pool).await?;
        info!("store opened");
        Ok(Self::from_pool(pool, path))
    }

    pub fn from_pool(pool: SqlitePool, path: PathBuf) -> Self {
        Self {
            developer_repo: Arc::new(SqliteDeveloperRepository { pool: pool.clone() }),
            event_repo: Arc::new(SqliteEventRepository { pool: pool.clone() }),
            state_repo: Arc::new(SqliteStateRepository { pool: pool.clone() }),
            release_repo: Arc::new(SqliteReleaseRepository { pool: pool.clone() }),
            substitution_repo: Arc::new(SqliteSubstitutionRepository { pool: pool.clone() }),
            reputation_repo: Arc::new(SqliteReputationRepository { pool: pool.clone() }),
            insight_repo: Arc::new(SqliteInsightRepository { pool: pool.clone() }),
            import_repo: Arc::new(SqliteImportRepository { pool: pool.clone() }),
            pool,
            path,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Checkpoints the WAL and closes every pooled connection.
    pub async fn close(&self) {
        if let Err(err) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
        {
            error!(error = %err, "wal checkpoint failed on close");
        }
        self.pool.close().await;
    }

    /// Runs `f` inside one write transaction.
    ///
    /// Commits on success. On error the transaction is rolled back and the
    /// original error is returned; a failing rollback is only logged.
    pub async fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        run_in_transaction(&self.pool, f).await
    }

    /// Deletes the database file and returns a freshly migrated, empty store.
    pub async fn reset(self) -> Result<Self> {
        let path = self.path.clone();
        self.close().await;
        remove_database_files(&path)?;
        info!(path = %path.display(), "store reset");
        Self::open(path).await
    }
}

pub(crate) async fn run_in_transaction<T, F>(pool: &SqlitePool, f: F) -> Result<T>
where
    T: Send,
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T>> + Send,
{
    let mut tx = pool.begin().await.map_err(DbError::Query)?;

    match f(&mut *tx).await {
        Ok(value) => {
            tx.commit().await.map_err(DbError::Query)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                error!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}

fn remove_database_files(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut candidate = path.as_os_str().to_owned();
        candidate.push(suffix);
        match std::fs::remove_file(&candidate) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(DbError::Io(err)),
        }
    }
    Ok(())
}

impl Repositories for SqliteDatabase {
    fn developers(&self) -> &dyn DeveloperRepository {
        &*self.developer_repo
    }

    fn events(&self) -> &dyn EventRepository {
        &*self.event_repo
    }

    fn states(&self) -> &dyn StateRepository {
        &*self.state_repo
    }

    fn releases(&self) -> &dyn ReleaseRepository {
        &*self.release_repo
    }

    fn substitutions(&self) -> &dyn SubstitutionRepository {
        &*self.substitution_repo
    }

    fn reputation(&self) -> &dyn ReputationRepository {
        &*self.reputation_repo
    }

    fn insights(&self) -> &dyn InsightRepository {
        &*self.insight_repo
    }

    fn imports(&self) -> &dyn ImportRepository {
        &*self.import_repo
    }
}
