use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, instrument};

use crate::errors::{DbError, Result};
use crate::models::PageState;
use crate::repositories::StateRepository;

/// Upserts a cursor. Pages below 1 are stored as 1.
pub async fn save_state(
    conn: &mut SqliteConnection,
    stream: &str,
    org: &str,
    repo: &str,
    state: &PageState,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO state (stream, org, repo, page, since)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (stream, org, repo) DO UPDATE
            SET page = excluded.page,
                since = excluded.since
        "#,
    )
    .bind(stream)
    .bind(org)
    .bind(repo)
    .bind(state.page.max(1))
    .bind(&state.since)
    .execute(&mut *conn)
    .await
    .map(|_| ())
    .map_err(DbError::Query)
}

pub async fn clear_state(conn: &mut SqliteConnection, org: &str, repo: &str) -> Result<u64> {
    sqlx::query("DELETE FROM state WHERE org = ? AND repo = ?")
        .bind(org)
        .bind(repo)
        .execute(&mut *conn)
        .await
        .map(|done| done.rows_affected())
        .map_err(DbError::Query)
}

#[derive(Clone)]
pub(crate) struct SqliteStateRepository {
    pub(crate) pool: SqlitePool,
}

#[async_trait]
impl StateRepository for SqliteStateRepository {
    async fn get(
        &self,
        stream: &str,
        org: &str,
        repo: &str,
        default_since: &str,
    ) -> Result<PageState> {
        let stored = sqlx::query_as::<_, PageState>(
            "SELECT page, since FROM state WHERE stream = ? AND org = ? AND repo = ?",
        )
        .bind(stream)
        .bind(org)
        .bind(repo)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(stored.unwrap_or_else(|| PageState::new(1, default_since)))
    }

    async fn save(&self, stream: &str, org: &str, repo: &str, state: PageState) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(DbError::Query)?;
        save_state(&mut conn, stream, org, repo, &state).await
    }

    #[instrument(skip(self))]
    async fn clear(&self, org: &str, repo: &str) -> Result<u64> {
        let mut conn = self.pool.acquire().await.map_err(DbError::Query)?;
        let cleared = clear_state(&mut conn, org, repo).await?;
        debug!(cleared, "pagination state cleared");
        Ok(cleared)
    }
}
