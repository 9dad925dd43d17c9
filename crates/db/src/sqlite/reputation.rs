use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::instrument;

use super::developers::clamp_limit;
use super::scope::{non_empty, Clause};
use crate::errors::{DbError, Result};
use crate::models::{LocalActivity, ReputationRow, ReputationUpdate, Scope};
use crate::repositories::ReputationRepository;

#[derive(Clone)]
pub(crate) struct SqliteReputationRepository {
    pub(crate) pool: SqlitePool,
}

#[async_trait]
impl ReputationRepository for SqliteReputationRepository {
    async fn needing_refresh(&self, stale_before: &str, bot_suffix: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            r#"
            SELECT username
            FROM developer
            WHERE (reputation IS NULL
                   OR reputation_updated_at IS NULL
                   OR reputation_updated_at < ?)
              AND substr(username, -length(?)) != ?
            ORDER BY username
            "#,
        )
        .bind(stale_before)
        .bind(bot_suffix)
        .bind(bot_suffix)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    async fn get(&self, username: &str) -> Result<Option<ReputationRow>> {
        sqlx::query_as::<_, ReputationRow>(
            r#"
            SELECT username, reputation, reputation_updated_at, reputation_deep, reputation_signals
            FROM developer
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    #[instrument(skip(self, update), fields(username = %update.username, deep = update.deep))]
    async fn save(&self, update: ReputationUpdate) -> Result<()> {
        let signals = serde_json::to_string(&update.signals)
            .map_err(|err| DbError::InvalidData(err.to_string()))?;
        let done = sqlx::query(
            r#"
            UPDATE developer
            SET reputation = ?,
                reputation_updated_at = ?,
                reputation_deep = ?,
                reputation_signals = ?
            WHERE username = ?
            "#,
        )
        .bind(update.score)
        .bind(&update.updated_at)
        .bind(update.deep)
        .bind(signals)
        .bind(&update.username)
        .execute(&self.pool)
        .await
        .map_err(DbError::Query)?;

        if done.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("developer {}", update.username)));
        }
        Ok(())
    }

    async fn list(&self, scope: Scope, limit: i64) -> Result<Vec<ReputationRow>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT d.username, d.reputation, d.reputation_updated_at, d.reputation_deep,
                   d.reputation_signals
            FROM developer d
            WHERE d.reputation IS NOT NULL
            "#,
        );
        let mut clause = Clause::continued();
        if let Some(entity) = non_empty(&scope.entity) {
            clause.next(&mut builder);
            builder.push("d.entity = ");
            builder.push_bind(entity.to_string());
        }
        if non_empty(&scope.org).is_some() || non_empty(&scope.repo).is_some() {
            clause.next(&mut builder);
            builder.push("d.username IN (SELECT e.username FROM event e");
            let mut inner = Clause::new();
            super::scope::push_repo_scope(&mut builder, &mut inner, &scope, "e");
            builder.push(")");
        }
        builder.push(" ORDER BY d.reputation ASC, d.username LIMIT ");
        builder.push_bind(clamp_limit(limit));

        builder
            .build_query_as::<ReputationRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    /// Counts are over every event in the repositories the developer touched.
    async fn local_activity(&self, username: &str) -> Result<LocalActivity> {
        sqlx::query_as::<_, LocalActivity>(
            r#"
            WITH touched AS (
                SELECT DISTINCT org, repo FROM event WHERE username = ?1
            ),
            scoped AS (
                SELECT e.username, e.date
                FROM event e
                JOIN touched t ON t.org = e.org AND t.repo = e.repo
            )
            SELECT
                (SELECT COUNT(*) FROM event WHERE username = ?1) AS commits,
                (SELECT COUNT(*) FROM scoped) AS total_commits,
                (SELECT COUNT(DISTINCT username) FROM scoped) AS total_contributors,
                (SELECT MAX(date) FROM event WHERE username = ?1) AS last_commit_date,
                (SELECT COUNT(*) FROM event
                  WHERE username = ?1 AND type = 'pull_request') AS prs,
                (SELECT COUNT(*) FROM event
                  WHERE username = ?1 AND type = 'pull_request'
                    AND merged_at IS NOT NULL AND merged_at != '') AS merged_prs
            "#,
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await
        .map_err(DbError::Query)
    }
}
