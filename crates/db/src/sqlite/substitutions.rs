use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, instrument};

use super::run_in_transaction;
use crate::errors::{DbError, Result};
use crate::models::SubstitutionRow;
use crate::repositories::SubstitutionRepository;

pub const ENTITY_SUBSTITUTION: &str = "entity";

async fn apply_one(conn: &mut SqliteConnection, kind: &str, old: &str, new: &str) -> Result<u64> {
    // Only entity substitutions rewrite developer rows today.
    if kind != ENTITY_SUBSTITUTION {
        return Ok(0);
    }
    sqlx::query("UPDATE developer SET entity = ? WHERE entity = ?")
        .bind(new)
        .bind(old)
        .execute(&mut *conn)
        .await
        .map(|done| done.rows_affected())
        .map_err(DbError::Query)
}

#[derive(Clone)]
pub(crate) struct SqliteSubstitutionRepository {
    pub(crate) pool: SqlitePool,
}

#[async_trait]
impl SubstitutionRepository for SqliteSubstitutionRepository {
    #[instrument(skip(self))]
    async fn save_and_apply(&self, kind: &str, old: &str, new: &str) -> Result<u64> {
        let (kind, old, new) = (kind.to_string(), old.to_string(), new.to_string());
        let updated = run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                sqlx::query(
                    r#"
                    INSERT INTO sub (type, old, new)
                    VALUES (?, ?, ?)
                    ON CONFLICT (type, old) DO UPDATE SET new = excluded.new
                    "#,
                )
                .bind(&kind)
                .bind(&old)
                .bind(&new)
                .execute(&mut *conn)
                .await
                .map_err(DbError::Query)?;
                apply_one(conn, &kind, &old, &new).await
            })
        })
        .await?;
        info!(updated, "substitution recorded");
        Ok(updated)
    }

    async fn apply_all(&self) -> Result<u64> {
        let subs = self.list().await?;
        if subs.is_empty() {
            return Ok(0);
        }
        run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let mut updated = 0;
                for sub in &subs {
                    updated += apply_one(conn, &sub.kind, &sub.old, &sub.new).await?;
                }
                Ok(updated)
            })
        })
        .await
    }

    async fn list(&self) -> Result<Vec<SubstitutionRow>> {
        sqlx::query_as::<_, SubstitutionRow>("SELECT type, old, new FROM sub ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }
}
