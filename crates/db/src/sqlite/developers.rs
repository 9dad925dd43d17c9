use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::instrument;

use super::run_in_transaction;
use super::scope::{like, non_empty, Clause};
use crate::errors::{DbError, Result};
use crate::models::{
    DeveloperDetails, DeveloperListItem, DeveloperQuery, DeveloperRow, EntityDetails,
    EntityListItem, RepoEventCount, MAX_PAGE_SIZE,
};
use crate::repositories::DeveloperRepository;

const UPSERT_DEVELOPER: &str = r#"
    INSERT INTO developer (username, id, full_name, email, avatar, url, entity, location, update_date)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT (username) DO UPDATE
        SET id = CASE WHEN excluded.id != 0 THEN excluded.id ELSE developer.id END,
            full_name = COALESCE(NULLIF(excluded.full_name, ''), developer.full_name),
            email = COALESCE(NULLIF(excluded.email, ''), developer.email),
            avatar = COALESCE(NULLIF(excluded.avatar, ''), developer.avatar),
            url = COALESCE(NULLIF(excluded.url, ''), developer.url),
            entity = COALESCE(NULLIF(excluded.entity, ''), developer.entity),
            location = COALESCE(NULLIF(excluded.location, ''), developer.location),
            update_date = excluded.update_date
"#;

/// Upserts one developer; empty incoming fields never clobber stored values.
pub(crate) async fn upsert_developer(
    conn: &mut SqliteConnection,
    developer: &DeveloperRow,
) -> Result<()> {
    sqlx::query(UPSERT_DEVELOPER)
        .bind(&developer.username)
        .bind(developer.id)
        .bind(&developer.full_name)
        .bind(&developer.email)
        .bind(&developer.avatar)
        .bind(&developer.url)
        .bind(&developer.entity)
        .bind(&developer.location)
        .bind(&developer.update_date)
        .execute(&mut *conn)
        .await
        .map(|_| ())
        .map_err(DbError::Query)
}

pub(crate) fn clamp_limit(limit: i64) -> i64 {
    if limit <= 0 {
        MAX_PAGE_SIZE
    } else {
        limit.min(MAX_PAGE_SIZE)
    }
}

#[derive(Clone)]
pub(crate) struct SqliteDeveloperRepository {
    pub(crate) pool: SqlitePool,
}

#[async_trait]
impl DeveloperRepository for SqliteDeveloperRepository {
    #[instrument(skip(self, developer), fields(username = %developer.username))]
    async fn upsert(&self, developer: DeveloperRow) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(DbError::Query)?;
        upsert_developer(&mut conn, &developer).await
    }

    async fn get(&self, username: &str) -> Result<Option<DeveloperRow>> {
        sqlx::query_as::<_, DeveloperRow>(
            r#"
            SELECT username, id, full_name, email, avatar, url, entity, location, update_date
            FROM developer
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    async fn list(&self, query: DeveloperQuery) -> Result<Vec<DeveloperListItem>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT d.username, d.full_name, d.email, d.entity,
                   (SELECT COUNT(*) FROM event e WHERE e.username = d.username) AS events
            FROM developer d
            "#,
        );
        let mut clause = Clause::new();
        if let Some(username) = non_empty(&query.username) {
            clause.next(&mut builder);
            builder.push("d.username LIKE ");
            builder.push_bind(like(username));
        }
        if let Some(entity) = non_empty(&query.entity) {
            clause.next(&mut builder);
            builder.push("d.entity LIKE ");
            builder.push_bind(like(entity));
        }
        builder.push(" ORDER BY events DESC, d.username LIMIT ");
        builder.push_bind(clamp_limit(query.limit));

        builder
            .build_query_as::<DeveloperListItem>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn details(&self, username: &str) -> Result<Option<DeveloperDetails>> {
        let Some(developer) = self.get(username).await? else {
            return Ok(None);
        };

        let reputation = sqlx::query_as(
            r#"
            SELECT username, reputation, reputation_updated_at, reputation_deep, reputation_signals
            FROM developer
            WHERE username = ? AND reputation IS NOT NULL
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::Query)?;

        let repos = sqlx::query_as::<_, RepoEventCount>(
            r#"
            SELECT org, repo, COUNT(*) AS events
            FROM event
            WHERE username = ?
            GROUP BY org, repo
            ORDER BY events DESC, org, repo
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(Some(DeveloperDetails {
            developer,
            reputation,
            repos,
        }))
    }

    async fn usernames(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT username FROM developer ORDER BY username")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn entities(&self) -> Result<Vec<(String, String)>> {
        sqlx::query_as(
            "SELECT username, entity FROM developer WHERE entity != '' ORDER BY username",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    #[instrument(skip(self, updates), fields(updates = updates.len()))]
    async fn update_entities(&self, updates: Vec<(String, String)>) -> Result<u64> {
        if updates.is_empty() {
            return Ok(0);
        }
        run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                let mut changed = 0;
                for (username, entity) in &updates {
                    changed += sqlx::query(
                        "UPDATE developer SET entity = ? WHERE username = ? AND entity != ?",
                    )
                    .bind(entity)
                    .bind(username)
                    .bind(entity)
                    .execute(&mut *conn)
                    .await
                    .map_err(DbError::Query)?
                    .rows_affected();
                }
                Ok(changed)
            })
        })
        .await
    }

    async fn list_entities(&self, limit: i64) -> Result<Vec<EntityListItem>> {
        sqlx::query_as::<_, EntityListItem>(
            r#"
            SELECT d.entity AS entity,
                   COUNT(DISTINCT d.username) AS developers,
                   COUNT(e.id) AS events
            FROM developer d
            LEFT JOIN event e ON e.username = d.username
            WHERE d.entity != ''
            GROUP BY d.entity
            ORDER BY events DESC, d.entity
            LIMIT ?
            "#,
        )
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    async fn entity_details(&self, entity: &str, limit: i64) -> Result<Option<EntityDetails>> {
        let developers = sqlx::query_as::<_, DeveloperListItem>(
            r#"
            SELECT d.username, d.full_name, d.email, d.entity,
                   (SELECT COUNT(*) FROM event e WHERE e.username = d.username) AS events
            FROM developer d
            WHERE d.entity = ?
            ORDER BY events DESC, d.username
            LIMIT ?
            "#,
        )
        .bind(entity)
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        if developers.is_empty() {
            return Ok(None);
        }

        let repos = sqlx::query_as::<_, RepoEventCount>(
            r#"
            SELECT e.org, e.repo, COUNT(*) AS events
            FROM event e
            JOIN developer d ON d.username = e.username
            WHERE d.entity = ?
            GROUP BY e.org, e.repo
            ORDER BY events DESC, e.org, e.repo
            LIMIT ?
            "#,
        )
        .bind(entity)
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)?;

        Ok(Some(EntityDetails {
            entity: entity.to_string(),
            developers,
            repos,
        }))
    }
}
