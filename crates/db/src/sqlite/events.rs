use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::instrument;

use super::developers::clamp_limit;
use super::scope::{like, non_empty, Clause};
use crate::errors::{DbError, Result};
use crate::models::{EventRow, EventSearch, LookupKind, LookupRow, RepoEventCount};
use crate::repositories::EventRepository;

const INSERT_EVENT: &str = r#"
    INSERT INTO event (
        id, org, repo, username, type, date, state, number,
        created_at, closed_at, merged_at, url, mentions, labels, additions, deletions
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT DO NOTHING
"#;

/// Inserts one event; returns whether a new row was written.
pub(crate) async fn insert_event(conn: &mut SqliteConnection, event: &EventRow) -> Result<bool> {
    sqlx::query(INSERT_EVENT)
        .bind(event.id)
        .bind(&event.org)
        .bind(&event.repo)
        .bind(&event.username)
        .bind(&event.event_type)
        .bind(&event.date)
        .bind(&event.state)
        .bind(event.number)
        .bind(&event.created_at)
        .bind(&event.closed_at)
        .bind(&event.merged_at)
        .bind(&event.url)
        .bind(&event.mentions)
        .bind(&event.labels)
        .bind(event.additions)
        .bind(event.deletions)
        .execute(&mut *conn)
        .await
        .map(|done| done.rows_affected() > 0)
        .map_err(DbError::Query)
}

#[derive(Clone)]
pub(crate) struct SqliteEventRepository {
    pub(crate) pool: SqlitePool,
}

#[async_trait]
impl EventRepository for SqliteEventRepository {
    #[instrument(skip(self, search))]
    async fn search(&self, search: EventSearch) -> Result<Vec<EventRow>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT e.id, e.org, e.repo, e.username, e.type, e.date, e.state, e.number,
                   e.created_at, e.closed_at, e.merged_at, e.url, e.mentions, e.labels,
                   e.additions, e.deletions
            FROM event e
            "#,
        );
        let mut clause = Clause::new();

        if let Some(org) = non_empty(&search.org) {
            clause.next(&mut builder);
            builder.push("e.org = ");
            builder.push_bind(org.to_string());
        }
        if let Some(repo) = non_empty(&search.repo) {
            clause.next(&mut builder);
            builder.push("e.repo = ");
            builder.push_bind(repo.to_string());
        }
        if let Some(username) = non_empty(&search.username) {
            clause.next(&mut builder);
            builder.push("e.username = ");
            builder.push_bind(username.to_string());
        }
        if let Some(event_type) = non_empty(&search.event_type) {
            clause.next(&mut builder);
            builder.push("e.type = ");
            builder.push_bind(event_type.to_string());
        }
        if let Some(from_date) = non_empty(&search.from_date) {
            clause.next(&mut builder);
            builder.push("e.date >= ");
            builder.push_bind(from_date.to_string());
        }
        if let Some(entity) = non_empty(&search.entity) {
            clause.next(&mut builder);
            builder.push("e.username IN (SELECT username FROM developer WHERE entity LIKE ");
            builder.push_bind(like(entity));
            builder.push(")");
        }
        if let Some(mention) = non_empty(&search.mention) {
            clause.next(&mut builder);
            builder.push("e.mentions LIKE ");
            builder.push_bind(like(mention));
        }
        if let Some(label) = non_empty(&search.label) {
            clause.next(&mut builder);
            builder.push("e.labels LIKE ");
            builder.push_bind(like(label));
        }

        builder.push(" ORDER BY e.date DESC, e.id DESC LIMIT ");
        builder.push_bind(search.clamped_page_size());
        builder.push(" OFFSET ");
        builder.push_bind(search.offset());

        builder
            .build_query_as::<EventRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM event")
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn repositories(&self) -> Result<Vec<(String, String)>> {
        sqlx::query_as("SELECT DISTINCT org, repo FROM event ORDER BY org, repo")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn orgs(&self) -> Result<Vec<String>> {
        sqlx::query_scalar("SELECT DISTINCT org FROM event ORDER BY org")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn org_repos(&self, org: &str, limit: i64) -> Result<Vec<RepoEventCount>> {
        sqlx::query_as::<_, RepoEventCount>(
            r#"
            SELECT org, repo, COUNT(*) AS events
            FROM event
            WHERE org = ?
            GROUP BY org, repo
            ORDER BY events DESC, repo
            LIMIT ?
            "#,
        )
        .bind(org)
        .bind(clamp_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }

    async fn min_date(&self, org: Option<&str>, repo: Option<&str>) -> Result<Option<String>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT MIN(e.date) FROM event e");
        let mut clause = Clause::new();
        if let Some(org) = org.filter(|v| !v.is_empty()) {
            clause.next(&mut builder);
            builder.push("e.org = ");
            builder.push_bind(org.to_string());
        }
        if let Some(repo) = repo.filter(|v| !v.is_empty()) {
            clause.next(&mut builder);
            builder.push("e.repo = ");
            builder.push_bind(repo.to_string());
        }
        builder
            .build_query_scalar::<Option<String>>()
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn lookup(&self, kind: LookupKind, query: &str, limit: i64) -> Result<Vec<LookupRow>> {
        let sql = match kind {
            LookupKind::Org => {
                r#"
                SELECT org AS value, COUNT(*) AS count
                FROM event
                WHERE org LIKE ?
                GROUP BY org
                ORDER BY count DESC, org
                LIMIT ?
                "#
            }
            LookupKind::Repo => {
                r#"
                SELECT repo AS value, COUNT(*) AS count
                FROM event
                WHERE repo LIKE ?
                GROUP BY repo
                ORDER BY count DESC, repo
                LIMIT ?
                "#
            }
            LookupKind::Entity => {
                r#"
                SELECT entity AS value, COUNT(*) AS count
                FROM developer
                WHERE entity != '' AND entity LIKE ?
                GROUP BY entity
                ORDER BY count DESC, entity
                LIMIT ?
                "#
            }
        };

        sqlx::query_as::<_, LookupRow>(sql)
            .bind(like(query))
            .bind(clamp_limit(limit))
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }
}
