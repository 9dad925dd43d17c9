use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::instrument;

use super::scope::{non_empty, push_event_scope, push_repo_scope, Clause};
use crate::errors::{DbError, Result};
use crate::models::{
    CadenceRow, DownloadsRow, DurationRow, ForkActivityRow, MonthTypeCount, NamedCount,
    PrReviewRow, RetentionRow, Scope, TagDownloadsRow,
};
use crate::repositories::InsightRepository;

const RECENT_RELEASES: i64 = 9;

#[derive(Clone)]
pub(crate) struct SqliteInsightRepository {
    pub(crate) pool: SqlitePool,
}

/// Release filters: org/repo plus the window on `published_at`.
fn push_release_scope(builder: &mut QueryBuilder<'_, Sqlite>, clause: &mut Clause, scope: &Scope) {
    push_repo_scope(builder, clause, scope, "r");
    if let Some(since) = non_empty(&scope.since) {
        clause.next(builder);
        builder.push("substr(r.published_at, 1, 10) >= ");
        builder.push_bind(since.to_string());
    }
}

/// Average of `end - start` in days, keyed by the month of `end`.
fn duration_query(
    scope: &Scope,
    event_type: &str,
    end: &str,
    closed_only: bool,
) -> QueryBuilder<'static, Sqlite> {
    let mut builder = QueryBuilder::<Sqlite>::new(format!(
        r#"
        SELECT substr(e.{end}, 1, 7) AS month,
               COUNT(*) AS count,
               AVG(julianday(e.{end}) - julianday(e.created_at)) AS avg_days
        FROM event e
        WHERE e.type = '{event_type}'
          AND e.{end} IS NOT NULL AND e.{end} != ''
          AND e.created_at IS NOT NULL AND e.created_at != ''
        "#
    ));
    if closed_only {
        builder.push(" AND e.state = 'closed'");
    }
    let mut clause = Clause::continued();
    push_event_scope(&mut builder, &mut clause, scope, "e");
    builder.push(" GROUP BY month ORDER BY month");
    builder
}

#[async_trait]
impl InsightRepository for SqliteInsightRepository {
    #[instrument(skip(self))]
    async fn developer_event_counts(&self, scope: Scope) -> Result<Vec<NamedCount>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT e.username AS name, COUNT(*) AS count FROM event e");
        let mut clause = Clause::new();
        push_event_scope(&mut builder, &mut clause, &scope, "e");
        builder.push(" GROUP BY e.username ORDER BY count DESC, name");

        builder
            .build_query_as::<NamedCount>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    #[instrument(skip(self))]
    async fn entity_event_counts(&self, scope: Scope) -> Result<Vec<NamedCount>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT d.entity AS name, COUNT(*) AS count
            FROM event e
            JOIN developer d ON d.username = e.username
            WHERE d.entity != ''
            "#,
        );
        let mut clause = Clause::continued();
        push_event_scope(&mut builder, &mut clause, &scope, "e");
        builder.push(" GROUP BY d.entity ORDER BY count DESC, name");

        builder
            .build_query_as::<NamedCount>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn event_type_series(&self, scope: Scope) -> Result<Vec<MonthTypeCount>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT substr(e.date, 1, 7) AS month, e.type AS type, COUNT(*) AS count FROM event e",
        );
        let mut clause = Clause::new();
        push_event_scope(&mut builder, &mut clause, &scope, "e");
        builder.push(" GROUP BY month, e.type ORDER BY month, e.type");

        builder
            .build_query_as::<MonthTypeCount>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    /// First-ever activity ignores the window; activity months respect it.
    async fn retention(&self, scope: Scope) -> Result<Vec<RetentionRow>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "WITH firsts AS (SELECT e.username, MIN(e.date) AS first_date FROM event e",
        );
        let unwindowed = Scope {
            since: None,
            ..scope.clone()
        };
        let mut clause = Clause::new();
        push_event_scope(&mut builder, &mut clause, &unwindowed, "e");
        builder.push(
            " GROUP BY e.username), active AS (SELECT DISTINCT substr(e.date, 1, 7) AS month, e.username FROM event e",
        );
        let mut clause = Clause::new();
        push_event_scope(&mut builder, &mut clause, &scope, "e");
        builder.push(
            r#")
            SELECT a.month AS month,
                   SUM(CASE WHEN substr(f.first_date, 1, 7) = a.month THEN 1 ELSE 0 END) AS "new",
                   SUM(CASE WHEN substr(f.first_date, 1, 7) < a.month THEN 1 ELSE 0 END) AS "returning"
            FROM active a
            JOIN firsts f ON f.username = a.username
            GROUP BY a.month
            ORDER BY a.month
            "#,
        );

        builder
            .build_query_as::<RetentionRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn time_to_merge(&self, scope: Scope) -> Result<Vec<DurationRow>> {
        let mut builder = duration_query(&scope, "pull_request", "merged_at", false);
        builder
            .build_query_as::<DurationRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn time_to_close(&self, scope: Scope) -> Result<Vec<DurationRow>> {
        let mut builder = duration_query(&scope, "issue", "closed_at", true);
        builder
            .build_query_as::<DurationRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn pr_review_counts(&self, scope: Scope) -> Result<Vec<PrReviewRow>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT substr(e.date, 1, 7) AS month,
                   SUM(CASE WHEN e.type = 'pull_request' THEN 1 ELSE 0 END) AS prs,
                   SUM(CASE WHEN e.type = 'pull_request_review' THEN 1 ELSE 0 END) AS reviews
            FROM event e
            WHERE e.type IN ('pull_request', 'pull_request_review')
            "#,
        );
        let mut clause = Clause::continued();
        push_event_scope(&mut builder, &mut clause, &scope, "e");
        builder.push(" GROUP BY month ORDER BY month");

        builder
            .build_query_as::<PrReviewRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn forks_and_activity(&self, scope: Scope) -> Result<Vec<ForkActivityRow>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT substr(e.date, 1, 7) AS month,
                   SUM(CASE WHEN e.type = 'fork' THEN 1 ELSE 0 END) AS forks,
                   SUM(CASE WHEN e.type != 'fork' THEN 1 ELSE 0 END) AS events
            FROM event e
            "#,
        );
        let mut clause = Clause::new();
        push_event_scope(&mut builder, &mut clause, &scope, "e");
        builder.push(" GROUP BY month ORDER BY month");

        builder
            .build_query_as::<ForkActivityRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn release_cadence(&self, scope: Scope) -> Result<Vec<CadenceRow>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT substr(r.published_at, 1, 7) AS month,
                   COUNT(*) AS total,
                   SUM(CASE WHEN r.prerelease = 0 THEN 1 ELSE 0 END) AS stable
            FROM releases r
            "#,
        );
        let mut clause = Clause::new();
        push_release_scope(&mut builder, &mut clause, &scope);
        builder.push(" GROUP BY month ORDER BY month");

        builder
            .build_query_as::<CadenceRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn release_downloads(&self, scope: Scope) -> Result<Vec<DownloadsRow>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT substr(r.published_at, 1, 7) AS month,
                   COALESCE(SUM(a.download_count), 0) AS downloads
            FROM releases r
            LEFT JOIN release_asset a
                ON a.org = r.org AND a.repo = r.repo AND a.tag = r.tag
            "#,
        );
        let mut clause = Clause::new();
        push_release_scope(&mut builder, &mut clause, &scope);
        builder.push(" GROUP BY month ORDER BY month");

        builder
            .build_query_as::<DownloadsRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    /// Recent releases plus the all-time most downloaded one, oldest first.
    async fn release_downloads_by_tag(&self, scope: Scope) -> Result<Vec<TagDownloadsRow>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            WITH totals AS (
                SELECT r.org AS org, r.repo AS repo, r.tag AS tag, r.published_at AS published_at,
                       COALESCE(SUM(a.download_count), 0) AS downloads
                FROM releases r
                LEFT JOIN release_asset a
                    ON a.org = r.org AND a.repo = r.repo AND a.tag = r.tag
            "#,
        );
        let mut clause = Clause::new();
        push_repo_scope(&mut builder, &mut clause, &scope, "r");
        builder.push(
            r#"
                GROUP BY r.org, r.repo, r.tag, r.published_at
            ),
            recent AS (
                SELECT org, repo, tag, published_at, downloads
                FROM totals
                ORDER BY published_at DESC
                LIMIT "#,
        );
        builder.push_bind(RECENT_RELEASES);
        builder.push(
            r#"
            ),
            best AS (
                SELECT org, repo, tag, published_at, downloads
                FROM totals
                ORDER BY downloads DESC, published_at DESC
                LIMIT 1
            )
            SELECT org, repo, tag, published_at, downloads
            FROM (SELECT * FROM recent UNION SELECT * FROM best)
            ORDER BY published_at ASC, tag ASC
            "#,
        );

        builder
            .build_query_as::<TagDownloadsRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }
}
