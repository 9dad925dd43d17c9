use async_trait::async_trait;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::instrument;

use super::run_in_transaction;
use super::scope::Clause;
use crate::errors::{DbError, Result};
use crate::models::{ReleaseAssetRow, ReleaseRow, RepoMetaRow};
use crate::repositories::ReleaseRepository;

#[derive(Clone)]
pub(crate) struct SqliteReleaseRepository {
    pub(crate) pool: SqlitePool,
}

#[async_trait]
impl ReleaseRepository for SqliteReleaseRepository {
    #[instrument(skip(self, releases, assets), fields(releases = releases.len(), assets = assets.len()))]
    async fn upsert_releases(
        &self,
        releases: Vec<ReleaseRow>,
        assets: Vec<ReleaseAssetRow>,
    ) -> Result<()> {
        run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move {
                for release in &releases {
                    sqlx::query(
                        r#"
                        INSERT INTO releases (org, repo, tag, name, published_at, prerelease)
                        VALUES (?, ?, ?, ?, ?, ?)
                        ON CONFLICT (org, repo, tag) DO UPDATE
                            SET name = excluded.name,
                                published_at = excluded.published_at,
                                prerelease = excluded.prerelease
                        "#,
                    )
                    .bind(&release.org)
                    .bind(&release.repo)
                    .bind(&release.tag)
                    .bind(&release.name)
                    .bind(&release.published_at)
                    .bind(release.prerelease)
                    .execute(&mut *conn)
                    .await
                    .map_err(DbError::Query)?;
                }

                for asset in &assets {
                    sqlx::query(
                        r#"
                        INSERT INTO release_asset (
                            org, repo, tag, name, content_type, size, download_count, updated_at
                        )
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                        ON CONFLICT (org, repo, tag, name) DO UPDATE
                            SET content_type = excluded.content_type,
                                size = excluded.size,
                                download_count = excluded.download_count,
                                updated_at = excluded.updated_at
                        "#,
                    )
                    .bind(&asset.org)
                    .bind(&asset.repo)
                    .bind(&asset.tag)
                    .bind(&asset.name)
                    .bind(&asset.content_type)
                    .bind(asset.size)
                    .bind(asset.download_count)
                    .bind(&asset.updated_at)
                    .execute(&mut *conn)
                    .await
                    .map_err(DbError::Query)?;
                }
                Ok(())
            })
        })
        .await
    }

    #[instrument(skip(self, meta), fields(org = %meta.org, repo = %meta.repo))]
    async fn upsert_repo_meta(&self, meta: RepoMetaRow) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO repo_meta (
                org, repo, stars, forks, open_issues, language, license, archived, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (org, repo) DO UPDATE
                SET stars = excluded.stars,
                    forks = excluded.forks,
                    open_issues = excluded.open_issues,
                    language = excluded.language,
                    license = excluded.license,
                    archived = excluded.archived,
                    updated_at = excluded.updated_at
            "#,
        )
        .bind(&meta.org)
        .bind(&meta.repo)
        .bind(meta.stars)
        .bind(meta.forks)
        .bind(meta.open_issues)
        .bind(&meta.language)
        .bind(&meta.license)
        .bind(meta.archived)
        .bind(&meta.updated_at)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(DbError::Query)
    }

    async fn list_repo_meta(
        &self,
        org: Option<&str>,
        repo: Option<&str>,
    ) -> Result<Vec<RepoMetaRow>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT org, repo, stars, forks, open_issues, language, license, archived, updated_at
            FROM repo_meta
            "#,
        );
        let mut clause = Clause::new();
        if let Some(org) = org.filter(|v| !v.is_empty()) {
            clause.next(&mut builder);
            builder.push("org = ");
            builder.push_bind(org.to_string());
        }
        if let Some(repo) = repo.filter(|v| !v.is_empty()) {
            clause.next(&mut builder);
            builder.push("repo = ");
            builder.push_bind(repo.to_string());
        }
        builder.push(" ORDER BY stars DESC, org, repo");

        builder
            .build_query_as::<RepoMetaRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::Query)
    }

    async fn assets(&self, org: &str, repo: &str, tag: &str) -> Result<Vec<ReleaseAssetRow>> {
        sqlx::query_as::<_, ReleaseAssetRow>(
            r#"
            SELECT org, repo, tag, name, content_type, size, download_count, updated_at
            FROM release_asset
            WHERE org = ? AND repo = ? AND tag = ?
            ORDER BY name
            "#,
        )
        .bind(org)
        .bind(repo)
        .bind(tag)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::Query)
    }
}
