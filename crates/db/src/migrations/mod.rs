//! Forward-only schema migrations.
//!
//! Each migration is embedded with [`include_str!`] and applied inside its own
//! transaction. Applied versions are recorded in `schema_version`; versions at
//! or below the recorded maximum are skipped.

use sqlx::{Executor, SqlitePool};
use tracing::{debug, info};

use crate::errors::{DbError, Result};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "developer, event, state and substitution tables",
        sql: include_str!("v001_schema.sql"),
    },
    Migration {
        version: 2,
        description: "releases, release assets and repository metadata",
        sql: include_str!("v002_releases.sql"),
    },
    Migration {
        version: 3,
        description: "developer reputation columns",
        sql: include_str!("v003_reputation.sql"),
    },
];

/// Applies every migration newer than the current version. Returns how many ran.
pub async fn run_migrations(pool: &SqlitePool) -> Result<u32> {
    ensure_version_table(pool).await?;
    let current = current_version(pool).await?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(
                version = migration.version,
                "migration already applied, skipping"
            );
            continue;
        }

        info!(
            version = migration.version,
            description = migration.description,
            "applying migration"
        );
        apply_migration(pool, migration).await?;
        applied += 1;
    }

    if applied > 0 {
        info!(applied, latest = latest_version(), "migrations complete");
    }
    Ok(applied)
}

pub async fn current_version(pool: &SqlitePool) -> Result<u32> {
    let version: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
        .fetch_one(pool)
        .await
        .map_err(DbError::Query)?;
    Ok(version as u32)
}

pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

async fn ensure_version_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version     INTEGER PRIMARY KEY,
            applied_at  TEXT    NOT NULL,
            description TEXT
        )",
    )
    .await
    .map(|_| ())
    .map_err(DbError::Query)
}

async fn apply_migration(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let failed = |source| DbError::Migration {
        version: migration.version,
        source,
    };

    let mut tx = pool.begin().await.map_err(failed)?;
    (&mut *tx).execute(migration.sql).await.map_err(failed)?;
    sqlx::query(
        "INSERT INTO schema_version (version, applied_at, description)
         VALUES (?, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'), ?)",
    )
    .bind(migration.version as i64)
    .bind(migration.description)
    .execute(&mut *tx)
    .await
    .map_err(failed)?;
    tx.commit().await.map_err(failed)
}
