use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, instrument};

use super::developers::upsert_developer;
use super::events::insert_event;
use super::run_in_transaction;
use super::state::save_state;
use crate::errors::Result;
use crate::models::{BatchOutcome, ImportBatch};
use crate::repositories::ImportRepository;

/// Developers first, then events, then cursors, on the caller's transaction.
pub async fn write_batch(conn: &mut SqliteConnection, batch: &ImportBatch) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();

    for developer in &batch.developers {
        upsert_developer(conn, developer).await?;
        outcome.developers += 1;
    }
    for event in &batch.events {
        if insert_event(conn, event).await? {
            outcome.events_inserted += 1;
        }
    }
    for (key, state) in &batch.states {
        save_state(conn, &key.stream, &key.org, &key.repo, state).await?;
        outcome.states += 1;
    }

    Ok(outcome)
}

#[derive(Clone)]
pub(crate) struct SqliteImportRepository {
    pub(crate) pool: SqlitePool,
}

#[async_trait]
impl ImportRepository for SqliteImportRepository {
    #[instrument(
        skip(self, batch),
        fields(
            developers = batch.developers.len(),
            events = batch.events.len(),
            states = batch.states.len()
        )
    )]
    async fn commit_batch(&self, batch: ImportBatch) -> Result<BatchOutcome> {
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let outcome = run_in_transaction(&self.pool, move |conn| {
            Box::pin(async move { write_batch(conn, &batch).await })
        })
        .await?;
        debug!(inserted = outcome.events_inserted, "batch committed");
        Ok(outcome)
    }
}
