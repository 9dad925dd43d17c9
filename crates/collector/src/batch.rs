use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use db::{BatchOutcome, DbError, DeveloperRow, EventRow, ImportBatch, PageState, Repositories, StateKey};
use normalizer::NormalizedEvent;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::metrics;

#[derive(Default)]
struct Pending {
    events: Vec<EventRow>,
    developers: HashMap<String, DeveloperRow>,
    states: BTreeMap<StateKey, PageState>,
    totals: BatchOutcome,
}

impl Pending {
    fn take(&mut self) -> ImportBatch {
        ImportBatch {
            developers: self.developers.drain().map(|(_, dev)| dev).collect(),
            events: std::mem::take(&mut self.events),
            states: std::mem::take(&mut self.states).into_iter().collect(),
        }
    }
}

/// In-memory batch shared by every stream of one repository import.
///
/// A page's events, its authors and the stream cursor that follows it are
/// appended under one lock, so any flush writes a cursor only together with
/// the events it covers.
pub struct SharedBatch {
    store: Arc<dyn Repositories>,
    threshold: usize,
    pending: Mutex<Pending>,
}

impl SharedBatch {
    pub fn new(store: Arc<dyn Repositories>, threshold: usize) -> Self {
        Self {
            store,
            threshold: threshold.max(1),
            pending: Mutex::new(Pending::default()),
        }
    }

    /// Appends one page and flushes once the threshold is reached.
    pub async fn append(
        &self,
        key: &StateKey,
        items: Vec<NormalizedEvent>,
        state: PageState,
    ) -> Result<(), DbError> {
        let mut pending = self.pending.lock().await;
        if !items.is_empty() {
            metrics::EVENTS_IMPORTED_TOTAL
                .with_label_values(&[key.stream.as_str()])
                .inc_by(items.len() as u64);
        }
        for item in items {
            pending
                .developers
                .insert(item.author.username.clone(), item.author);
            pending.events.push(item.event);
        }
        pending.states.insert(key.clone(), state);

        if pending.events.len() >= self.threshold {
            self.flush_locked(&mut pending).await?;
        }
        Ok(())
    }

    pub async fn flush(&self) -> Result<(), DbError> {
        let mut pending = self.pending.lock().await;
        self.flush_locked(&mut pending).await
    }

    /// Running totals of everything this batch has committed.
    pub async fn totals(&self) -> BatchOutcome {
        self.pending.lock().await.totals
    }

    async fn flush_locked(&self, pending: &mut Pending) -> Result<(), DbError> {
        let batch = pending.take();
        if batch.is_empty() {
            return Ok(());
        }
        let events = batch.events.len();
        let timer = metrics::FLUSH_DURATION.start_timer();
        let result = self.store.imports().commit_batch(batch).await;
        timer.observe_duration();

        match result {
            Ok(outcome) => {
                metrics::FLUSHES_TOTAL.with_label_values(&["success"]).inc();
                debug!(
                    events,
                    inserted = outcome.events_inserted,
                    developers = outcome.developers,
                    states = outcome.states,
                    "flushed import batch"
                );
                pending.totals.developers += outcome.developers;
                pending.totals.events_inserted += outcome.events_inserted;
                pending.totals.states += outcome.states;
                Ok(())
            }
            Err(err) => {
                metrics::FLUSHES_TOTAL.with_label_values(&["error"]).inc();
                warn!(events, error = %err, "import batch rolled back");
                Err(err)
            }
        }
    }
}
