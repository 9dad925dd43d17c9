use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

pub static ACTIVE_REPOS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "importer_active_repositories",
        "Number of repositories currently being imported"
    )
    .expect("importer active repositories gauge")
});

pub static REPOS_PROCESSED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "importer_repositories_processed_total",
        "Repositories processed by the importer grouped by outcome",
        &["outcome"]
    )
    .expect("importer repositories processed")
});

pub static REPO_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "importer_repository_duration_seconds",
        "Duration spent importing a repository grouped by outcome",
        &["outcome"],
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0, 600.0]
    )
    .expect("importer repository duration histogram")
});

pub static EVENTS_IMPORTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "importer_events_imported_total",
        "Normalized events appended to the import batch per event type",
        &["type"]
    )
    .expect("importer events imported")
});

pub static STREAM_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "importer_stream_errors_total",
        "Streams aborted by an error per event type",
        &["type"]
    )
    .expect("importer stream errors")
});

pub static FLUSHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "importer_flushes_total",
        "Batch flushes grouped by outcome",
        &["outcome"]
    )
    .expect("importer flushes")
});

pub static FLUSH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "importer_flush_duration_seconds",
        "Duration of batch flush transactions",
        vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]
    )
    .expect("importer flush duration histogram")
});

pub static FETCH_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "importer_fetch_requests_total",
        "Fetcher calls grouped by operation and outcome",
        &["op", "outcome"]
    )
    .expect("importer fetch requests total")
});

pub static FETCH_ITEMS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "importer_fetch_items_total",
        "Items returned by fetch operations grouped by operation",
        &["op"]
    )
    .expect("importer fetch items total")
});

pub static FETCH_LATENCY_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "importer_fetch_latency_seconds",
        "Latency of fetcher calls grouped by operation",
        &["op"],
        vec![0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0]
    )
    .expect("importer fetch latency seconds")
});

pub static USERS_404_SKIPS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "users_404_skips_total",
        "Number of user fetches skipped due to 404 Not Found"
    )
    .expect("users 404 skips total")
});

pub struct ActiveRepoGuard;

impl Default for ActiveRepoGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ActiveRepoGuard {
    pub fn new() -> Self {
        ACTIVE_REPOS.inc();
        Self
    }
}

impl Drop for ActiveRepoGuard {
    fn drop(&mut self) {
        ACTIVE_REPOS.dec();
    }
}
