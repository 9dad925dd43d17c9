use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_broker_requests_total",
        "Requests by status class",
        &["status"]
    )
    .expect("requests total")
});

pub static RATE_REMAINING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "gh_broker_rate_remaining",
        "Rate limit remaining as last reported"
    )
    .expect("rate remaining")
});

pub static RATE_LIMIT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("gh_broker_rate_limit", "Rate limit as last reported")
        .expect("rate limit")
});

pub static SLEEP_SECONDS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gh_broker_sleep_seconds_total",
        "Total seconds spent waiting for the rate limit to reset"
    )
    .expect("sleep seconds")
});

pub static LATENCY: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!("gh_broker_latency_seconds", "Request latency").expect("latency")
});
