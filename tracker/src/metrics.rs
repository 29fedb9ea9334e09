use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref FETCHES_ISSUED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "tracker_fetches_issued_total",
        "Total track fetches sent after the debounce window"
    ))
    .unwrap();
    pub static ref FETCH_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "tracker_fetch_failures_total",
        "Total track fetches that failed and forced re-authentication"
    ))
    .unwrap();
    pub static ref STALE_RESPONSES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "tracker_stale_responses_total",
        "Total responses discarded because a newer fetch had been issued"
    ))
    .unwrap();
    pub static ref SUPERSEDED_SCHEDULES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "tracker_superseded_schedules_total",
        "Total pending requests replaced inside the debounce window"
    ))
    .unwrap();
    pub static ref GATED_EVENTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "tracker_gated_events_total",
        "Total parameter changes ignored while logged out"
    ))
    .unwrap();
    pub static ref LIVE_MARKERS: Gauge = Gauge::with_opts(Opts::new(
        "tracker_live_markers",
        "Markers currently placed on the map surface"
    ))
    .unwrap();
    pub static ref FETCH_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "tracker_fetch_latency_seconds",
            "Time from issuing a track fetch to its completion"
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .unwrap();
}

pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(FETCHES_ISSUED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FETCH_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STALE_RESPONSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SUPERSEDED_SCHEDULES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GATED_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(LIVE_MARKERS.clone()))?;
    REGISTRY.register(Box::new(FETCH_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
