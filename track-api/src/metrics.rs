use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref QUERIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "track_api_queries_total",
        "Total track queries received"
    ))
    .unwrap();
    pub static ref REJECTED_QUERIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "track_api_rejected_queries_total",
        "Total track queries rejected by authorization or validation"
    ))
    .unwrap();
    pub static ref RECORDS_SERVED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "track_api_records_served_total",
        "Total records returned to clients"
    ))
    .unwrap();
    pub static ref BUTTON_PRESSES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "track_api_button_presses_total",
        "Total stored records reporting a button press"
    ))
    .unwrap();
    pub static ref QUERY_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "track_api_query_latency_seconds",
            "Time taken to answer a track query"
        )
        .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5])
    )
    .unwrap();
}

pub fn init_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(QUERIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REJECTED_QUERIES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECORDS_SERVED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BUTTON_PRESSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUERY_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
