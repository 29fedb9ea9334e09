use anyhow::Context;
use axum::{http::StatusCode, routing::get, Router};
use rand::{rngs::StdRng, SeedableRng};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use track_api::{
    metrics, rest,
    simulate::{simulate_track, TrackPlan},
    store::{load_records, TrackStore},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let http_addr = env::var("HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let api_token = env::var("API_TOKEN").unwrap_or_else(|_| "pass12345!".to_string());
    let devices = env::var("DEVICES").unwrap_or_else(|_| "440103123456789".to_string());
    let records_per_device: usize = env::var("RECORDS_PER_DEVICE")
        .unwrap_or_else(|_| "200".to_string())
        .parse()
        .unwrap_or(200);
    let interval_ms: i64 = env::var("RECORD_INTERVAL_MS")
        .unwrap_or_else(|_| "60000".to_string())
        .parse()
        .unwrap_or(60_000);
    let seed: u64 = env::var("SEED")
        .unwrap_or_else(|_| "1".to_string())
        .parse()
        .unwrap_or(1);
    let seed_file = env::var("SEED_FILE").ok().map(PathBuf::from);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    info!("Starting track API");
    info!("HTTP server: {}", http_addr);

    metrics::init_metrics().context("registering metrics")?;

    let store = Arc::new(TrackStore::new());
    match seed_file {
        Some(path) => {
            let records = load_records(&path)
                .with_context(|| format!("loading records from {}", path.display()))?;
            store.insert_many(records).await;
        }
        None => {
            let mut rng = StdRng::seed_from_u64(seed);
            let newest_ms = chrono::Utc::now().timestamp_millis();
            for imsi in devices.split(',').map(str::trim).filter(|d| !d.is_empty()) {
                let plan = TrackPlan {
                    imsi: imsi.to_string(),
                    count: records_per_device,
                    newest_ms,
                    interval_ms,
                };
                store.insert_many(simulate_track(&mut rng, &plan)).await;
            }
        }
    }
    info!(
        "Serving {} records for {} devices",
        store.record_count().await,
        store.device_count().await
    );

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .merge(rest::create_router(store, &api_token));

    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .with_context(|| format!("binding {}", http_addr))?;
    info!("HTTP server listening on {}", http_addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("HTTP server error: {}", e);
        }
    });

    tokio::select! {
        _ = server_handle => {
            error!("HTTP server terminated");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down");
    Ok(())
}

async fn metrics_handler() -> Result<String, StatusCode> {
    metrics::gather_metrics().map_err(|e| {
        error!("Failed to encode metrics: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
