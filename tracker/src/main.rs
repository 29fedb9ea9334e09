use anyhow::Context;
use axum::{routing::get, Router};
use clap::{Parser, ValueEnum};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tracker::config::{DEFAULT_QUIET_PERIOD_MS, DEFAULT_REQUEST_TIMEOUT_SECS, RESULT_LIMIT_PRESETS};
use tracker::console::{self, HELP};
use tracker::{
    metrics, AuthProvider, CognitoProvider, Command, HeadlessMap, HttpTrackSource, LatLon,
    Notice, PassphraseProvider, QueryBuilder, QueryParameters, SyncConfig, SyncController,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AuthMode {
    /// The password is sent as the API token
    Passphrase,
    /// Exchange user name and password for a user-pool id token
    Cognito,
}

#[derive(Debug, Parser)]
#[command(name = "tracker", about = "Follow a device's location history on a map")]
struct Args {
    /// Track query endpoint, e.g. https://<api>.execute-api.us-west-2.amazonaws.com/v1/gps-data
    #[arg(long, env = "TRACKER_API_URL")]
    api_url: String,

    /// Device identifier (IMSI)
    #[arg(long, env = "TRACKER_DEVICE")]
    device: String,

    #[arg(long, env = "TRACKER_AUTH", value_enum, default_value = "passphrase")]
    auth: AuthMode,

    #[arg(long, env = "TRACKER_COGNITO_REGION", default_value = "us-west-2")]
    cognito_region: String,

    #[arg(long, env = "TRACKER_COGNITO_CLIENT_ID")]
    cognito_client_id: Option<String>,

    /// Overrides the regional identity provider endpoint
    #[arg(long, env = "TRACKER_COGNITO_ENDPOINT")]
    cognito_endpoint: Option<String>,

    /// Log in right away with these credentials
    #[arg(long, env = "TRACKER_USER")]
    user: Option<String>,

    #[arg(long, env = "TRACKER_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Number of records per fetch
    #[arg(long, default_value = "1", value_parser = console::parse_limit)]
    limit: NonZeroU32,

    /// Only records older than this (epoch ms, `now`, or 0 for no bound)
    #[arg(long, default_value = "now", value_parser = console::parse_upper_bound)]
    before: u64,

    #[arg(long, default_value_t = DEFAULT_QUIET_PERIOD_MS)]
    quiet_ms: u64,

    #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
    timeout_secs: u64,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "TRACKER_METRICS_ADDR")]
    metrics_addr: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting tracker");
    info!("Track endpoint: {}", args.api_url);
    info!("Device: {}", args.device);
    if !RESULT_LIMIT_PRESETS.contains(&args.limit.get()) {
        warn!(
            "Limit {} is not one of the usual presets {:?}",
            args.limit, RESULT_LIMIT_PRESETS
        );
    }

    metrics::init_metrics().context("registering metrics")?;
    if let Some(addr) = args.metrics_addr.clone() {
        tokio::spawn(async move {
            if let Err(e) = serve_metrics(&addr).await {
                error!("Metrics server failed: {}", e);
            }
        });
    }

    let config = SyncConfig {
        quiet_period: Duration::from_millis(args.quiet_ms),
        request_timeout: Duration::from_secs(args.timeout_secs),
        ..SyncConfig::default()
    };

    let provider: Arc<dyn AuthProvider> = match args.auth {
        AuthMode::Passphrase => Arc::new(PassphraseProvider),
        AuthMode::Cognito => {
            let client_id = args
                .cognito_client_id
                .clone()
                .context("--cognito-client-id is required with --auth cognito")?;
            let provider = match &args.cognito_endpoint {
                Some(endpoint) => CognitoProvider::new(endpoint.clone(), client_id, config.request_timeout)?,
                None => CognitoProvider::for_region(&args.cognito_region, client_id, config.request_timeout)?,
            };
            Arc::new(provider)
        }
    };

    let source = Arc::new(HttpTrackSource::new(config.request_timeout)?);
    let builder = QueryBuilder::new(&args.api_url)?;
    let mut params = QueryParameters::new(args.device.clone(), args.limit);
    params.upper_bound = args.before;

    // Whole country view until the first track arrives
    let map = HeadlessMap::with_view(LatLon { lat: 35.40, lon: 136.0 }, 5);
    let (controller, mut notices) =
        SyncController::new(provider, source, builder, params, map, &config)?;

    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            match notice {
                Notice::LoggedIn { username } => info!("Logged in as '{}'", username),
                Notice::Loaded { records, markers } => {
                    info!("Loaded {} records, {} on the map", records, markers)
                }
                Notice::LoginFailed(e) => warn!("Login failed: {}", e),
                Notice::FetchFailed(e) => warn!("Loading failed, please log in again: {}", e),
                Notice::QueryRejected(e) => warn!("Request rejected, please log in again: {}", e),
            }
        }
    });

    let (tx, rx) = mpsc::channel(64);
    if let (Some(username), Some(password)) = (args.user.clone(), args.password.clone()) {
        tx.send(Command::Login { username, password }).await?;
    } else {
        info!("Not logged in. {}", HELP);
    }

    let console_handle = tokio::spawn(console::read_commands(BufReader::new(tokio::io::stdin()), tx));
    let controller_handle = tokio::spawn(controller.run(rx));

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!("Sync controller task failed: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    console_handle.abort();
    info!("Shutting down");
    Ok(())
}

async fn serve_metrics(addr: &str) -> anyhow::Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding metrics listener to {}", addr))?;
    info!("Metrics listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn metrics_handler() -> String {
    metrics::gather_metrics().unwrap_or_else(|e| {
        error!("Failed to encode metrics: {}", e);
        String::new()
    })
}
