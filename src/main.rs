//! kardex — personal knowledge catalog with archive-aware duplicate
//! resolution and LLM-ranked search over a local SQLite store.

use clap::Parser;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use kardex::{api, db, scoring, AppState, SharedDB};

#[derive(Parser)]
#[command(name = "kardex", version, about = "Personal knowledge catalog engine")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "4117", env = "KARDEX_PORT")]
    port: u16,

    /// SQLite database path
    #[arg(short, long, default_value = "kardex.db", env = "KARDEX_DB")]
    db: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();
    let catalog = db::CatalogDB::open(&args.db).expect("failed to open database");
    let shared: SharedDB = Arc::new(catalog);

    let scoring_cfg = scoring::ScoringConfig::from_env();
    let scoring_status = match &scoring_cfg {
        Some(cfg) => format!("model={}", cfg.model),
        None => "disabled".into(),
    };

    let api_key = std::env::var("KARDEX_API_KEY").ok();
    let auth_status = if api_key.is_some() { "enabled" } else { "disabled" };

    let state = AppState {
        db: shared,
        scoring: scoring_cfg,
        api_key,
        started_at: std::time::Instant::now(),
    };
    let app = api::router(state);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = args.port,
        db = %args.db,
        scoring = %scoring_status,
        auth = auth_status,
        "kardex starting"
    );

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    info!("shutting down");
}
