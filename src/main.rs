use std::sync::Arc;

use axum::http::Method;
use axum::{Router, routing::get};
use clap::Parser;
use marginalia::auth::HttpIdentityProvider;
use marginalia::config::{Cli, Config, default_config_dir, default_config_path};
use marginalia::db::Database;
use marginalia::handler::{AppState, healthcheck};
use marginalia::highlight;
use marginalia::lifecycle::HighlightLifecycle;
use marginalia::model::ImageLocation;
use marginalia::rate_limit::RateLimiter;
use marginalia::s3::ObjectStorage;
use marginalia::synthesis::OpenAiImageSynthesizer;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let args = Cli::parse();
    dotenvy::dotenv().ok();

    // --config puts data (the database file) next to the config file,
    // otherwise both live in ~/.marginalia/
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        eprintln!("failed to create data directory {:?}: {}", data_dir, e);
        std::process::exit(1);
    }

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("marginalia.svc starting");

    let cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));
    let s3 = Arc::new(ObjectStorage::new(&cfg).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup object storage");
        std::process::exit(1);
    }));

    let location = ImageLocation::new(s3.bucket(), s3.region());
    let synthesizer = OpenAiImageSynthesizer::new(&cfg.synthesis, s3.clone(), location.clone())
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to setup image synthesis client");
            std::process::exit(1);
        });
    let identity = HttpIdentityProvider::new(&cfg.identity).unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup identity provider client");
        std::process::exit(1);
    });

    let lifecycle = HighlightLifecycle::new(s3, db.clone(), Arc::new(synthesizer), location)
        .with_rate_limiter(RateLimiter::per_day(cfg.synthesis.daily_limit));

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let cancellation_token = CancellationToken::new();

    // Background push of local writes to the remote replica
    let sync_task = if db.syncs_remotely() {
        let sync_db = db.clone();
        let sync_token = cancellation_token.clone();
        let period = std::time::Duration::from_secs(cfg.app.sync_interval_seconds.max(1));
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = sync_db.sync().await {
                            tracing::warn!(error = %e, "replica sync failed");
                        }
                    }
                    _ = sync_token.cancelled() => {
                        tracing::info!("replica sync task shutting down");
                        break;
                    }
                }
            }
        }))
    } else {
        None
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(healthcheck))
        .nest("/book/:book_id", highlight::routes())
        .layer(cors)
        .with_state(AppState {
            lifecycle: Arc::new(lifecycle),
            identity: Arc::new(identity),
        });

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("marginalia.svc running on {}", &address);
    tokio::select! {
        result = axum::serve(listener, app) => {
            if let Err(err) = result {
                tracing::error!(error = %err, "server stopped unexpectedly");
                std::process::exit(1);
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("ctrl+c signal received, preparing to shutdown");
            cancellation_token.cancel();
        }
    }

    if let Some(task) = sync_task {
        let _ = task.await;
    }
    if let Err(e) = db.sync().await {
        tracing::warn!(error = %e, "final replica sync failed");
    }
    tracing::info!("marginalia.svc going off, graceful shutdown complete");
}
