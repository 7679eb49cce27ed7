//! Server-side code for call tracking
//!
//! This module contains all backend functionality:
//! - Database access (PostgreSQL via sqlx) behind the `Store` seam
//! - Call routing, attribution and the provider-facing IVR flow
//! - Recording download, storage and transcription
//! - Authentication (JWT)
//! - API routes
#![allow(dead_code)]

pub mod auth;
pub mod config;
pub mod db;
pub mod events;
pub mod recordings;
pub mod routing;
pub mod storage;
pub mod store;
pub mod swap_api;
pub mod telephony;
pub mod transcription;
pub mod webhooks;

use axum::{routing::get, Router};
use axum::http::Method;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::AppConfig;
use recordings::{RecordingQueue, RecordingWorker};
use routing::{IvrEngine, IvrSettings};
use storage::LocalFileStorage;
use store::{PgStore, Store};
use telephony::TwilioClient;
use transcription::{HttpTranscriber, Transcriber};

/// Application state shared across all routes
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub engine: IvrEngine,
    pub jwt_secret: String,
}

/// Create the Axum router with all API routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .merge(webhooks::routes())
        .merge(swap_api::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Initialize and start the server
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let pool = db::init_pool(&config.database_url).await?;

    // Non-fatal if already applied
    if let Err(e) = db::run_migrations(&pool).await {
        tracing::warn!("Migration warning (may be already applied): {}", e);
    }
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let storage = LocalFileStorage::new(&config.recording_storage_path, config.recording_storage_quota_gb);
    storage.init().await?;

    if !config.twilio_configured() {
        tracing::warn!("Twilio credentials not configured, recordings cannot be downloaded");
    }
    let telephony = TwilioClient::new(config.twilio_account_sid.clone(), config.twilio_auth_token.clone());

    let transcriber = config.transcription_api_url.clone().map(|url| {
        tracing::info!("Transcription enabled via {}", url);
        Arc::new(HttpTranscriber::new(url, config.transcription_api_key.clone())) as Arc<dyn Transcriber>
    });

    let cancel = CancellationToken::new();
    let events = events::channel();
    let (queue, jobs) = RecordingQueue::channel();

    let worker = Arc::new(RecordingWorker::new(
        store.clone(),
        Arc::new(telephony),
        Arc::new(storage),
        transcriber,
        queue.clone(),
        config.recording_max_attempts,
    ));
    let worker_task = tokio::spawn(worker.run(jobs, cancel.clone()));
    let events_task = tokio::spawn(events::log_events(events.clone(), cancel.clone()));

    let engine = IvrEngine::new(
        store.clone(),
        IvrSettings {
            public_base_url: config.public_base_url.clone(),
            keypad_timeout_seconds: config.keypad_timeout_seconds,
            default_voice: config.default_tts_voice.clone(),
            default_language: config.default_tts_language.clone(),
        },
        queue,
        events,
    );

    let state = Arc::new(AppState {
        store,
        engine,
        jwt_secret: config.jwt_secret.clone(),
    });
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("Server running on http://0.0.0.0:{}", config.port);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    let _ = tokio::join!(worker_task, events_task);
    Ok(())
}
