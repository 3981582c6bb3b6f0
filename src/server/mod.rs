//! Leaderboard server: validates, stores, ranks and prunes daily results.
//!
//! Routes live under `/api`. Every day is the UTC+9 calendar day from
//! [`calendar_day`], the same function the browser client uses.

pub mod error;
pub mod store;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{self, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{any, get};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};

use crate::api::{
    ErrorResponse, HealthResponse, RankingsResponse, StatsResponse, SubmitRequest, SubmitResponse,
};
use crate::clock::{Clock, SystemClock, calendar_day, calendar_day_before};
use crate::config::{PURGE_INTERVAL_SECS, RETENTION_DAYS, ServerConfig};
use crate::record::{RankingRecord, ValidationError, generate_record_id};

pub use error::ServerError;
pub use store::{DayStats, RankingStore};

#[derive(Clone)]
pub struct AppState {
    pub store: RankingStore,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

impl AppState {
    pub fn new(store: RankingStore, clock: impl Clock + Send + Sync + 'static) -> Self {
        Self {
            store,
            clock: Arc::new(clock),
        }
    }

    fn today(&self) -> String {
        calendar_day(self.clock.now_ms())
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/rankings", get(rankings).post(submit))
        .route("/api/stats", get(stats))
        .route("/api/*path", any(api_not_found))
        .layer(
            CorsLayer::new()
                .allow_methods([http::Method::GET, http::Method::POST])
                .allow_headers([header::CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let now = state.clock.now_ms();
    Json(HealthResponse {
        success: true,
        status: "healthy".to_string(),
        timestamp: now,
        date: calendar_day(now),
    })
}

async fn rankings(State(state): State<AppState>) -> Result<Json<RankingsResponse>, ServerError> {
    let date = state.today();
    let rankings = state
        .store
        .top(&date)
        .await
        .map_err(ServerError::database("Database error"))?;
    Ok(Json(RankingsResponse {
        success: true,
        total: rankings.len(),
        rankings,
        date,
    }))
}

async fn submit(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ServerError> {
    let Json(request) = payload.map_err(|e| ValidationError::Malformed(e.body_text()))?;
    let submission = request.validate()?;

    let now = state.clock.now_ms();
    let id = generate_record_id(now, &mut rand::thread_rng());
    let record = RankingRecord::from_submission(&submission, id, now);
    let rank = state
        .store
        .insert_and_rank(&record)
        .await
        .map_err(ServerError::database("Failed to save score"))?;
    info!(
        "[SERVER] {} scored {} (level {}) on {}: rank {rank}",
        record.name, record.score, record.level, record.date
    );

    Ok(Json(SubmitResponse {
        success: true,
        rank,
        id: record.id,
        message: "Score saved successfully".to_string(),
    }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ServerError> {
    let date = state.today();
    let day = state
        .store
        .stats(&date)
        .await
        .map_err(ServerError::database("Database error"))?;
    Ok(Json(StatsResponse {
        success: true,
        date,
        total_players: day.total_players,
        highest_score: day.highest_score,
        highest_level: day.highest_level,
        average_score: day.average_score,
    }))
}

async fn api_not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("API endpoint not found")),
    )
}

/// Remove records older than the retention window relative to `now_ms`.
pub async fn purge_expired(store: &RankingStore, now_ms: i64) -> Result<u64, sqlx::Error> {
    let cutoff = calendar_day_before(now_ms, RETENTION_DAYS);
    let removed = store.delete_before(&cutoff).await?;
    if removed > 0 {
        info!("[SERVER] purged {removed} records dated before {cutoff}");
    } else {
        debug!("[SERVER] nothing to purge before {cutoff}");
    }
    Ok(removed)
}

/// Purge once immediately, then every [`PURGE_INTERVAL_SECS`].
pub fn spawn_purge_task(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(PURGE_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            if let Err(e) = purge_expired(&state.store, state.clock.now_ms()).await {
                error!("[SERVER] purge failed: {e}");
            }
        }
    })
}

/// Serve until SIGTERM / Ctrl-C, then close the database.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let store = RankingStore::open(&config.database_path)
        .await
        .with_context(|| format!("failed to open database at {}", config.database_path))?;
    let state = AppState::new(store.clone(), SystemClock);
    let purge = spawn_purge_task(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("[SERVER] hue-hunt leaderboard listening on http://{addr}");
    info!(
        "[SERVER] environment {}, database {}, today (UTC+9) {}",
        config.environment,
        config.database_path,
        state.today()
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    purge.abort();
    store.close().await;
    info!("[SERVER] database closed, shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("[SERVER] failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("[SERVER] failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("[SERVER] Ctrl-C received"),
        _ = terminate => info!("[SERVER] SIGTERM received"),
    }
}
