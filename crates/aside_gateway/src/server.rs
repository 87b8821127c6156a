//! The HTTP control surface.
//!
//! Writes only ever touch the DND gate and the allowlist; everything
//! else is a read-only view. Internal failures never leak details to the
//! caller — they are logged and surface as a generic error status.

use crate::types::{
    DndAck, DndUpdate, HistoryView, StatusView, WhitelistAck, WhitelistChange, WhitelistView,
};
use aside_core::config::GatewaySettings;
use aside_core::{Allowlist, ContextProvider, DndGate, StatusBoard};
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    gate: Arc<DndGate>,
    allowlist: Arc<Allowlist>,
    board: Arc<StatusBoard>,
    context: Arc<dyn ContextProvider>,
}

impl AppState {
    pub fn new(
        gate: Arc<DndGate>,
        allowlist: Arc<Allowlist>,
        board: Arc<StatusBoard>,
        context: Arc<dyn ContextProvider>,
    ) -> Self {
        Self {
            gate,
            allowlist,
            board,
            context,
        }
    }
}

pub struct GatewayServer {
    host: String,
    port: u16,
    state: AppState,
}

impl GatewayServer {
    pub fn new(settings: &GatewaySettings, state: AppState) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            state,
        }
    }

    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/webhook/dnd", post(set_dnd))
            .route("/status", get(status))
            .route("/history", get(history))
            .route("/whitelist", get(whitelist))
            .route("/whitelist/add", post(whitelist_add))
            .route("/whitelist/remove", post(whitelist_remove))
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Start the server. Spawns a background task and returns its handle.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        let app = Self::router(self.state);
        let addr = format!("{}:{}", self.host, self.port);

        tokio::spawn(async move {
            let listener = match tokio::net::TcpListener::bind(&addr).await {
                Ok(l) => l,
                Err(e) => {
                    tracing::error!("Gateway failed to bind {}: {}", addr, e);
                    return;
                }
            };
            tracing::info!("Gateway listening on {}", addr);
            tracing::info!("DND webhook: POST http://{}/webhook/dnd", addr);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Gateway server error: {}", e);
            }
        })
    }
}

// ============================================================================
// Route handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

/// POST /webhook/dnd — flip the gate. The monitor samples it at its next
/// tick boundary.
async fn set_dnd(State(state): State<AppState>, Json(update): Json<DndUpdate>) -> Json<DndAck> {
    state.gate.set_enabled(update.dnd_enabled);
    Json(DndAck {
        status: "success".to_string(),
        dnd_enabled: update.dnd_enabled,
        timestamp: Utc::now(),
    })
}

/// GET /status — operational snapshot.
async fn status(State(state): State<AppState>) -> Json<StatusView> {
    let current_event = match state.context.current_commitment().await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "calendar lookup failed for status view");
            None
        }
    };
    let snapshot = state.board.load();
    Json(StatusView {
        dnd_enabled: state.gate.is_enabled(),
        current_event,
        whitelist_count: state.allowlist.len().await,
        replies_sent: snapshot.replies_sent,
        recent_activity: snapshot.recent_activity.clone(),
        timestamp: Utc::now(),
    })
}

/// GET /history — recent DND transitions.
async fn history(State(state): State<AppState>) -> Json<HistoryView> {
    Json(HistoryView {
        history: state.gate.recent_transitions(20),
        total_entries: state.gate.transition_count(),
    })
}

/// GET /whitelist
async fn whitelist(State(state): State<AppState>) -> Json<WhitelistView> {
    let numbers: Vec<String> = state
        .allowlist
        .all()
        .await
        .into_iter()
        .map(|id| id.as_str().to_string())
        .collect();
    Json(WhitelistView {
        count: numbers.len(),
        phone_numbers: numbers,
    })
}

/// POST /whitelist/add
async fn whitelist_add(
    State(state): State<AppState>,
    Json(change): Json<WhitelistChange>,
) -> Result<Json<WhitelistAck>, StatusCode> {
    match state
        .allowlist
        .add(&change.phone_number, change.name.as_deref())
        .await
    {
        Ok(added) => Ok(Json(WhitelistAck {
            success: added,
            phone_number: change.phone_number,
            message: if added {
                "Added to whitelist".to_string()
            } else {
                "Already in whitelist".to_string()
            },
        })),
        Err(e) => {
            tracing::error!(error = %e, "whitelist add failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// POST /whitelist/remove
async fn whitelist_remove(
    State(state): State<AppState>,
    Json(change): Json<WhitelistChange>,
) -> Result<Json<WhitelistAck>, StatusCode> {
    match state.allowlist.remove(&change.phone_number).await {
        Ok(removed) => Ok(Json(WhitelistAck {
            success: removed,
            phone_number: change.phone_number,
            message: if removed {
                "Removed from whitelist".to_string()
            } else {
                "Not found in whitelist".to_string()
            },
        })),
        Err(e) => {
            tracing::error!(error = %e, "whitelist remove failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
