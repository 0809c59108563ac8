//! # HTTP + WebSocket API
//!
//! The node's HTTP interface, including the block ingestion endpoint that
//! miners submit to. All handlers share [`AppState`] through axum's `State`
//! extractor.
//!
//! ## Endpoints
//!
//! | Method | Path              | Description                              |
//! |--------|-------------------|------------------------------------------|
//! | GET    | `/health`         | Liveness probe                           |
//! | GET    | `/status`         | Height, weight, tip, peers               |
//! | GET    | `/chain`          | The full local chain                     |
//! | GET    | `/blocks/:index`  | One block by index                       |
//! | POST   | `/newblock`       | Submit a block for appending to the tip  |
//! | GET    | `/ws`             | Live chain events                        |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use enclave_protocol::consensus::ConsensusGuard;
use enclave_protocol::storage::Block;

// ---------------------------------------------------------------------------
// Application State
// ---------------------------------------------------------------------------

/// Shared state for all handlers. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Reported version string.
    pub version: String,
    pub guard: Arc<ConsensusGuard>,
    /// Open gossip sessions (maintained by the peer layer).
    pub peer_count: Arc<AtomicU64>,
}

// ---------------------------------------------------------------------------
// Router Construction
// ---------------------------------------------------------------------------

/// Builds the axum [`Router`] with all routes, CORS, and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/chain", get(chain_handler))
        .route("/blocks/:index", get(block_by_index_handler))
        .route("/newblock", post(new_block_handler))
        .route("/ws", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Response Types
// ---------------------------------------------------------------------------

/// Response payload for `GET /status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    /// Blocks in the chain, genesis included.
    pub height: u64,
    /// Sum of leading zeros over the chain.
    pub weight: u64,
    pub tip_hash: String,
    pub difficulty: usize,
    /// Hex identity of the trusted enclave.
    pub trusted_identity: String,
    pub peer_count: u64,
    /// RFC 3339 timestamp of the response.
    pub timestamp: String,
}

/// Response payload for `POST /newblock`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub accepted: bool,
    pub index: u64,
    pub hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

async fn status_handler(State(state): State<AppState>) -> impl IntoResponse {
    let chain = state.guard.snapshot();
    let params = state.guard.params();

    Json(StatusResponse {
        version: state.version.clone(),
        height: chain.len() as u64,
        weight: enclave_protocol::consensus::chain_weight(&chain),
        tip_hash: chain.tip().map(|b| b.hash.clone()).unwrap_or_default(),
        difficulty: params.difficulty,
        trusted_identity: hex::encode(&params.trusted_identity),
        peer_count: state.peer_count.load(Ordering::Relaxed),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /chain` — the same JSON array that is written to disk and gossiped.
async fn chain_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.guard.snapshot())
}

async fn block_by_index_handler(
    Path(index): Path<u64>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let chain = state.guard.snapshot();
    match usize::try_from(index).ok().and_then(|i| chain.get(i)) {
        Some(block) => (StatusCode::OK, Json(block.clone())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("no block at index {}", index),
            }),
        )
            .into_response(),
    }
}

/// `POST /newblock` — offers a block to the guard as the next tip.
///
/// 201 when appended, 409 when rejected. Bodies that do not decode as a
/// block are refused by the `Json` extractor (422 for a wrong shape).
async fn new_block_handler(
    State(state): State<AppState>,
    Json(block): Json<Block>,
) -> impl IntoResponse {
    let index = block.index;
    let hash = block.hash.clone();
    let accepted = state.guard.try_append(block).await;

    let status = if accepted {
        tracing::info!(index, hash = %hash, "block accepted via HTTP");
        StatusCode::CREATED
    } else {
        tracing::debug!(index, hash = %hash, "block rejected via HTTP");
        StatusCode::CONFLICT
    };
    (
        status,
        Json(SubmitResponse {
            accepted,
            index,
            hash,
        }),
    )
}

/// `GET /ws` — pushes every [`ChainEvent`](enclave_protocol::consensus::ChainEvent)
/// as a JSON text frame.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(mut socket: WebSocket, state: AppState) {
    let mut rx = state.guard.subscribe();

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Ok(ev) => {
                    let payload = match serde_json::to_string(&ev) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to serialize ws event");
                            continue;
                        }
                    };
                    if socket.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "ws subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                // Push-only; client frames are ignored.
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }
}
