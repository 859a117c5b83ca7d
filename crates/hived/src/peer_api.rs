//! HTTP endpoint of a node.
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | POST | `/peer/message` | Inbound gossip (specification, presence, request) |
//! | POST | `/chain/payment` | Payment transaction reported by the chain indexer |
//! | POST | `/chain/scanned` | Height the chain indexer has processed |
//! | POST | `/chain/rescan` | Rebuild the projection from a height |
//! | GET | `/apps/global` | Current specification of every application |
//! | GET | `/apps/global/{name}` | Current specification of one application |
//! | GET | `/apps/installed` | Applications installed on this node |
//! | GET | `/apps/locations/{name}` | Nodes running an application |

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use hive_core::collab::PeerMessage;
use hive_lifecycle::LifecycleManager;
use hive_registry::{Presence, Registry, handle_peer_message};

use crate::transport::PEER_MESSAGE_PATH;

#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<Registry>,
    pub presence: Arc<Presence>,
    pub lifecycle: Arc<LifecycleManager>,
}

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> axum::response::Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn internal(e: impl std::fmt::Display) -> axum::response::Response {
    error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route(PEER_MESSAGE_PATH, post(peer_message))
        .route("/chain/payment", post(chain_payment))
        .route("/chain/scanned", post(chain_scanned))
        .route("/chain/rescan", post(chain_rescan))
        .route("/apps/global", get(global_apps))
        .route("/apps/global/{name}", get(global_app))
        .route("/apps/installed", get(installed_apps))
        .route("/apps/locations/{name}", get(locations))
        .with_state(state)
}

// ── Gossip ─────────────────────────────────────────────────────

/// POST /peer/message
async fn peer_message(
    State(state): State<ApiState>,
    Json(message): Json<PeerMessage>,
) -> axum::response::Response {
    match handle_peer_message(&state.registry, &state.presence, message).await {
        Ok(stored) => ApiResponse::ok(json!({ "stored": stored })).into_response(),
        Err(e) if e.is_rejection() => {
            debug!(error = %e, "peer message rejected");
            error_response(&e.to_string(), StatusCode::UNPROCESSABLE_ENTITY)
        }
        Err(e) => {
            warn!(error = %e, "peer message handling failed");
            internal(e)
        }
    }
}

// ── Chain indexer ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PaymentReport {
    pub hash: String,
    pub txid: String,
    pub height: u64,
    pub value_sat: u64,
}

/// POST /chain/payment
///
/// Accepted immediately; fetching a missing message from peers can take
/// several rounds.
async fn chain_payment(
    State(state): State<ApiState>,
    Json(report): Json<PaymentReport>,
) -> axum::response::Response {
    let registry = Arc::clone(&state.registry);
    tokio::spawn(async move {
        match registry
            .observe_payment(&report.hash, &report.txid, report.height, report.value_sat)
            .await
        {
            Ok(outcome) => debug!(hash = %report.hash, ?outcome, "payment processed"),
            Err(e) => warn!(hash = %report.hash, error = %e, "payment processing failed"),
        }
    });
    (StatusCode::ACCEPTED, ApiResponse::ok("accepted")).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ScannedHeight {
    pub height: u64,
}

/// POST /chain/scanned
async fn chain_scanned(
    State(state): State<ApiState>,
    Json(body): Json<ScannedHeight>,
) -> axum::response::Response {
    match state.registry.set_scanned_height(body.height) {
        Ok(()) => ApiResponse::ok(body.height).into_response(),
        Err(e) => internal(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct RescanRequest {
    pub from_height: u64,
    #[serde(default)]
    pub drop_existing: bool,
}

/// POST /chain/rescan
async fn chain_rescan(
    State(state): State<ApiState>,
    Json(body): Json<RescanRequest>,
) -> axum::response::Response {
    match state
        .registry
        .rebuild_projection(body.from_height, body.drop_existing)
    {
        Ok(applied) => ApiResponse::ok(json!({ "applied": applied })).into_response(),
        Err(e) => internal(e),
    }
}

// ── Applications ───────────────────────────────────────────────

/// GET /apps/global
async fn global_apps(State(state): State<ApiState>) -> axum::response::Response {
    match state.registry.global_apps() {
        Ok(apps) => ApiResponse::ok(apps).into_response(),
        Err(e) => internal(e),
    }
}

/// GET /apps/global/{name}
async fn global_app(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> axum::response::Response {
    match state.registry.global_app(&name) {
        Ok(Some(app)) => ApiResponse::ok(app).into_response(),
        Ok(None) => error_response("application not found", StatusCode::NOT_FOUND),
        Err(e) => internal(e),
    }
}

/// GET /apps/installed
async fn installed_apps(State(state): State<ApiState>) -> axum::response::Response {
    match state.lifecycle.installed() {
        Ok(apps) => ApiResponse::ok(apps).into_response(),
        Err(e) => internal(e),
    }
}

/// GET /apps/locations/{name}
async fn locations(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> axum::response::Response {
    match state.presence.locations(&name) {
        Ok(locations) => ApiResponse::ok(locations).into_response(),
        Err(e) => internal(e),
    }
}
