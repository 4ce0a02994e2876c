//! Tally Bridge web server: REST API and relay WebSocket built with axum.
//!
//! REST handlers call [`Executor::dispatch`] directly. The `/relay` socket
//! is a forwarder: JSON relay messages from the page go into an executor
//! session, and replies go back out as text frames.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tally_link::{BridgeConfig, ErrorKind, RelayError, RelayMessage, RelayOp, RelayPort, RelayResult};
use tower_http::cors::CorsLayer;
use tracing::{debug, warn};

use crate::executor::{Executor, EXECUTOR_VERSION};
use crate::models::*;

// ============================================================================
// App State
// ============================================================================

pub type SharedExecutor = Arc<Executor>;

// ============================================================================
// Router
// ============================================================================

pub fn create_router(executor: SharedExecutor, cors: CorsLayer) -> Router {
    Router::new()
        // Health
        .route("/health", get(handle_health))
        // Tally collections
        .route("/api/tally/companies", get(handle_companies))
        .route("/api/tally/ledgers", get(handle_ledgers))
        .route("/api/tally/bills", get(handle_bills))
        .route("/api/tally/dealers", get(handle_dealers))
        // Configuration
        .route("/api/config", get(handle_get_config).post(handle_set_config))
        // Diagnostics
        .route("/api/diagnostics", get(handle_diagnostics))
        .route("/api/diagnostics/clear", post(handle_clear_diagnostics))
        // Relay
        .route("/relay", get(handle_relay))
        .layer(cors)
        .with_state(executor)
}

/// CORS restricted to the dashboard origins; unparseable entries are skipped.
pub fn cors_for(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o.trim_end_matches('/')) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {o}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

// ============================================================================
// Helpers
// ============================================================================

fn ok_json<T: Serialize>(msg: &str, data: T) -> Response {
    Json(ApiResponse::success(msg, data)).into_response()
}

fn ok_msg(msg: &str) -> Response {
    Json(ApiResponse::<()>::success_msg(msg)).into_response()
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Disabled => StatusCode::FORBIDDEN,
        ErrorKind::Unreachable | ErrorKind::UpstreamRejected | ErrorKind::MalformedPayload => {
            StatusCode::BAD_GATEWAY
        }
        ErrorKind::RequestTimeout | ErrorKind::DetectionTimedOut => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn err_json(err: &RelayError) -> Response {
    (
        status_for(err.kind),
        Json(ApiResponse::error(err.message.clone(), Some(err.kind))),
    )
        .into_response()
}

fn bad_request(msg: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(msg, None))).into_response()
}

async fn run_op(exec: &Executor, op: RelayOp, msg: &str) -> Response {
    match exec.dispatch(op).await {
        Ok(result) => result_json(msg, result),
        Err(e) => err_json(&e),
    }
}

fn result_json(msg: &str, result: RelayResult) -> Response {
    match result {
        RelayResult::Alive(alive) => ok_json(msg, alive),
        RelayResult::Companies(v) => ok_json(msg, v),
        RelayResult::Ledgers(v) => ok_json(msg, v),
        RelayResult::Bills(v) => ok_json(msg, v),
        RelayResult::Dealers(v) => ok_json(msg, v),
        RelayResult::Config(v) => ok_json(msg, v),
        RelayResult::Diagnostics(v) => ok_json(msg, v),
        RelayResult::Ack => ok_msg(msg),
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn handle_health(State(exec): State<SharedExecutor>) -> impl IntoResponse {
    let config = exec.config();
    let reachable = config.enabled
        && matches!(
            exec.dispatch(RelayOp::Probe).await,
            Ok(RelayResult::Alive(true))
        );
    let status = if !config.enabled {
        "disabled"
    } else if reachable {
        "healthy"
    } else {
        "disconnected"
    };
    Json(serde_json::json!({
        "status": status,
        "tallyReachable": reachable,
        "enabled": config.enabled,
        "endpoint": config.endpoint,
        "server": "Tally Integration Bridge",
        "version": EXECUTOR_VERSION
    }))
}

async fn handle_companies(State(exec): State<SharedExecutor>) -> Response {
    run_op(&exec, RelayOp::ListCompanies, "Companies retrieved").await
}

async fn handle_ledgers(
    State(exec): State<SharedExecutor>,
    Query(q): Query<CompanyQuery>,
) -> Response {
    let Some(company) = q.company() else {
        return bad_request("Missing required parameter: company");
    };
    let op = RelayOp::ListLedgers {
        company: company.to_string(),
    };
    run_op(&exec, op, "Ledgers retrieved").await
}

async fn handle_bills(
    State(exec): State<SharedExecutor>,
    Query(q): Query<CompanyQuery>,
) -> Response {
    let Some(company) = q.company() else {
        return bad_request("Missing required parameter: company");
    };
    let op = RelayOp::ListOutstandingBills {
        company: company.to_string(),
    };
    run_op(&exec, op, "Outstanding bills retrieved").await
}

async fn handle_dealers(
    State(exec): State<SharedExecutor>,
    Query(q): Query<CompanyQuery>,
) -> Response {
    let Some(company) = q.company() else {
        return bad_request("Missing required parameter: company");
    };
    let op = RelayOp::SyncDealers {
        company: company.to_string(),
    };
    run_op(&exec, op, "Dealers synchronized").await
}

async fn handle_get_config(State(exec): State<SharedExecutor>) -> Response {
    run_op(&exec, RelayOp::GetConfig, "Configuration retrieved").await
}

async fn handle_set_config(
    State(exec): State<SharedExecutor>,
    Json(body): Json<ConfigBody>,
) -> Response {
    let current = exec.config();
    let config = BridgeConfig {
        enabled: body.enabled.unwrap_or(current.enabled),
        endpoint: body.endpoint.unwrap_or(current.endpoint),
    };
    run_op(&exec, RelayOp::SetConfig(config), "Configuration updated").await
}

async fn handle_diagnostics(State(exec): State<SharedExecutor>) -> Response {
    run_op(&exec, RelayOp::GetDiagnostics, "Diagnostics retrieved").await
}

async fn handle_clear_diagnostics(State(exec): State<SharedExecutor>) -> Response {
    run_op(&exec, RelayOp::ClearDiagnostics, "Diagnostics cleared").await
}

// ============================================================================
// Relay WebSocket
// ============================================================================

async fn handle_relay(ws: WebSocketUpgrade, State(exec): State<SharedExecutor>) -> Response {
    ws.on_upgrade(move |socket| relay_socket(socket, exec))
}

async fn relay_socket(socket: WebSocket, exec: SharedExecutor) {
    let RelayPort { tx, mut rx } = exec.connect();
    let (mut sink, mut stream) = socket.split();
    debug!("Relay socket opened");

    let outbound = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to encode relay reply: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Relay socket error: {e}");
                break;
            }
        };
        match frame {
            Message::Text(text) => match serde_json::from_str::<RelayMessage>(text.as_str()) {
                Ok(msg) => {
                    if tx.send(msg).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Dropping unparseable relay frame: {e}"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    drop(tx);
    outbound.abort();
    debug!("Relay socket closed");
}

// ============================================================================
// Tests
// ============================================================================
