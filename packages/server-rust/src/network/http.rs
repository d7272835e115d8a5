//! HTTP surface: the request/response API over the cache manager.
//!
//! Routes:
//! - `GET /` -- health check
//! - `GET /keys` -- every live key
//! - `GET /{key}` -- value + expiry, or a 400 with a not-found message
//! - `POST /` -- set from a `{"key","value","ttl"}` body
//! - `DELETE /{key}` -- remove a key
//!
//! Every route sits behind bearer-token auth; the token comparison is
//! constant-time.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;
use subtle::ConstantTimeEq;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::manager::CacheManager;
use crate::network::Envelope;

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<CacheManager>,
    pub auth_token: Arc<str>,
}

/// Body of a `POST /` request.
#[derive(Debug, Deserialize)]
pub struct Payload {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub ttl: i64,
}

/// Assembles the router with all routes, auth, tracing, and a request
/// timeout.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check).post(set_value))
        .route("/keys", get(get_all_keys))
        .route("/{key}", get(get_value).delete(delete_value))
        .layer(middleware::from_fn_with_state(state.clone(), require_bearer))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .with_state(state)
}

/// Binds `addr` and serves until the shutdown future resolves.
///
/// # Errors
///
/// Fails if the address cannot be bound or the server hits a fatal I/O
/// error.
pub async fn serve(
    addr: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP surface listening on {}", listener.local_addr()?);
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn require_bearer(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .is_some_and(|token| token.as_bytes().ct_eq(state.auth_token.as_bytes()).into());

    if authorized {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(Envelope::error("Invalid or missing bearer token.")),
        )
            .into_response()
    }
}

async fn health_check() -> Json<Envelope> {
    Json(Envelope::ok())
}

async fn get_all_keys(State(state): State<AppState>) -> Json<Envelope> {
    let keys = state.manager.keys();
    Json(Envelope::ok_value(Value::from(keys)))
}

async fn get_value(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    match state.manager.get(&key) {
        Ok(Some((value, expired_at))) => {
            Json(Envelope::ok_value(value).with_expiry(expired_at)).into_response()
        }
        Ok(None) => bad_request(format!("Key '{key}' not found in cache.")),
        Err(err) => {
            error!(key, error = %err, "cache read failed");
            bad_request(format!("Error occurred while reading key '{key}' from cache."))
        }
    }
}

async fn set_value(
    State(state): State<AppState>,
    payload: Result<Json<Payload>, JsonRejection>,
) -> Response {
    let Ok(Json(payload)) = payload else {
        return bad_request("Unprocessable request payload.");
    };
    match state.manager.set(&payload.key, &payload.value, payload.ttl) {
        Ok(()) => Json(Envelope::ok()).into_response(),
        Err(err) => {
            error!(key = payload.key, error = %err, "cache write failed");
            bad_request(format!(
                "Error occurred while adding new key/value pair: {} - {}",
                payload.key, payload.value
            ))
        }
    }
}

async fn delete_value(State(state): State<AppState>, Path(key): Path<String>) -> Json<Envelope> {
    // The in-memory removal always succeeds; a snapshot mirror failure is
    // logged without failing the request.
    if let Err(err) = state.manager.delete(&key) {
        error!(key, error = %err, "cache delete failed");
    }
    Json(Envelope::ok())
}

fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(Envelope::error(message))).into_response()
}
