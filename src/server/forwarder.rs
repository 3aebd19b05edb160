//! HTTP to command socket forwarder
//!
//! Lets webhook-style clients trigger a relay: any request whose body holds a
//! JSON object with `relayNumber` is forwarded to the command socket.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::Result;
use crate::utils::connect_with_timeout;

pub struct Forwarder {
    target: String,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Send the bare relay number; the command socket's reply is not awaited
    async fn forward(&self, relay: u32) -> Result<()> {
        let mut stream = connect_with_timeout(&self.target, self.timeout).await?;
        stream.write_all(relay.to_string().as_bytes()).await?;
        stream.shutdown().await?;
        Ok(())
    }
}

/// Create the forwarder router; every method and path is handled
pub fn create_router(forwarder: Arc<Forwarder>) -> Router {
    Router::new()
        .fallback(forward_request)
        .layer(TraceLayer::new_for_http())
        .with_state(forwarder)
}

/// Pull `relayNumber` out of a request body
///
/// Accepts a number or a numeric string. When the body as a whole is not
/// JSON, the span from the first `{` to the last `}` is tried.
pub fn extract_relay_number(body: &str) -> Option<u32> {
    let payload = serde_json::from_str::<Value>(body.trim()).ok().or_else(|| {
        let start = body.find('{')?;
        let end = body.rfind('}')?;
        (end > start)
            .then(|| serde_json::from_str::<Value>(&body[start..=end]).ok())
            .flatten()
    })?;

    match payload.get("relayNumber")? {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// ANY /* - Forward a relay trigger
pub async fn forward_request(State(forwarder): State<Arc<Forwarder>>, body: Bytes) -> Response {
    let body = String::from_utf8_lossy(&body);
    if body.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
    }

    let Some(relay) = extract_relay_number(&body) else {
        warn!("Forwarder request without relayNumber");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "no relayNumber" })),
        )
            .into_response();
    };

    match forwarder.forward(relay).await {
        Ok(()) => {
            info!("Forwarded relay {} to {}", relay, forwarder.target());
            (StatusCode::OK, Json(json!({ "status": "ok", "relay": relay }))).into_response()
        }
        Err(e) => {
            warn!("Failed to forward relay {}: {}", relay, e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "status": "error", "message": "forward failed" })),
            )
                .into_response()
        }
    }
}
