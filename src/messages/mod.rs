//! Request/response envelopes and the correlation-id source.
//!
//! The transport only cares about the action tag and the correlation id; the
//! `args`/`body` payloads are opaque JSON owned by the query layer above.

pub mod frame;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Action tag of the authentication handshake.
pub const ACTION_CONN: &str = "conn";

/// Status code meaning success on any response.
pub const CODE_SUCCESS: i64 = 0;

static NEXT_REQ_ID: AtomicU64 = AtomicU64::new(1);

/// Produce a process-unique correlation id.
pub fn next_req_id() -> u64 {
    NEXT_REQ_ID.fetch_add(1, Ordering::Relaxed)
}

/// One outbound request: action tag, correlation id, protocol payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub action: String,
    pub req_id: u64,
    pub args: Value,
}

impl RequestEnvelope {
    /// Build an envelope with a freshly allocated correlation id.
    pub fn new(action: impl Into<String>, args: Value) -> Self {
        Self {
            action: action.into(),
            req_id: next_req_id(),
            args,
        }
    }

    /// Build an envelope reusing a caller-chosen correlation id.
    pub fn with_req_id(action: impl Into<String>, req_id: u64, args: Value) -> Self {
        Self {
            action: action.into(),
            req_id,
            args,
        }
    }

    /// Serialize to the JSON text form sent on the socket.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// One inbound response, parsed by the socket layer and routed back to the
/// pending request with the matching `req_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub action: String,
    pub req_id: u64,
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub body: Value,
}

impl ResponseEnvelope {
    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }
}

/// Payload of the `conn` handshake replayed after every successful
/// socket-level reconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectArgs {
    pub req_id: u64,
    pub user: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<i64>,
}
