use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the transport/session layer.
///
/// `ConnectionClosed` is terminal for the session; every other variant leaves
/// the session usable unless stated otherwise.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("can't create connection with server {uri} within {timeout:?}")]
    ConnectionTimeout { uri: String, timeout: Duration },

    #[error("request {req_id} ({action}) got no response within {timeout:?}")]
    QueryTimeout {
        action: String,
        req_id: u64,
        timeout: Duration,
    },

    #[error("IO error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupted frame: {0}")]
    CorruptedFrame(String),

    #[error("wait interrupted: {0}")]
    Interrupted(String),

    #[error("in-flight registry full, no slot freed within {timeout:?}")]
    RegistrationTimeout { timeout: Duration },

    #[error("request id {0} is already in flight")]
    DuplicateRequestId(u64),
}

pub type Result<T> = std::result::Result<T, TransportError>;
