//! Common test utilities and helper modules
//!
//! Shared functionality for the integration suites: the scriptable mock
//! socket, a responder pump that plays the server side of the protocol, and
//! response builders.

pub mod mock_socket;

use std::sync::Once;

pub use mock_socket::{spawn_responder, MockSocket, SentPayload};

use serde_json::Value;
use wsbridge::ResponseEnvelope;

static INIT: Once = Once::new();

/// Initialize tracing once for the whole test binary; controlled by
/// `RUST_LOG` like the production subscriber.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Build a success response echoing the given action and correlation id.
pub fn ok_response(action: &str, req_id: u64) -> ResponseEnvelope {
    ResponseEnvelope {
        action: action.to_string(),
        req_id,
        code: 0,
        message: None,
        body: Value::Null,
    }
}

/// Build a failure response with the given status code.
pub fn error_response(action: &str, req_id: u64, code: i64) -> ResponseEnvelope {
    ResponseEnvelope {
        action: action.to_string(),
        req_id,
        code,
        message: Some("rejected".to_string()),
        body: Value::Null,
    }
}
