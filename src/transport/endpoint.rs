//! Socket seam and the ordered endpoint pool.
//!
//! The transport never opens sockets itself; it drives whatever implements
//! [`Socket`] (a WebSocket client in the real driver, a scripted mock in
//! tests). The pool keeps the configured endpoints in preference order with
//! a cursor pointing at the one currently in use.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Faults a socket send can report. Only `NotConnected` is retryable through
/// the failover engine; anything else fails the send outright.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("websocket not connected")]
    NotConnected,

    #[error("socket error: {0}")]
    Io(String),
}

/// Connect/send/reconnect/close primitives consumed by the session.
///
/// `reconnect_blocking` may retry internally at the socket level;
/// `reconnect_blocking_without_retry` must attempt exactly once. Both return
/// whether the socket came back up.
#[async_trait]
pub trait Socket: Send + Sync + 'static {
    async fn connect(&self, timeout: Duration) -> bool;

    async fn send_text(&self, text: &str) -> Result<(), SocketError>;

    async fn send_binary(&self, bytes: &[u8]) -> Result<(), SocketError>;

    async fn reconnect_blocking(&self) -> bool;

    async fn reconnect_blocking_without_retry(&self) -> bool;

    async fn close_blocking(&self);

    fn is_closed(&self) -> bool;
}

/// Preference order of an endpoint within the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointRole {
    Primary,
    Secondary,
}

/// One candidate server connection.
pub struct Endpoint<S> {
    uri: String,
    role: EndpointRole,
    socket: Arc<S>,
}

impl<S> Endpoint<S> {
    pub fn new(uri: impl Into<String>, role: EndpointRole, socket: S) -> Self {
        Self {
            uri: uri.into(),
            role,
            socket: Arc::new(socket),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn role(&self) -> EndpointRole {
        self.role
    }

    pub fn socket(&self) -> Arc<S> {
        Arc::clone(&self.socket)
    }
}

/// Ordered, non-empty list of endpoints plus the active cursor.
///
/// The cursor is always a valid index; `advance` wraps circularly so a
/// failover pass can visit every entry exactly once.
pub struct EndpointPool<S> {
    endpoints: Vec<Endpoint<S>>,
    active: usize,
}

impl<S> EndpointPool<S> {
    /// Build a pool with the primary endpoint first.
    pub fn new(primary: Endpoint<S>) -> Self {
        Self {
            endpoints: vec![primary],
            active: 0,
        }
    }

    pub fn with_secondary(mut self, secondary: Endpoint<S>) -> Self {
        self.endpoints.push(secondary);
        self
    }

    pub fn active(&self) -> &Endpoint<S> {
        &self.endpoints[self.active]
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    /// Move the cursor to the next endpoint, wrapping at the end.
    pub fn advance(&mut self) {
        self.active = (self.active + 1) % self.endpoints.len();
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint<S>> {
        self.endpoints.iter()
    }
}
