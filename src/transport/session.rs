//! Transport controller: orchestrates send, timeout, failover, handshake
//! replay, and session lifecycle over one endpoint pool and one in-flight
//! registry.
//!
//! All waiting sends share a single algorithm: reject-if-closed, admit the
//! completion slot *before* transmitting (a response racing the transmit must
//! never be lost), transmit on the active endpoint, then wait with the
//! configured deadline. The send modes differ only in their failure policy.
//!
//! Failover discipline: the endpoint pool, its cursor, and the
//! reconnect-in-progress state live behind one async mutex. A failover pass
//! holds it end to end, so concurrent transmit failures serialize into one
//! reconnection at a time; a caller unblocked behind a finished pass first
//! checks whether the active endpoint already came back.

use crate::config::SessionConfig;
use crate::error::{Result, TransportError};
use crate::messages::frame::{encode_frame, FrameHeader};
use crate::messages::{next_req_id, ConnectArgs, RequestEnvelope, ResponseEnvelope, ACTION_CONN};
use crate::transport::endpoint::{EndpointPool, Socket, SocketError};
use crate::transport::registry::InFlightRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, instrument, trace, warn};

/// Failure policy of one transmit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// On a not-connected fault, run failover once and retry the transmit once.
    WithRetry,
    /// Fail immediately on any transmit fault. Used for control messages such
    /// as the handshake replay, which must never recurse into failover.
    WithoutRetry,
}

/// How session bring-up treats the endpoint pool.
///
/// The driver layer passes `ValidateAll` for the first session it creates
/// against a multi-endpoint cluster; every other session, and every
/// reconnect, touches only the active endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpMode {
    /// Connect every configured endpoint, then trim all but the active one.
    /// Validates cluster-wide reachability exactly once at startup.
    ValidateAll,
    /// Connect only the active endpoint.
    ActiveOnly,
}

enum Outbound<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
}

/// One logical session over a pool of candidate endpoints.
///
/// Lifecycle: `Created -> Connected -> (Reconnecting)* -> Closed`; once
/// closed it never reopens. Safe to share across tasks behind an `Arc`.
pub struct TransportSession<S: Socket> {
    config: SessionConfig,
    registry: InFlightRegistry,
    pool: Mutex<EndpointPool<S>>,
    request_timeout: StdMutex<Duration>,
    /// Rejects new work. Set by `close` and immediately by `shutdown`.
    closed: AtomicBool,
    /// Guards the one-shot teardown (registry drain + socket close).
    finalized: AtomicBool,
}

impl<S: Socket> TransportSession<S> {
    pub fn new(config: SessionConfig, pool: EndpointPool<S>) -> Self {
        let registry = match config.max_in_flight {
            Some(capacity) => InFlightRegistry::bounded(capacity, config.request_timeout),
            None => InFlightRegistry::new(config.request_timeout),
        };
        Self {
            registry,
            pool: Mutex::new(pool),
            request_timeout: StdMutex::new(config.request_timeout),
            closed: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            config,
        }
    }

    /// Establish the initial connection per `mode`.
    ///
    /// A failure closes the session and surfaces `ConnectionTimeout`.
    pub async fn connect(&self, mode: BringUpMode) -> Result<()> {
        let timeout = self.config.connect_timeout;
        let pool = self.pool.lock().await;

        if matches!(mode, BringUpMode::ValidateAll) && pool.len() > 1 {
            let mut unreachable = None;
            for endpoint in pool.iter() {
                if !endpoint.socket().connect(timeout).await {
                    unreachable = Some(endpoint.uri().to_string());
                    break;
                }
                debug!(uri = endpoint.uri(), "connect success");
            }
            if let Some(uri) = unreachable {
                drop(pool);
                self.close().await;
                return Err(TransportError::ConnectionTimeout { uri, timeout });
            }

            // Cluster reachability is proven; keep only the active socket.
            let active = pool.active_index();
            for (index, endpoint) in pool.iter().enumerate() {
                if index != active {
                    endpoint.socket().close_blocking().await;
                    debug!(uri = endpoint.uri(), "disconnect success");
                }
            }
            Ok(())
        } else {
            let connected = pool.active().socket().connect(timeout).await;
            let uri = pool.active().uri().to_string();
            if !connected {
                drop(pool);
                self.close().await;
                return Err(TransportError::ConnectionTimeout { uri, timeout });
            }
            debug!(uri = %uri, "connect success");
            Ok(())
        }
    }

    /// Waiting send with the failover-and-retry policy.
    pub async fn send(&self, request: &RequestEnvelope) -> Result<ResponseEnvelope> {
        self.request_with_policy(request, RetryPolicy::WithRetry)
            .await
    }

    /// Waiting send that fails fast on any transmit fault.
    pub async fn send_without_retry(&self, request: &RequestEnvelope) -> Result<ResponseEnvelope> {
        self.request_with_policy(request, RetryPolicy::WithoutRetry)
            .await
    }

    /// Fire-and-forget: transmit with the retry policy, no completion slot,
    /// no wait.
    pub async fn send_no_response(&self, request: &RequestEnvelope) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        let text = request.to_text()?;
        self.transmit(Outbound::Text(&text), RetryPolicy::WithRetry)
            .await
    }

    /// Waiting send of one binary frame: 24-byte big-endian header
    /// (correlation id, statement id, payload type) followed by the raw
    /// payload, then the same admit/transmit/wait path as a text send.
    pub async fn send_binary(
        &self,
        action: &str,
        req_id: u64,
        stmt_id: u64,
        payload_type: u64,
        payload: &[u8],
    ) -> Result<ResponseEnvelope> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        let frame = encode_frame(FrameHeader::new(req_id, stmt_id, payload_type), payload);
        let rx = self.registry.admit(action, req_id).await?;
        if let Err(e) = self
            .transmit(Outbound::Binary(&frame), RetryPolicy::WithRetry)
            .await
        {
            self.registry.remove(req_id);
            return Err(e);
        }
        self.await_response(rx, action, req_id).await
    }

    #[instrument(
        level = "debug",
        skip(self, request),
        fields(action = %request.action, req_id = request.req_id)
    )]
    async fn request_with_policy(
        &self,
        request: &RequestEnvelope,
        policy: RetryPolicy,
    ) -> Result<ResponseEnvelope> {
        if self.is_closed() {
            return Err(TransportError::ConnectionClosed);
        }
        let text = request.to_text()?;

        // Admit before transmit so a response racing the send finds its slot.
        let rx = self.registry.admit(&request.action, request.req_id).await?;
        if let Err(e) = self.transmit(Outbound::Text(&text), policy).await {
            self.registry.remove(request.req_id);
            return Err(e);
        }
        self.await_response(rx, &request.action, request.req_id).await
    }

    async fn transmit(&self, payload: Outbound<'_>, policy: RetryPolicy) -> Result<()> {
        let socket = { self.pool.lock().await.active().socket() };
        match Self::raw_send(socket.as_ref(), &payload).await {
            Ok(()) => Ok(()),
            Err(SocketError::NotConnected) => {
                if policy == RetryPolicy::WithoutRetry {
                    return Err(TransportError::Io("websocket not connected".into()));
                }
                if !self.config.role.allows_auto_retry() {
                    // Subscriber sessions recover from their own poll loop;
                    // surface the loss instead of reconnecting underneath it.
                    return Err(TransportError::ConnectionClosed);
                }
                self.failover().await?;
                let socket = { self.pool.lock().await.active().socket() };
                Self::raw_send(socket.as_ref(), &payload)
                    .await
                    .map_err(|e| TransportError::Io(e.to_string()))
            }
            Err(e) => Err(TransportError::Io(e.to_string())),
        }
    }

    async fn raw_send(
        socket: &S,
        payload: &Outbound<'_>,
    ) -> std::result::Result<(), SocketError> {
        match payload {
            Outbound::Text(text) => socket.send_text(text).await,
            Outbound::Binary(bytes) => socket.send_binary(bytes).await,
        }
    }

    async fn await_response(
        &self,
        rx: oneshot::Receiver<Result<ResponseEnvelope>>,
        action: &str,
        req_id: u64,
    ) -> Result<ResponseEnvelope> {
        let timeout = self.request_timeout();
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.registry.remove(req_id);
                Err(TransportError::Interrupted(format!(
                    "completion dropped for request {req_id}"
                )))
            }
            Err(_) => {
                self.registry.remove(req_id);
                warn!(req_id, action, ?timeout, "request deadline expired");
                Err(TransportError::QueryTimeout {
                    action: action.to_string(),
                    req_id,
                    timeout,
                })
            }
        }
    }

    /// Reconnect the active endpoint, failing over circularly through the
    /// pool. Exhausting the pool (or a disabled auto-reconnect flag) closes
    /// the session permanently.
    async fn failover(&self) -> Result<()> {
        let mut pool = self.pool.lock().await;

        // A pass that finished while we waited on the lock may already have
        // restored the connection.
        if !pool.active().socket().is_closed() {
            trace!(
                uri = pool.active().uri(),
                "active endpoint already reconnected"
            );
            return Ok(());
        }

        let mut visited = 0;
        while visited < pool.len() && self.config.auto_reconnect {
            if self.reconnect_active(&pool).await {
                debug!(uri = pool.active().uri(), "reconnect success");
                return Ok(());
            }
            debug!(uri = pool.active().uri(), "reconnect failed");
            pool.advance();
            visited += 1;
        }

        drop(pool);
        self.close().await;
        Err(TransportError::ConnectionClosed)
    }

    /// One full reconnect attempt for the endpoint at the cursor: bounded
    /// socket-level retries with sleeps in between, then a mandatory
    /// handshake replay that must be accepted before the endpoint counts as
    /// reconnected.
    async fn reconnect_active(&self, pool: &EndpointPool<S>) -> bool {
        let endpoint = pool.active();
        let socket = endpoint.socket();

        let mut reconnected = false;
        for attempt in 1..=self.config.reconnect_retry_count {
            if socket.reconnect_blocking().await {
                reconnected = true;
                break;
            }
            trace!(uri = endpoint.uri(), attempt, "socket reconnect failed");
            tokio::time::sleep(self.config.reconnect_interval).await;
        }
        if !reconnected {
            return false;
        }

        // The server forgot this session when the socket dropped; replay the
        // authentication handshake before declaring the endpoint usable.
        match self.replay_handshake(socket.as_ref()).await {
            Ok(response) if response.is_success() => true,
            Ok(response) => {
                warn!(
                    uri = endpoint.uri(),
                    code = response.code,
                    "handshake rejected after reconnect"
                );
                false
            }
            Err(e) => {
                warn!(uri = endpoint.uri(), error = %e, "handshake failed after reconnect");
                false
            }
        }
    }

    /// Send the `conn` request directly on the given socket, without retry:
    /// a fault here fails the surrounding reconnect attempt instead of
    /// recursing into failover.
    async fn replay_handshake(&self, socket: &S) -> Result<ResponseEnvelope> {
        let args = ConnectArgs {
            req_id: next_req_id(),
            user: self.config.user.clone(),
            password: self.config.password.clone(),
            db: self.config.database.clone(),
            mode: self.config.connect_mode,
        };
        let request =
            RequestEnvelope::with_req_id(ACTION_CONN, args.req_id, serde_json::to_value(&args)?);
        let text = request.to_text()?;

        let rx = self.registry.admit(ACTION_CONN, request.req_id).await?;
        if let Err(e) = socket.send_text(&text).await {
            self.registry.remove(request.req_id);
            return Err(TransportError::Io(e.to_string()));
        }
        self.await_response(rx, ACTION_CONN, request.req_id).await
    }

    /// Route an inbound response to the request that issued it. Responses
    /// for ids no longer pending are dropped.
    pub fn handle_response(&self, response: ResponseEnvelope) {
        self.registry.complete(response.req_id, response);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Whether the active endpoint's socket is currently down.
    pub async fn is_connection_lost(&self) -> bool {
        self.pool.lock().await.active().socket().is_closed()
    }

    /// Close the active socket and bring it back with a single reconnect
    /// attempt. Used by sessions that drive their own recovery.
    pub async fn disconnect_and_reconnect(&self) -> Result<()> {
        let socket = { self.pool.lock().await.active().socket() };
        socket.close_blocking().await;
        if !socket.reconnect_blocking_without_retry().await {
            return Err(TransportError::Io("websocket reconnect failed".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        *self.request_timeout.lock().expect("timeout lock poisoned")
    }

    /// Adjust the per-request wait bound for subsequent sends.
    pub fn set_request_timeout(&self, timeout: Duration) {
        *self.request_timeout.lock().expect("timeout lock poisoned") = timeout;
    }

    pub fn pending_requests(&self) -> usize {
        self.registry.pending_count()
    }

    /// Mark the session closed, fail every outstanding request, and tear
    /// down every endpoint. Idempotent; repeat calls are no-ops.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if self.finalized.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("closing transport session");
        self.registry.close_all();
        let pool = self.pool.lock().await;
        for endpoint in pool.iter() {
            endpoint.socket().close_blocking().await;
        }
    }

    /// Graceful close. New work is rejected immediately; if requests are
    /// still in flight, the hard close is deferred by the request timeout so
    /// they get a chance to finish, without blocking the caller.
    pub async fn shutdown(self: Arc<Self>) {
        self.closed.store(true, Ordering::SeqCst);
        if self.registry.has_pending() {
            let grace = self.request_timeout();
            debug!(
                pending = self.registry.pending_count(),
                ?grace,
                "deferring hard close for in-flight requests"
            );
            let session = Arc::clone(&self);
            tokio::spawn(async move {
                tokio::time::sleep(grace).await;
                session.close().await;
            });
        } else {
            self.close().await;
        }
    }
}
