//! A scriptable in-memory socket for driving the transport session.
//!
//! Each mock tracks whether it is "connected" and whether its server is
//! "reachable": sends fail with `NotConnected` while disconnected, and
//! reconnect attempts only succeed while reachable. Everything the session
//! transmits is recorded and forwarded on a channel so a test can play the
//! server's side of the exchange.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use wsbridge::messages::frame::FrameHeader;
use wsbridge::messages::RequestEnvelope;
use wsbridge::transport::TransportSession;
use wsbridge::{Socket, SocketError};

use super::ok_response;

/// One payload observed leaving the session.
#[derive(Debug, Clone)]
pub enum SentPayload {
    Text(String),
    Binary(Vec<u8>),
}

#[derive(Debug)]
struct MockState {
    connected: bool,
    reachable: bool,
    sent: Vec<SentPayload>,
    connect_calls: u32,
    reconnect_attempts: u32,
    close_calls: u32,
}

/// Cloneable handle to one mock endpoint; clones share state, so a test can
/// keep a copy for assertions after handing one to the endpoint pool.
#[derive(Clone)]
pub struct MockSocket {
    name: &'static str,
    state: Arc<Mutex<MockState>>,
    outbound: mpsc::UnboundedSender<(&'static str, SentPayload)>,
}

impl MockSocket {
    pub fn new(
        name: &'static str,
        connected: bool,
        reachable: bool,
        outbound: mpsc::UnboundedSender<(&'static str, SentPayload)>,
    ) -> Self {
        Self {
            name,
            state: Arc::new(Mutex::new(MockState {
                connected,
                reachable,
                sent: Vec::new(),
                connect_calls: 0,
                reconnect_attempts: 0,
                close_calls: 0,
            })),
            outbound,
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().unwrap().reachable = reachable;
    }

    pub fn set_connected(&self, connected: bool) {
        self.state.lock().unwrap().connected = connected;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    pub fn sent(&self) -> Vec<SentPayload> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn sent_count(&self) -> usize {
        self.state.lock().unwrap().sent.len()
    }

    pub fn connect_calls(&self) -> u32 {
        self.state.lock().unwrap().connect_calls
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.state.lock().unwrap().reconnect_attempts
    }

    pub fn close_calls(&self) -> u32 {
        self.state.lock().unwrap().close_calls
    }

    fn record_send(&self, payload: SentPayload) -> Result<(), SocketError> {
        let mut state = self.state.lock().unwrap();
        if !state.connected {
            return Err(SocketError::NotConnected);
        }
        state.sent.push(payload.clone());
        drop(state);
        // The pump may have been dropped on purpose; that only means nobody
        // answers.
        let _ = self.outbound.send((self.name, payload));
        Ok(())
    }

    fn try_reconnect(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.reconnect_attempts += 1;
        if state.reachable {
            state.connected = true;
        }
        state.reachable
    }
}

#[async_trait]
impl Socket for MockSocket {
    async fn connect(&self, _timeout: Duration) -> bool {
        let mut state = self.state.lock().unwrap();
        state.connect_calls += 1;
        if state.reachable {
            state.connected = true;
        }
        state.reachable
    }

    async fn send_text(&self, text: &str) -> Result<(), SocketError> {
        self.record_send(SentPayload::Text(text.to_string()))
    }

    async fn send_binary(&self, bytes: &[u8]) -> Result<(), SocketError> {
        self.record_send(SentPayload::Binary(bytes.to_vec()))
    }

    async fn reconnect_blocking(&self) -> bool {
        self.try_reconnect()
    }

    async fn reconnect_blocking_without_retry(&self) -> bool {
        self.try_reconnect()
    }

    async fn close_blocking(&self) {
        let mut state = self.state.lock().unwrap();
        state.close_calls += 1;
        state.connected = false;
    }

    fn is_closed(&self) -> bool {
        !self.state.lock().unwrap().connected
    }
}

/// Play a server that answers every request with a success response echoing
/// the correlation id, regardless of which endpoint it arrived on.
pub fn spawn_responder(
    session: Arc<TransportSession<MockSocket>>,
    mut outbound: mpsc::UnboundedReceiver<(&'static str, SentPayload)>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some((_, payload)) = outbound.recv().await {
            let response = match payload {
                SentPayload::Text(text) => {
                    let request: RequestEnvelope =
                        serde_json::from_str(&text).expect("session sent malformed JSON");
                    ok_response(&request.action, request.req_id)
                }
                SentPayload::Binary(bytes) => {
                    let (header, _) =
                        FrameHeader::parse(&bytes).expect("session sent malformed frame");
                    ok_response("binary", header.req_id)
                }
            };
            session.handle_response(response);
        }
    })
}
