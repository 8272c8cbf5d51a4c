pub mod config;
pub mod error;
pub mod messages;
pub mod transport;

// Re-export key types for easy testing
pub use config::{SessionConfig, SessionRole};
pub use error::{Result, TransportError};
pub use messages::{RequestEnvelope, ResponseEnvelope};
pub use transport::{
    BringUpMode, Endpoint, EndpointPool, EndpointRole, Socket, SocketError, TransportSession,
};
