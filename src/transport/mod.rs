pub mod endpoint;
pub mod registry;
pub mod session;

pub use endpoint::{Endpoint, EndpointPool, EndpointRole, Socket, SocketError};
pub use registry::InFlightRegistry;
pub use session::{BringUpMode, RetryPolicy, TransportSession};
