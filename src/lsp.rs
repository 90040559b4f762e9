//! Connections to external language servers.
//!
//! [`DocumentConnectionManager`] decides which server serves a virtual
//! document and shares one [`LspConnection`] per server identity between
//! every document tree through the [`ConnectionRegistry`].

pub mod connection;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod sessions;
pub mod transport;

pub use connection::{ConnectionState, LspConnection};
pub use manager::{DocumentConnectionManager, FAST_POLL_INTERVAL, SLOW_POLL_INTERVAL};
pub use registry::ConnectionRegistry;
pub use sessions::{SessionRegistry, SessionStatus};
pub use transport::{MemoryTransport, ServerEnd, Socket, SocketEvent, StdioTransport, Transport};
