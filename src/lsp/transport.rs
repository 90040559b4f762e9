//! Sockets to language servers.
//!
//! A [`Transport`] dials a server and hands back a [`Socket`]: an outbound
//! frame sender plus a stream of inbound [`SocketEvent`]s. Dropping the
//! outbound sender closes the socket from our side.

pub mod framing;
pub mod memory;
pub mod stdio;

pub use memory::{MemoryTransport, ServerEnd};
pub use stdio::StdioTransport;

use std::future::Future;
use std::io;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::lsp::protocol::CloseCode;

/// Something received from a server socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Message(Value),
    /// The socket closed; no further events follow
    Closed(CloseCode),
}

/// A live connection to one server.
#[derive(Debug)]
pub struct Socket {
    pub outbound: mpsc::UnboundedSender<Value>,
    pub inbound: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Dials language servers.
///
/// `connect` fails with [`io::ErrorKind::NotFound`] when the server cannot
/// exist at all (e.g. its program is not installed); other errors are
/// considered transient.
pub trait Transport: Send + Sync + 'static {
    fn connect(
        &self,
        server_id: &str,
        config: &ServerConfig,
    ) -> impl Future<Output = io::Result<Socket>> + Send;
}
