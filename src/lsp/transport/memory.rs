//! In-process transport whose server side is driven by the caller.
//!
//! Every successful `connect` hands a [`ServerEnd`] to the receiver returned
//! by [`MemoryTransport::new`]. Whoever holds it plays the language server.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;
use tokio::sync::mpsc;

use super::{Socket, SocketEvent, Transport};
use crate::config::ServerConfig;
use crate::error::LockResultExt;
use crate::lsp::protocol::{CloseCode, build_response};

/// Server side of one in-memory socket.
#[derive(Debug)]
pub struct ServerEnd {
    server_id: String,
    from_client: mpsc::UnboundedReceiver<Value>,
    to_client: mpsc::UnboundedSender<SocketEvent>,
}

impl ServerEnd {
    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    /// Next message from the client, `None` once the client closed.
    pub async fn recv(&mut self) -> Option<Value> {
        self.from_client.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Value> {
        self.from_client.try_recv().ok()
    }

    /// Send a message to the client. False if the client is gone.
    pub fn send(&self, message: Value) -> bool {
        self.to_client.send(SocketEvent::Message(message)).is_ok()
    }

    /// Answer `request` with `result`.
    pub fn respond(&self, request: &Value, result: Value) -> bool {
        let id = request.get("id").cloned().unwrap_or(Value::Null);
        self.send(build_response(id, result))
    }

    /// Close the socket with `code`.
    pub fn close(self, code: CloseCode) {
        let _ = self.to_client.send(SocketEvent::Closed(code));
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    connects: AtomicUsize,
    refusals: Mutex<HashMap<String, io::ErrorKind>>,
}

impl MemoryTransport {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        let transport = Self {
            accepted,
            connects: AtomicUsize::new(0),
            refusals: Mutex::new(HashMap::new()),
        };
        (transport, incoming)
    }

    /// Make every future connection attempt to `server_id` fail with `kind`.
    pub fn refuse(&self, server_id: &str, kind: io::ErrorKind) {
        self.refusals
            .lock()
            .recover_poison("MemoryTransport::refuse")
            .insert(server_id.to_string(), kind);
    }

    /// Connection attempts so far, refused ones included.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

impl Transport for MemoryTransport {
    async fn connect(&self, server_id: &str, _config: &ServerConfig) -> io::Result<Socket> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let refusal = self
            .refusals
            .lock()
            .recover_poison("MemoryTransport::connect")
            .get(server_id)
            .copied();
        if let Some(kind) = refusal {
            return Err(io::Error::new(kind, format!("{} refused", server_id)));
        }

        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let end = ServerEnd {
            server_id: server_id.to_string(),
            from_client,
            to_client,
        };
        self.accepted
            .send(end)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "nobody accepts"))?;

        Ok(Socket { outbound, inbound })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn connect_hands_the_server_end_over() {
        let (transport, mut incoming) = MemoryTransport::new();
        let mut socket = transport
            .connect("pylsp", &ServerConfig::default())
            .await
            .unwrap();
        let mut server = incoming.recv().await.unwrap();
        assert_eq!(server.server_id(), "pylsp");

        socket.outbound.send(json!({"id": 1, "method": "x"})).unwrap();
        let request = server.recv().await.unwrap();
        assert!(server.respond(&request, json!("ok")));
        assert_eq!(
            socket.inbound.recv().await,
            Some(SocketEvent::Message(json!({"jsonrpc": "2.0", "id": 1, "result": "ok"})))
        );

        server.close(CloseCode::NO_STATUS);
        assert_eq!(
            socket.inbound.recv().await,
            Some(SocketEvent::Closed(CloseCode::NO_STATUS))
        );
    }

    #[tokio::test]
    async fn refused_servers_fail_and_are_counted() {
        let (transport, _incoming) = MemoryTransport::new();
        transport.refuse("r", io::ErrorKind::NotFound);

        let err = transport
            .connect("r", &ServerConfig::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
        assert_eq!(transport.connect_count(), 1);
    }
}
