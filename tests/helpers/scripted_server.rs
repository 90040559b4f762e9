//! Scripted language servers on top of the in-memory transport.
//!
//! Every accepted connection is played by a task that answers `initialize`
//! (optionally after a delay) and `shutdown`, and records every message it
//! receives in a shared journal.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use polylsp::config::{BridgeSettings, ServerConfig};
use polylsp::lsp::{ConnectionRegistry, DocumentConnectionManager, MemoryTransport, ServerEnd};
use serde_json::{Value, json};
use tokio::sync::{mpsc, Notify};

/// How a scripted server answers `initialize`.
#[derive(Debug, Clone, Copy)]
pub enum Handshake {
    After(Duration),
    Never,
}

#[derive(Default)]
struct JournalInner {
    messages: Mutex<Vec<(String, Value)>>,
    changed: Notify,
}

/// Messages received by every scripted server, in arrival order.
#[derive(Clone, Default)]
pub struct Journal {
    inner: Arc<JournalInner>,
}

impl Journal {
    fn record(&self, server_id: &str, message: Value) {
        self.inner
            .messages
            .lock()
            .unwrap()
            .push((server_id.to_string(), message));
        self.inner.changed.notify_waiters();
    }

    /// Methods `server_id` received so far.
    pub fn methods(&self, server_id: &str) -> Vec<String> {
        self.messages(server_id, None)
            .iter()
            .filter_map(|m| m["method"].as_str().map(str::to_string))
            .collect()
    }

    /// Messages `server_id` received, optionally only those of `method`.
    pub fn messages(&self, server_id: &str, method: Option<&str>) -> Vec<Value> {
        self.inner
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(from, _)| from == server_id)
            .filter(|(_, m)| method.is_none_or(|method| m["method"] == method))
            .map(|(_, m)| m.clone())
            .collect()
    }

    /// Wait until `server_id` received `count` messages of `method`.
    pub async fn wait_for(&self, server_id: &str, method: &str, count: usize) -> Vec<Value> {
        let wait = async {
            loop {
                let notified = self.inner.changed.notified();
                let messages = self.messages(server_id, Some(method));
                if messages.len() >= count {
                    return messages;
                }
                notified.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(10), wait)
            .await
            .unwrap_or_else(|_| panic!("{server_id} never received {count} x {method}"))
    }
}

pub struct ScriptedServers {
    pub journal: Journal,
    handshakes: Arc<Mutex<HashMap<String, Handshake>>>,
}

impl ScriptedServers {
    /// Serve every connection accepted on `incoming`.
    pub fn start(mut incoming: mpsc::UnboundedReceiver<ServerEnd>) -> Self {
        let servers = Self {
            journal: Journal::default(),
            handshakes: Arc::new(Mutex::new(HashMap::new())),
        };
        let journal = servers.journal.clone();
        let handshakes = Arc::clone(&servers.handshakes);
        tokio::spawn(async move {
            while let Some(end) = incoming.recv().await {
                let handshake = handshakes
                    .lock()
                    .unwrap()
                    .get(end.server_id())
                    .copied()
                    .unwrap_or(Handshake::After(Duration::ZERO));
                tokio::spawn(play(end, handshake, journal.clone()));
            }
        });
        servers
    }

    pub fn set_handshake(&self, server_id: &str, handshake: Handshake) {
        self.handshakes
            .lock()
            .unwrap()
            .insert(server_id.to_string(), handshake);
    }
}

async fn play(mut end: ServerEnd, handshake: Handshake, journal: Journal) {
    let server_id = end.server_id().to_string();
    while let Some(message) = end.recv().await {
        journal.record(&server_id, message.clone());
        match (message["method"].as_str(), handshake) {
            (Some("initialize"), Handshake::After(delay)) => {
                tokio::time::sleep(delay).await;
                end.respond(&message, json!({"capabilities": {"hoverProvider": true}}));
            }
            (Some("shutdown"), _) => {
                end.respond(&message, Value::Null);
            }
            _ => {}
        }
    }
}

pub fn server(languages: &[&str], priority: Option<u32>) -> ServerConfig {
    ServerConfig {
        cmd: vec!["scripted".to_string()],
        languages: languages.iter().map(|l| l.to_string()).collect(),
        priority,
        ..Default::default()
    }
}

/// Manager over scripted servers configured as `servers`.
pub fn scripted_manager(
    servers: &[(&str, ServerConfig)],
) -> (Arc<DocumentConnectionManager<MemoryTransport>>, ScriptedServers) {
    let settings = BridgeSettings {
        root_uri: "file:///work/".to_string(),
        language_servers: servers
            .iter()
            .map(|(id, config)| (id.to_string(), config.clone()))
            .collect(),
        ..Default::default()
    };
    let (transport, incoming) = MemoryTransport::new();
    let manager =
        DocumentConnectionManager::new(transport, &settings, Arc::new(ConnectionRegistry::new()));
    (Arc::new(manager), ScriptedServers::start(incoming))
}
