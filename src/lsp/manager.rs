//! Multiplexes virtual documents onto shared server connections.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::connection::{
    ConnectionState, LspConnection, base_client_capabilities, merge_client_capabilities,
};
use super::protocol::CloseKind;
use super::registry::ConnectionRegistry;
use super::sessions::{SessionRegistry, SessionStatus};
use super::transport::Transport;
use crate::adapter::{SharedAdapter, WidgetAdapter};
use crate::config::{BridgeSettings, Timeouts};
use crate::document::DocumentInfo;
use crate::error::{BridgeError, BridgeResult, LockResultExt};

/// Readiness poll interval during the first timeout window.
pub const FAST_POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Readiness poll interval during the second timeout window.
pub const SLOW_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct DocumentRegistration {
    server_id: String,
    info: DocumentInfo,
    connection: Arc<LspConnection>,
}

/// Owns which document talks to which server.
///
/// Connections are dialed lazily per server identity and shared through a
/// [`ConnectionRegistry`]. A connection is closed when the last document
/// using it is unregistered.
pub struct DocumentConnectionManager<T: Transport> {
    transport: T,
    sessions: Arc<SessionRegistry>,
    registry: Arc<ConnectionRegistry>,
    root_uri: String,
    timeouts: Timeouts,
    client_capabilities: Value,
    /// Keyed by document URI relative to the root
    documents: Mutex<HashMap<String, DocumentRegistration>>,
    adapters: Mutex<HashMap<String, Weak<tokio::sync::Mutex<WidgetAdapter<T>>>>>,
    /// Languages whose server refused documents
    blacklist: Mutex<HashSet<String>>,
    dial_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
}

impl<T: Transport> std::fmt::Debug for DocumentConnectionManager<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentConnectionManager")
            .field("root_uri", &self.root_uri)
            .field("servers", &self.registry.server_ids())
            .finish()
    }
}

impl<T: Transport> DocumentConnectionManager<T> {
    pub fn new(
        transport: T,
        settings: &BridgeSettings,
        registry: Arc<ConnectionRegistry>,
    ) -> Self {
        let sessions = Arc::new(SessionRegistry::new(settings.language_servers.clone()));
        Self::with_sessions(transport, sessions, registry, settings)
    }

    pub fn with_sessions(
        transport: T,
        sessions: Arc<SessionRegistry>,
        registry: Arc<ConnectionRegistry>,
        settings: &BridgeSettings,
    ) -> Self {
        Self {
            transport,
            sessions,
            registry,
            root_uri: settings.root_uri.clone(),
            timeouts: settings.timeouts,
            client_capabilities: base_client_capabilities(),
            documents: Mutex::new(HashMap::new()),
            adapters: Mutex::new(HashMap::new()),
            blacklist: Mutex::new(HashSet::new()),
            dial_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    /// Announce the client capability fragments of extra features.
    pub fn with_client_capabilities<I>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = Value>,
    {
        self.client_capabilities = merge_client_capabilities(fragments);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn is_blacklisted(&self, language: &str) -> bool {
        self.blacklist
            .lock()
            .recover_poison("DocumentConnectionManager::is_blacklisted")
            .contains(language)
    }

    /// Connection serving `document`, if it is registered.
    pub fn connection_for(&self, document: &DocumentInfo) -> Option<Arc<LspConnection>> {
        self.documents
            .lock()
            .recover_poison("DocumentConnectionManager::connection_for")
            .get(&document.uri)
            .map(|registration| Arc::clone(&registration.connection))
    }

    pub fn registered_documents(&self) -> Vec<DocumentInfo> {
        let mut documents: Vec<DocumentInfo> = self
            .documents
            .lock()
            .recover_poison("DocumentConnectionManager::registered_documents")
            .values()
            .map(|registration| registration.info.clone())
            .collect();
        documents.sort_by(|a, b| a.uri.cmp(&b.uri));
        documents
    }

    /// Ready connection for `document`, dialing one if needed.
    ///
    /// Waits for readiness polling every [`FAST_POLL_INTERVAL`] during the
    /// first timeout window and every [`SLOW_POLL_INTERVAL`] during the
    /// second. Fails with `UnsupportedLanguage` when no server can serve the
    /// language and with `Timeout` when the server never became ready.
    pub async fn connect(&self, document: &DocumentInfo) -> BridgeResult<Arc<LspConnection>> {
        let language = document.language.as_str();
        if self.is_blacklisted(language) {
            return Err(BridgeError::unsupported_language(language));
        }

        let (server_id, connection, dialed) = self.obtain_connection(language).await?;

        if !self.wait_until_ready(&connection).await {
            self.classify_closure(&server_id, &connection, language);
            let error = if self.is_blacklisted(language) {
                BridgeError::unsupported_language(language)
            } else {
                match connection.state() {
                    ConnectionState::Failed => {
                        BridgeError::handshake(&server_id, "initialize was rejected")
                    }
                    ConnectionState::Closing | ConnectionState::Closed => {
                        BridgeError::connection_closed(&server_id)
                    }
                    _ => BridgeError::timeout(format!("{} to serve {}", server_id, document.uri)),
                }
            };
            if self.registry.reference_count(&server_id) == 0
                && self.registry.evict(&server_id, &connection)
            {
                connection.close().await;
            }
            return Err(error);
        }

        if dialed
            && let Some(settings) = self.sessions.expanded_settings(&server_id)
            && settings.as_object().is_some_and(|s| !s.is_empty())
        {
            let _ = connection.send_configuration(settings);
        }

        self.register_document(&server_id, document, &connection);
        Ok(connection)
    }

    /// Cached connection of the best server for `language`, or a new one.
    async fn obtain_connection(
        &self,
        language: &str,
    ) -> BridgeResult<(String, Arc<LspConnection>, bool)> {
        let server_id = self
            .sessions
            .get_matching_servers(language)
            .into_iter()
            .next()
            .ok_or_else(|| BridgeError::unsupported_language(language))?;

        let _dialing = self.dial_lock.lock().await;

        if let Some(existing) = self.registry.get(&server_id) {
            if matches!(
                existing.state(),
                ConnectionState::Initializing | ConnectionState::Ready
            ) {
                return Ok((server_id, existing, false));
            }
            // Dead connections are replaced; unsupported servers are not redialed
            self.classify_closure(&server_id, &existing, language);
            self.registry.evict(&server_id, &existing);
            if self.is_blacklisted(language) {
                return Err(BridgeError::unsupported_language(language));
            }
        }

        let config = self
            .sessions
            .server_config(&server_id)
            .ok_or_else(|| BridgeError::unsupported_language(language))?;

        let socket = match self.transport.connect(&server_id, &config).await {
            Ok(socket) => socket,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!(
                    target: "polylsp::manager",
                    "{} cannot be started ({}); disabling {}",
                    server_id,
                    e,
                    language
                );
                self.blacklist_language(language);
                return Err(BridgeError::unsupported_language(language));
            }
            Err(e) => {
                log::warn!(target: "polylsp::manager", "Failed to connect to {}: {}", server_id, e);
                return Err(e.into());
            }
        };

        log::info!(target: "polylsp::manager", "Connected to {} for {}", server_id, language);
        let connection = LspConnection::start(
            server_id.as_str(),
            self.root_uri.as_str(),
            socket,
            self.client_capabilities.clone(),
            config.initialization_options.clone(),
        );
        self.registry.insert(&server_id, Arc::clone(&connection));
        Ok((server_id, connection, true))
    }

    /// Two-phase readiness wait. Only disposal of the manager cancels it.
    async fn wait_until_ready(&self, connection: &LspConnection) -> bool {
        let mut state = connection.watch_state();
        let fast_deadline = Instant::now() + self.timeouts.first();
        let slow_deadline = fast_deadline + self.timeouts.second();

        loop {
            match *state.borrow_and_update() {
                ConnectionState::Ready => return true,
                ConnectionState::Initializing => {}
                _ => return false,
            }

            let now = Instant::now();
            if now >= slow_deadline {
                log::warn!(
                    target: "polylsp::manager",
                    "{} did not become ready in time",
                    connection.server_id()
                );
                return false;
            }
            let interval = if now < fast_deadline {
                FAST_POLL_INTERVAL
            } else {
                SLOW_POLL_INTERVAL
            };

            tokio::select! {
                _ = self.cancel.cancelled() => return false,
                changed = state.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = tokio::time::sleep(interval.min(slow_deadline - now)) => {}
            }
        }
    }

    /// Blacklist `language` if `connection` closed because the server
    /// refused it.
    fn classify_closure(&self, server_id: &str, connection: &LspConnection, language: &str) {
        let Some(code) = connection.close_code() else {
            return;
        };
        match code.kind() {
            CloseKind::Unsupported => {
                log::warn!(
                    target: "polylsp::manager",
                    "{} does not support {} documents (close code {}); not reconnecting",
                    server_id,
                    language,
                    code
                );
                self.blacklist_language(language);
            }
            CloseKind::Transient => log::info!(
                target: "polylsp::manager",
                "{} closed with code {}; the next document change redials it",
                server_id,
                code
            ),
            CloseKind::Normal => {}
        }
    }

    fn blacklist_language(&self, language: &str) {
        self.blacklist
            .lock()
            .recover_poison("DocumentConnectionManager::blacklist_language")
            .insert(language.to_string());
    }

    fn register_document(
        &self,
        server_id: &str,
        document: &DocumentInfo,
        connection: &Arc<LspConnection>,
    ) {
        let previous = self
            .documents
            .lock()
            .recover_poison("DocumentConnectionManager::register_document")
            .insert(
                document.uri.clone(),
                DocumentRegistration {
                    server_id: server_id.to_string(),
                    info: document.clone(),
                    connection: Arc::clone(connection),
                },
            );
        if let Some(previous) = previous.filter(|p| p.server_id != server_id) {
            // Moved to another server: drop the old reference
            self.registry.release_document(&previous.server_id, &previous.info.uri);
        }
        self.registry.retain_document(server_id, &document.uri);
    }

    /// Forget `document`: close it on its server and release the server
    /// when no other document uses it.
    pub async fn unregister_document(&self, document: &DocumentInfo) {
        let registration = self
            .documents
            .lock()
            .recover_poison("DocumentConnectionManager::unregister_document")
            .remove(&document.uri);
        let Some(registration) = registration else {
            return;
        };

        if let Err(e) = registration.connection.send_close(&registration.info) {
            log::debug!(target: "polylsp::manager", "didClose for {} not sent: {}", document.uri, e);
        }

        if let Some(connection) = self
            .registry
            .release_document(&registration.server_id, &registration.info.uri)
        {
            log::info!(
                target: "polylsp::manager",
                "Closing {}: no documents left",
                registration.server_id
            );
            connection.close().await;
        }
    }

    pub fn register_adapter(&self, path: &str, adapter: &SharedAdapter<T>) {
        self.adapters
            .lock()
            .recover_poison("DocumentConnectionManager::register_adapter")
            .insert(path.to_string(), Arc::downgrade(adapter));
    }

    pub fn unregister_adapter(&self, path: &str) {
        self.adapters
            .lock()
            .recover_poison("DocumentConnectionManager::unregister_adapter")
            .remove(path);
    }

    /// Follow a widget whose document moved from `old_path` to `new_path`.
    pub fn rename_adapter(&self, old_path: &str, new_path: &str) {
        let mut adapters = self
            .adapters
            .lock()
            .recover_poison("DocumentConnectionManager::rename_adapter");
        if let Some(adapter) = adapters.remove(old_path) {
            adapters.insert(new_path.to_string(), adapter);
        }
    }

    /// Adapter of the widget showing `path`.
    pub fn adapter(&self, path: &str) -> Option<SharedAdapter<T>> {
        self.adapters
            .lock()
            .recover_poison("DocumentConnectionManager::adapter")
            .get(path)
            .and_then(Weak::upgrade)
    }

    /// Change settings of `server_id` and push them to its live connection.
    pub fn update_configuration(
        &self,
        server_id: &str,
        settings: Map<String, Value>,
    ) -> BridgeResult<()> {
        let expanded = self.sessions.set_configuration(server_id, settings)?;
        match self.registry.get(server_id) {
            Some(connection) if connection.is_ready() => connection.send_configuration(expanded),
            _ => Ok(()),
        }
    }

    /// Read-only listing of configured servers.
    pub fn session_listing(&self) -> Vec<SessionStatus> {
        self.sessions.list(|server_id| {
            self.registry
                .get(server_id)
                .is_some_and(|connection| connection.is_ready())
        })
    }

    /// Stop pending readiness waits and release every document.
    pub async fn dispose(&self) {
        self.cancel.cancel();
        let documents: Vec<DocumentInfo> = self
            .documents
            .lock()
            .recover_poison("DocumentConnectionManager::dispose")
            .values()
            .map(|registration| registration.info.clone())
            .collect();
        for document in documents {
            self.unregister_document(&document).await;
        }
        self.adapters
            .lock()
            .recover_poison("DocumentConnectionManager::dispose")
            .clear();
    }
}
