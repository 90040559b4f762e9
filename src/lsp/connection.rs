//! A client for one language server.
//!
//! [`LspConnection::start`] takes an open [`Socket`], spawns a reader task
//! and runs the initialize handshake in the background. Documents synced
//! before the handshake completes are queued and opened once it does.

mod capabilities;
mod router;
mod state;
mod tracker;

pub use capabilities::{base_client_capabilities, capability_for_method, merge_client_capabilities};
pub use state::ConnectionState;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tower_lsp_server::ls_types::{
    LogMessageParams, MessageType, RegistrationParams, ShowMessageParams,
    ShowMessageRequestParams, TextDocumentContentChangeEvent, UnregistrationParams,
};

use crate::document::DocumentInfo;
use crate::document::uri::server_uri;
use crate::error::{BridgeError, BridgeResult, LockResultExt};
use crate::lsp::protocol::{
    CloseCode, CloseKind, Incoming, METHOD_NOT_FOUND, RequestId, build_did_change_configuration,
    build_did_change_notification, build_did_close_notification, build_did_open_notification,
    build_did_save_notification, build_error_response, build_exit_notification,
    build_initialize_request, build_initialized_notification, build_notification, build_request,
    build_response, build_shutdown_request, validate_initialize_response,
};
use crate::lsp::transport::{Socket, SocketEvent};

use capabilities::ServerCapabilitySet;
use router::ResponseRouter;
use tracker::DocumentTracker;

/// How long `close()` waits for the shutdown response.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON-RPC InvalidParams.
const INVALID_PARAMS: i64 = -32602;

/// LSP ServerNotInitialized.
const SERVER_NOT_INITIALIZED: i64 = -32002;

/// Answers a server-initiated request with a result.
pub type RequestHandler = Arc<dyn Fn(Value) -> Value + Send + Sync>;

#[derive(Debug, Clone)]
struct PendingOpen {
    info: DocumentInfo,
    text: String,
}

/// Client side of one language server session.
pub struct LspConnection {
    server_id: String,
    root_uri: String,
    outbound: Mutex<Option<mpsc::UnboundedSender<Value>>>,
    router: ResponseRouter,
    next_request_id: AtomicI64,
    state: watch::Sender<ConnectionState>,
    close_code: watch::Sender<Option<CloseCode>>,
    documents: DocumentTracker,
    pending_opens: Mutex<Vec<PendingOpen>>,
    capabilities: ServerCapabilitySet,
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<Value>>>>,
    request_handlers: RwLock<HashMap<String, RequestHandler>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for LspConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LspConnection")
            .field("server_id", &self.server_id)
            .field("state", &self.state())
            .field("open_documents", &self.documents.opened_count())
            .finish()
    }
}

impl LspConnection {
    /// Start a session over `socket`.
    ///
    /// The initialize request announces `client_capabilities`; its outcome
    /// is observable through [`LspConnection::state`].
    pub fn start(
        server_id: impl Into<String>,
        root_uri: impl Into<String>,
        socket: Socket,
        client_capabilities: Value,
        initialization_options: Option<Value>,
    ) -> Arc<Self> {
        let Socket { outbound, inbound } = socket;
        let connection = Arc::new(Self {
            server_id: server_id.into(),
            root_uri: root_uri.into(),
            outbound: Mutex::new(Some(outbound)),
            router: ResponseRouter::new(),
            next_request_id: AtomicI64::new(1),
            state: watch::Sender::new(ConnectionState::Initializing),
            close_code: watch::Sender::new(None),
            documents: DocumentTracker::new(),
            pending_opens: Mutex::new(Vec::new()),
            capabilities: ServerCapabilitySet::default(),
            subscribers: Mutex::new(HashMap::new()),
            request_handlers: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        });

        tokio::spawn(reader_loop(
            Arc::downgrade(&connection),
            inbound,
            connection.cancel.clone(),
        ));
        tokio::spawn(Arc::clone(&connection).initialize(client_capabilities, initialization_options));

        connection
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Code the socket closed with, once it has.
    pub fn close_code(&self) -> Option<CloseCode> {
        *self.close_code.borrow()
    }

    /// Resolves once the connection reached [`ConnectionState::Closed`].
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == ConnectionState::Closed).await;
    }

    /// Whether the server advertised or dynamically registered `capability`,
    /// e.g. `hoverProvider`.
    pub fn provides(&self, capability: &str) -> bool {
        self.capabilities.provides(capability)
    }

    /// Server capabilities with dynamic registrations merged in.
    pub fn server_capabilities(&self) -> Value {
        self.capabilities.merged()
    }

    pub fn is_open(&self, info: &DocumentInfo) -> bool {
        self.documents.is_opened(&self.server_uri(info))
    }

    pub fn document_version(&self, info: &DocumentInfo) -> Option<i32> {
        self.documents.version(&self.server_uri(info))
    }

    /// Number of documents currently open on the server.
    pub fn open_document_count(&self) -> usize {
        self.documents.opened_count()
    }

    /// Absolute URI of `info` as the server sees it.
    pub fn server_uri(&self, info: &DocumentInfo) -> String {
        match server_uri(&self.root_uri, &info.uri) {
            Ok(uri) => uri,
            Err(e) => {
                log::warn!(
                    target: "polylsp::connection",
                    "Cannot resolve {} against {}: {}",
                    info.uri,
                    self.root_uri,
                    e
                );
                info.uri.clone()
            }
        }
    }

    /// Receive the params of every `method` notification from the server.
    pub fn subscribe(&self, method: &str) -> mpsc::UnboundedReceiver<Value> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .recover_poison("LspConnection::subscribe")
            .entry(method.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Answer server-initiated `method` requests with `handler`.
    ///
    /// Replaces the built-in answer for that method, if any.
    pub fn on_request<F>(&self, method: &str, handler: F)
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.request_handlers
            .write()
            .recover_poison("LspConnection::on_request")
            .insert(method.to_string(), Arc::new(handler));
    }

    /// Open `info` now if the server is ready, otherwise once it is.
    ///
    /// Queued documents keep only their latest text.
    pub fn send_open_when_ready(&self, info: &DocumentInfo, text: &str) -> BridgeResult<()> {
        match self.state() {
            ConnectionState::Ready => self.send_open(info, text),
            ConnectionState::Initializing => {
                let mut pending = self
                    .pending_opens
                    .lock()
                    .recover_poison("LspConnection::send_open_when_ready");
                match pending.iter_mut().find(|p| p.info.uri == info.uri) {
                    Some(existing) => existing.text = text.to_string(),
                    None => pending.push(PendingOpen {
                        info: info.clone(),
                        text: text.to_string(),
                    }),
                }
                Ok(())
            }
            _ => Err(BridgeError::connection_closed(&self.server_id)),
        }
    }

    /// Replace the whole text of `info` on the server.
    ///
    /// Sends `didOpen` first if the document is not open yet. Before the
    /// handshake completes the text is queued instead.
    pub fn send_full_text_change(&self, text: &str, info: &DocumentInfo) -> BridgeResult<()> {
        let change = TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: text.to_string(),
        };
        self.send_change(change, info, text)
    }

    /// Apply one incremental change to `info`.
    ///
    /// `full_text` is the document after the change. It is only sent when
    /// the document has to be opened first.
    pub fn send_selective_change(
        &self,
        change: TextDocumentContentChangeEvent,
        info: &DocumentInfo,
        full_text: &str,
    ) -> BridgeResult<()> {
        self.send_change(change, info, full_text)
    }

    fn send_change(
        &self,
        change: TextDocumentContentChangeEvent,
        info: &DocumentInfo,
        full_text: &str,
    ) -> BridgeResult<()> {
        if !self.is_ready() {
            return self.send_open_when_ready(info, full_text);
        }
        let uri = self.server_uri(info);
        if !self.documents.is_opened(&uri) {
            self.send_open(info, full_text)?;
        }
        let version = self.documents.next_version(&uri);
        self.send(build_did_change_notification(&uri, version, &[change]))
    }

    /// Tell the server `info` was saved, with its current text.
    pub fn send_saved(&self, info: &DocumentInfo, text: &str) -> BridgeResult<()> {
        let uri = self.server_uri(info);
        if !self.documents.is_opened(&uri) {
            log::debug!(target: "polylsp::connection", "Not saving unopened {}", uri);
            return Ok(());
        }
        self.send(build_did_save_notification(&uri, text))
    }

    /// Close `info` on the server. A no-op for documents that are not open.
    pub fn send_close(&self, info: &DocumentInfo) -> BridgeResult<()> {
        self.pending_opens
            .lock()
            .recover_poison("LspConnection::send_close")
            .retain(|p| p.info.uri != info.uri);

        let uri = self.server_uri(info);
        if !self.documents.close(&uri) {
            return Ok(());
        }
        self.send(build_did_close_notification(&uri))
    }

    /// Push new server settings via `workspace/didChangeConfiguration`.
    pub fn send_configuration(&self, settings: Value) -> BridgeResult<()> {
        self.send(build_did_change_configuration(settings))
    }

    pub fn notify(&self, method: &str, params: Value) -> BridgeResult<()> {
        self.send(build_notification(method, params))
    }

    /// Send a request and wait for its result.
    pub async fn send_request(&self, method: &str, params: Value) -> BridgeResult<Value> {
        match self.state() {
            ConnectionState::Ready => self.request(method, params).await,
            ConnectionState::Initializing => Err(BridgeError::Protocol {
                code: SERVER_NOT_INITIALIZED,
                message: format!("{} is still initializing", self.server_id),
            }),
            _ => Err(BridgeError::connection_closed(&self.server_id)),
        }
    }

    /// Shut the server down gracefully and close the socket.
    pub async fn close(&self) {
        if !self.transition(ConnectionState::Closing) {
            return;
        }
        log::debug!(target: "polylsp::connection", "Closing connection to {}", self.server_id);

        let shutdown = self.request_with(build_shutdown_request, Value::Null);
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, shutdown).await {
            Ok(Ok(_)) => {
                let _ = self.send(build_exit_notification());
            }
            Ok(Err(e)) => {
                log::debug!(
                    target: "polylsp::connection",
                    "Shutdown of {} failed: {}",
                    self.server_id,
                    e
                );
            }
            Err(_) => {
                log::warn!(
                    target: "polylsp::connection",
                    "{} did not answer shutdown within {:?}",
                    self.server_id,
                    SHUTDOWN_TIMEOUT
                );
            }
        }

        self.mark_closed(CloseCode::NORMAL);
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::new(self.next_request_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request(&self, method: &str, params: Value) -> BridgeResult<Value> {
        self.request_with(|id| build_request(id, method, params), Value::Null)
            .await
    }

    /// Send the request built by `build` and return its result, or
    /// `default` when the server answered with a null result.
    async fn request_with<F>(&self, build: F, default: Value) -> BridgeResult<Value>
    where
        F: FnOnce(RequestId) -> Value,
    {
        let response = self.request_raw(build).await?;
        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            return Err(BridgeError::from_rpc_error(error));
        }
        Ok(response
            .get("result")
            .filter(|r| !r.is_null())
            .cloned()
            .unwrap_or(default))
    }

    /// Send a request and return the whole response message.
    async fn request_raw<F>(&self, build: F) -> BridgeResult<Value>
    where
        F: FnOnce(RequestId) -> Value,
    {
        let request_id = self.next_request_id();
        let receiver = self.router.register(request_id).ok_or_else(|| BridgeError::Protocol {
            code: INVALID_PARAMS,
            message: format!("request id {} is already pending", request_id),
        })?;

        if let Err(e) = self.send(build(request_id)) {
            self.router.remove(request_id);
            return Err(e);
        }

        receiver
            .await
            .map_err(|_| BridgeError::connection_closed(&self.server_id))
    }

    fn send(&self, message: Value) -> BridgeResult<()> {
        let outbound = self.outbound.lock().recover_poison("LspConnection::send");
        match outbound.as_ref() {
            Some(sender) if sender.send(message).is_ok() => Ok(()),
            _ => Err(BridgeError::connection_closed(&self.server_id)),
        }
    }

    fn send_open(&self, info: &DocumentInfo, text: &str) -> BridgeResult<()> {
        let uri = self.server_uri(info);
        let Some(version) = self.documents.open(&uri) else {
            return Ok(());
        };
        log::debug!(target: "polylsp::connection", "Opening {} on {}", uri, self.server_id);
        self.send(build_did_open_notification(&uri, &info.language, version, text))
    }

    /// Move to `next` if allowed from the current state.
    fn transition(&self, next: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        })
    }

    async fn initialize(self: Arc<Self>, client_capabilities: Value, options: Option<Value>) {
        let root_uri = self.root_uri.clone();
        let response = self
            .request_raw(|id| build_initialize_request(id, &root_uri, client_capabilities, options))
            .await;

        let capabilities = response.and_then(|response| {
            validate_initialize_response(&response)
                .map_err(|e| BridgeError::handshake(&self.server_id, e.to_string()))
        });

        match capabilities {
            Ok(capabilities) => {
                self.capabilities.set_advertised(capabilities);
                if self.send(build_initialized_notification()).is_err()
                    || !self.transition(ConnectionState::Ready)
                {
                    return;
                }
                log::info!(target: "polylsp::connection", "{} is ready", self.server_id);
                self.flush_pending_opens();
            }
            Err(e) => {
                log::warn!(
                    target: "polylsp::connection",
                    "Initialization of {} failed: {}",
                    self.server_id,
                    e
                );
                self.transition(ConnectionState::Failed);
            }
        }
    }

    fn flush_pending_opens(&self) {
        let pending = std::mem::take(
            &mut *self
                .pending_opens
                .lock()
                .recover_poison("LspConnection::flush_pending_opens"),
        );
        for PendingOpen { info, text } in pending {
            if let Err(e) = self.send_open(&info, &text) {
                log::warn!(target: "polylsp::connection", "Failed to open {}: {}", info.uri, e);
            }
        }
    }

    fn mark_closed(&self, code: CloseCode) {
        self.close_code.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(code);
                true
            } else {
                false
            }
        });
        if !self.transition(ConnectionState::Closed) {
            return;
        }

        match code.kind() {
            CloseKind::Normal => {
                log::debug!(target: "polylsp::connection", "{} closed", self.server_id)
            }
            CloseKind::Unsupported => log::info!(
                target: "polylsp::connection",
                "{} refused the document (close code {})",
                self.server_id,
                code
            ),
            CloseKind::Transient => log::warn!(
                target: "polylsp::connection",
                "{} closed abnormally (close code {})",
                self.server_id,
                code
            ),
        }

        self.outbound
            .lock()
            .recover_poison("LspConnection::mark_closed")
            .take();
        self.cancel.cancel();
        self.router.fail_all("connection closed");
        self.pending_opens
            .lock()
            .recover_poison("LspConnection::mark_closed")
            .clear();
        self.documents.clear();
    }

    fn dispatch(&self, message: Value) {
        match Incoming::classify(message) {
            Incoming::Response { message, .. } => {
                if !self.router.route(message) {
                    log::debug!(
                        target: "polylsp::connection",
                        "Dropped response nobody waits for from {}",
                        self.server_id
                    );
                }
            }
            Incoming::Request { id, method, params } => {
                let response = self.answer_request(id, &method, params);
                let _ = self.send(response);
            }
            Incoming::Notification { method, params } => {
                self.handle_notification(&method, params)
            }
            Incoming::Invalid(message) => log::warn!(
                target: "polylsp::connection",
                "Invalid message from {}: {}",
                self.server_id,
                message
            ),
        }
    }

    fn answer_request(&self, id: Value, method: &str, params: Value) -> Value {
        let handler = self
            .request_handlers
            .read()
            .recover_poison("LspConnection::answer_request")
            .get(method)
            .cloned();
        if let Some(handler) = handler {
            return build_response(id, handler(params));
        }

        let result = match method {
            "client/registerCapability" => serde_json::from_value::<RegistrationParams>(params)
                .map(|p| self.capabilities.dynamic().register(p.registrations)),
            "client/unregisterCapability" => {
                serde_json::from_value::<UnregistrationParams>(params)
                    .map(|p| self.capabilities.dynamic().unregister(p.unregisterations))
            }
            "workspace/configuration" => {
                // No client-side overrides: one null per requested item
                let items = params
                    .get("items")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                return build_response(id, Value::Array(vec![Value::Null; items]));
            }
            "window/showMessageRequest" => {
                serde_json::from_value::<ShowMessageRequestParams>(params)
                    .map(|p| self.log_server_message(p.typ, &p.message))
            }
            "window/workDoneProgress/create" => Ok(()),
            _ => {
                log::debug!(
                    target: "polylsp::connection",
                    "Unhandled request {} from {}",
                    method,
                    self.server_id
                );
                return build_error_response(id, METHOD_NOT_FOUND, &format!("Unhandled method {}", method));
            }
        };

        match result {
            Ok(()) => build_response(id, Value::Null),
            Err(e) => build_error_response(id, INVALID_PARAMS, &e.to_string()),
        }
    }

    fn handle_notification(&self, method: &str, params: Value) {
        match method {
            "window/logMessage" => {
                if let Ok(p) = serde_json::from_value::<LogMessageParams>(params.clone()) {
                    self.log_server_message(p.typ, &p.message);
                }
            }
            "window/showMessage" => {
                if let Ok(p) = serde_json::from_value::<ShowMessageParams>(params.clone()) {
                    self.log_server_message(p.typ, &p.message);
                }
            }
            "$/logTrace" => {
                if let Some(message) = params.get("message").and_then(Value::as_str) {
                    log::trace!(target: "polylsp::server", "[{}] {}", self.server_id, message);
                }
            }
            _ => {}
        }

        let mut subscribers = self
            .subscribers
            .lock()
            .recover_poison("LspConnection::handle_notification");
        if let Some(senders) = subscribers.get_mut(method) {
            senders.retain(|sender| sender.send(params.clone()).is_ok());
        }
    }

    fn log_server_message(&self, typ: MessageType, message: &str) {
        let level = if typ == MessageType::ERROR {
            log::Level::Error
        } else if typ == MessageType::WARNING {
            log::Level::Warn
        } else if typ == MessageType::INFO {
            log::Level::Info
        } else {
            log::Level::Debug
        };
        log::log!(target: "polylsp::server", level, "[{}] {}", self.server_id, message);
    }
}

/// Dispatch inbound socket events until the socket or the connection goes.
async fn reader_loop(
    connection: Weak<LspConnection>,
    mut inbound: mpsc::UnboundedReceiver<SocketEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = inbound.recv() => event,
        };
        let Some(connection) = connection.upgrade() else {
            break;
        };
        match event {
            Some(SocketEvent::Message(message)) => connection.dispatch(message),
            Some(SocketEvent::Closed(code)) => {
                connection.mark_closed(code);
                break;
            }
            None => {
                connection.mark_closed(CloseCode::ABNORMAL);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::lsp::transport::{MemoryTransport, ServerEnd, Transport};
    use serde_json::json;

    fn info(uri: &str, language: &str) -> DocumentInfo {
        DocumentInfo {
            uri: uri.to_string(),
            language: language.to_string(),
            id_path: language.to_string(),
        }
    }

    async fn start() -> (Arc<LspConnection>, ServerEnd) {
        let (transport, mut incoming) = MemoryTransport::new();
        let socket = transport
            .connect("pylsp", &ServerConfig::default())
            .await
            .unwrap();
        let connection =
            LspConnection::start("pylsp", "file:///project/", socket, json!({}), None);
        let server = incoming.recv().await.unwrap();
        (connection, server)
    }

    /// Answer initialize and consume `initialized`.
    async fn handshake(server: &mut ServerEnd, capabilities: Value) {
        let initialize = server.recv().await.unwrap();
        assert_eq!(initialize["method"], "initialize");
        server.respond(&initialize, json!({"capabilities": capabilities}));
        assert_eq!(server.recv().await.unwrap()["method"], "initialized");
    }

    async fn ready() -> (Arc<LspConnection>, ServerEnd) {
        let (connection, mut server) = start().await;
        handshake(&mut server, json!({"hoverProvider": true})).await;
        let mut state = connection.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Ready)
            .await
            .unwrap();
        (connection, server)
    }

    #[tokio::test]
    async fn initialize_carries_root_uri_and_capabilities() {
        let (connection, mut server) = start().await;
        let initialize = server.recv().await.unwrap();

        assert_eq!(initialize["params"]["rootUri"], "file:///project/");
        assert_eq!(connection.state(), ConnectionState::Initializing);
    }

    #[tokio::test]
    async fn handshake_makes_connection_ready() {
        let (connection, _server) = ready().await;
        assert!(connection.is_ready());
        assert!(connection.provides("hoverProvider"));
        assert!(!connection.provides("completionProvider"));
    }

    #[tokio::test]
    async fn rejected_initialize_fails_connection() {
        let (connection, mut server) = start().await;
        let initialize = server.recv().await.unwrap();
        server.send(json!({
            "jsonrpc": "2.0",
            "id": initialize["id"],
            "error": {"code": -32603, "message": "boom"}
        }));

        let mut state = connection.watch_state();
        state
            .wait_for(|s| *s == ConnectionState::Failed)
            .await
            .unwrap();
        assert!(
            connection
                .send_full_text_change("x", &info("a.py", "python"))
                .is_err()
        );
    }

    #[tokio::test]
    async fn documents_queued_before_ready_are_opened_with_latest_text() {
        let (connection, mut server) = start().await;
        let doc = info("a.ipynb", "python");
        connection.send_full_text_change("x = 1", &doc).unwrap();
        connection.send_full_text_change("x = 2", &doc).unwrap();

        handshake(&mut server, json!({})).await;
        let open = server.recv().await.unwrap();

        assert_eq!(open["method"], "textDocument/didOpen");
        assert_eq!(open["params"]["textDocument"]["uri"], "file:///project/a.ipynb");
        assert_eq!(open["params"]["textDocument"]["text"], "x = 2");
        assert!(server.try_recv().is_none());
    }

    #[tokio::test]
    async fn full_text_change_opens_then_changes_with_increasing_versions() {
        let (connection, mut server) = ready().await;
        let doc = info("a.ipynb.python-r.R", "r");

        connection.send_full_text_change("y <- 1", &doc).unwrap();
        let open = server.recv().await.unwrap();
        let change = server.recv().await.unwrap();
        assert_eq!(open["method"], "textDocument/didOpen");
        assert_eq!(open["params"]["textDocument"]["languageId"], "r");
        assert_eq!(change["params"]["textDocument"]["version"], 1);
        assert_eq!(change["params"]["contentChanges"][0]["text"], "y <- 1");

        connection.send_full_text_change("y <- 2", &doc).unwrap();
        let change = server.recv().await.unwrap();
        assert_eq!(change["method"], "textDocument/didChange");
        assert_eq!(change["params"]["textDocument"]["version"], 2);
        assert_eq!(connection.document_version(&doc), Some(2));
    }

    #[tokio::test]
    async fn selective_change_sends_its_range() {
        let (connection, mut server) = ready().await;
        let doc = info("a.py", "python");
        connection.send_full_text_change("ab", &doc).unwrap();
        server.recv().await.unwrap();
        server.recv().await.unwrap();

        let change = TextDocumentContentChangeEvent {
            range: Some(tower_lsp_server::ls_types::Range::new(
                tower_lsp_server::ls_types::Position::new(0, 1),
                tower_lsp_server::ls_types::Position::new(0, 2),
            )),
            range_length: None,
            text: "c".to_string(),
        };
        connection.send_selective_change(change, &doc, "ac").unwrap();
        let message = server.recv().await.unwrap();
        assert_eq!(message["params"]["contentChanges"][0]["text"], "c");
        assert_eq!(message["params"]["textDocument"]["version"], 2);
    }

    #[tokio::test]
    async fn save_and_close_only_touch_open_documents() {
        let (connection, mut server) = ready().await;
        let doc = info("a.py", "python");

        connection.send_saved(&doc, "x").unwrap();
        connection.send_close(&doc).unwrap();
        assert!(server.try_recv().is_none());

        connection.send_full_text_change("x", &doc).unwrap();
        server.recv().await.unwrap();
        server.recv().await.unwrap();

        connection.send_saved(&doc, "x").unwrap();
        let save = server.recv().await.unwrap();
        assert_eq!(save["method"], "textDocument/didSave");
        assert_eq!(save["params"]["text"], "x");

        connection.send_close(&doc).unwrap();
        assert_eq!(server.recv().await.unwrap()["method"], "textDocument/didClose");
        assert!(!connection.is_open(&doc));
    }

    #[tokio::test]
    async fn send_request_routes_the_response() {
        let (connection, mut server) = ready().await;
        let responder = tokio::spawn(async move {
            let request = server.recv().await.unwrap();
            assert_eq!(request["method"], "textDocument/hover");
            server.respond(&request, json!({"contents": "doc"}));
            server
        });

        let result = connection
            .send_request("textDocument/hover", json!({}))
            .await
            .unwrap();
        assert_eq!(result["contents"], "doc");
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn requests_before_ready_are_rejected() {
        let (connection, _server) = start().await;
        let err = connection
            .send_request("textDocument/hover", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { code: SERVER_NOT_INITIALIZED, .. }));
    }

    #[tokio::test]
    async fn server_requests_get_builtin_answers() {
        let (connection, mut server) = ready().await;

        server.send(json!({
            "jsonrpc": "2.0", "id": 10, "method": "workspace/configuration",
            "params": {"items": [{"section": "a"}, {"section": "b"}]}
        }));
        assert_eq!(server.recv().await.unwrap()["result"], json!([null, null]));

        server.send(json!({
            "jsonrpc": "2.0", "id": 11, "method": "client/registerCapability",
            "params": {"registrations": [{"id": "c1", "method": "textDocument/completion"}]}
        }));
        assert_eq!(server.recv().await.unwrap()["id"], 11);
        assert!(connection.provides("completionProvider"));

        server.send(json!({
            "jsonrpc": "2.0", "id": 12, "method": "client/unregisterCapability",
            "params": {"unregisterations": [{"id": "c1", "method": "textDocument/completion"}]}
        }));
        server.recv().await.unwrap();
        assert!(!connection.provides("completionProvider"));

        server.send(json!({"jsonrpc": "2.0", "id": "x", "method": "custom/unknown"}));
        let response = server.recv().await.unwrap();
        assert_eq!(response["id"], "x");
        assert_eq!(response["error"]["code"], METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn custom_request_handler_replaces_builtin() {
        let (connection, mut server) = ready().await;
        connection.on_request("workspace/configuration", |_| json!([{"lint": true}]));

        server.send(json!({
            "jsonrpc": "2.0", "id": 1, "method": "workspace/configuration",
            "params": {"items": [{}]}
        }));
        assert_eq!(server.recv().await.unwrap()["result"], json!([{"lint": true}]));
    }

    #[tokio::test]
    async fn notifications_reach_subscribers() {
        let (connection, server) = ready().await;
        let mut messages = connection.subscribe("window/showMessage");

        server.send(json!({
            "jsonrpc": "2.0", "method": "window/showMessage",
            "params": {"type": 2, "message": "careful"}
        }));
        assert_eq!(messages.recv().await.unwrap()["message"], "careful");
    }

    #[tokio::test]
    async fn socket_close_fails_pending_requests() {
        let (connection, mut server) = ready().await;
        let closer = tokio::spawn(async move {
            server.recv().await.unwrap();
            server.close(CloseCode::NO_STATUS);
        });

        let err = connection
            .send_request("textDocument/hover", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Protocol { code: -32603, .. }));
        closer.await.unwrap();

        connection.closed().await;
        assert_eq!(connection.close_code(), Some(CloseCode::NO_STATUS));
    }

    #[tokio::test]
    async fn close_sends_shutdown_then_exit() {
        let (connection, mut server) = ready().await;
        let peer = tokio::spawn(async move {
            let shutdown = server.recv().await.unwrap();
            assert_eq!(shutdown["method"], "shutdown");
            server.respond(&shutdown, Value::Null);
            let exit = server.recv().await.unwrap();
            assert_eq!(exit["method"], "exit");
            // Dropped sender ends the stream
            assert!(server.recv().await.is_none());
        });

        connection.close().await;
        assert_eq!(connection.state(), ConnectionState::Closed);
        assert_eq!(connection.close_code(), Some(CloseCode::NORMAL));
        peer.await.unwrap();
    }
}
