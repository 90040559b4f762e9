//! Binds one document widget to its virtual documents and servers.
//!
//! A [`WidgetAdapter`] rebuilds the widget's virtual document tree on every
//! content change, asks the [`DocumentConnectionManager`] for a connection
//! per language present in the tree and keeps each server's copy of the
//! documents in sync.
//!
//! Connecting runs in background tasks so a slow server never holds up the
//! adapter. Documents whose server is ready are synced during the rebuild;
//! the others get their latest text once their connect task finishes.

mod state;
mod tracker;
mod widget;

pub use state::AdapterState;
pub use tracker::WidgetTracker;
pub use widget::{DocumentWidget, ServerMessage};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::document::{
    DocumentEvent, DocumentEventReceiver, DocumentInfo, DocumentOptions, EditorId, UpdateLock,
    VirtualDocument, document_events, drain_events, update_documents,
};
use crate::error::{BridgeError, BridgeResult, LockResultExt};
use crate::extractor::ExtractorRegistry;
use crate::lsp::{DocumentConnectionManager, LspConnection, Transport};
use widget::USER_FACING_METHODS;

/// Adapter shared between the tracker and the manager.
pub type SharedAdapter<T> = Arc<tokio::sync::Mutex<WidgetAdapter<T>>>;

struct RootDocument {
    document: VirtualDocument,
    events: DocumentEventReceiver,
}

/// What the adapter and its connect tasks both see. Keyed by document URI.
#[derive(Default)]
struct Links {
    /// Text of every active document as of the last rebuild
    latest: HashMap<String, (DocumentInfo, String)>,
    connections: HashMap<String, (DocumentInfo, Arc<LspConnection>)>,
    /// Documents with a connect task in flight
    pending: HashSet<String>,
    /// A connect failed since the last rebuild
    failed: bool,
    /// Servers whose user-facing notifications are already forwarded
    wired: HashSet<String>,
}

/// Handles a connect task needs once the manager answers.
struct ConnectTask<T: Transport> {
    path: String,
    manager: Arc<DocumentConnectionManager<T>>,
    links: Arc<Mutex<Links>>,
    state: Arc<watch::Sender<AdapterState>>,
    update_lock: Arc<UpdateLock>,
    messages: Option<mpsc::UnboundedSender<ServerMessage>>,
    cancel: CancellationToken,
}

pub struct WidgetAdapter<T: Transport> {
    widget: Arc<dyn DocumentWidget>,
    manager: Arc<DocumentConnectionManager<T>>,
    extractors: Arc<ExtractorRegistry>,
    state: Arc<watch::Sender<AdapterState>>,
    root: Option<RootDocument>,
    update_lock: Arc<UpdateLock>,
    links: Arc<Mutex<Links>>,
    messages: Option<mpsc::UnboundedSender<ServerMessage>>,
    /// Turns late connect results into no-ops after dispose
    cancel: CancellationToken,
}

impl<T: Transport> std::fmt::Debug for WidgetAdapter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let links = self.links.lock().recover_poison("WidgetAdapter::fmt");
        f.debug_struct("WidgetAdapter")
            .field("path", &self.widget.path())
            .field("state", &self.state())
            .field("connections", &links.connections.len())
            .field("pending", &links.pending.len())
            .finish()
    }
}

fn transition(state: &watch::Sender<AdapterState>, path: &str, next: AdapterState) -> bool {
    state.send_if_modified(|current| {
        if current.can_transition_to(next) {
            log::debug!(target: "polylsp::adapter", "{}: {:?} -> {:?}", path, current, next);
            *current = next;
            true
        } else {
            false
        }
    })
}

/// Leave `Connecting` once no connect is in flight.
fn settle(links: &Links, state: &watch::Sender<AdapterState>, path: &str) {
    if !links.pending.is_empty() {
        return;
    }
    let next = if links.failed {
        AdapterState::VirtualDocumentBuilt
    } else {
        AdapterState::Connected
    };
    transition(state, path, next);
}

impl<T: Transport> WidgetAdapter<T> {
    pub fn new(
        widget: Arc<dyn DocumentWidget>,
        manager: Arc<DocumentConnectionManager<T>>,
        extractors: Arc<ExtractorRegistry>,
    ) -> Self {
        Self {
            widget,
            manager,
            extractors,
            state: Arc::new(watch::Sender::new(AdapterState::Uninitialized)),
            root: None,
            update_lock: Arc::new(UpdateLock::new()),
            links: Arc::new(Mutex::new(Links::default())),
            messages: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Create an adapter and make it known to `manager` under the widget's path.
    pub fn attach(
        widget: Arc<dyn DocumentWidget>,
        manager: Arc<DocumentConnectionManager<T>>,
        extractors: Arc<ExtractorRegistry>,
    ) -> SharedAdapter<T> {
        let path = widget.path();
        let adapter = Arc::new(tokio::sync::Mutex::new(Self::new(
            widget,
            Arc::clone(&manager),
            extractors,
        )));
        manager.register_adapter(&path, &adapter);
        adapter
    }

    /// Forward `window/showMessage` and `window/logMessage` of every server
    /// this adapter connects to.
    pub fn with_messages(mut self, messages: mpsc::UnboundedSender<ServerMessage>) -> Self {
        self.messages = Some(messages);
        self
    }

    pub fn state(&self) -> AdapterState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<AdapterState> {
        self.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == AdapterState::Connected
    }

    /// Wait until no connect started by the last update is in flight.
    pub async fn settled(&self) -> AdapterState {
        let mut state = self.state.subscribe();
        state
            .wait_for(|current| *current != AdapterState::Connecting)
            .await
            .map(|current| *current)
            .unwrap_or(AdapterState::Disposed)
    }

    pub fn widget(&self) -> &Arc<dyn DocumentWidget> {
        &self.widget
    }

    pub fn root(&self) -> Option<&VirtualDocument> {
        self.root.as_ref().map(|root| &root.document)
    }

    pub fn update_lock(&self) -> &Arc<UpdateLock> {
        &self.update_lock
    }

    /// Editors composing the document as of the last rebuild.
    pub fn editors(&self) -> Vec<EditorId> {
        let mut editors: Vec<EditorId> = self
            .root()
            .map(|root| root.editors().cloned().collect())
            .unwrap_or_default();
        editors.sort();
        editors
    }

    /// Connection serving the document at `uri`.
    pub fn connection(&self, uri: &str) -> Option<Arc<LspConnection>> {
        self.links
            .lock()
            .recover_poison("WidgetAdapter::connection")
            .connections
            .get(uri)
            .map(|(_, connection)| Arc::clone(connection))
    }

    /// Documents still waiting for their server.
    pub fn pending_documents(&self) -> Vec<String> {
        let mut pending: Vec<String> = self
            .links
            .lock()
            .recover_poison("WidgetAdapter::pending_documents")
            .pending
            .iter()
            .cloned()
            .collect();
        pending.sort();
        pending
    }

    fn transition(&self, next: AdapterState) -> bool {
        transition(&self.state, &self.widget.path(), next)
    }

    /// Rebuild the document tree from the widget and sync it to servers.
    ///
    /// Documents with a live connection get their text right away. The
    /// others are connected in the background and synced when their server
    /// is ready; the adapter stays `Connecting` meanwhile. Languages without
    /// a server are skipped. Any other connect failure leaves the adapter in
    /// `VirtualDocumentBuilt`; the next call retries.
    pub async fn update_documents(&mut self) -> AdapterState {
        if self.state() == AdapterState::Disposed {
            return AdapterState::Disposed;
        }

        let update_lock = Arc::clone(&self.update_lock);
        let _guard = update_lock.acquire().await;

        self.rebuild().await;
        let closed = self.drain_document_events();
        {
            let mut links = self.links.lock().recover_poison("WidgetAdapter::update_documents");
            for info in &closed {
                links.connections.remove(&info.uri);
            }
        }
        for info in closed {
            self.manager.unregister_document(&info).await;
        }

        let Some(root) = self.root() else {
            return self.state();
        };
        let documents: Vec<(DocumentInfo, String)> = root
            .active_documents()
            .into_iter()
            .map(|document| (document.info(), document.value()))
            .collect();

        let path = self.widget.path();
        let to_connect = {
            let mut links = self.links.lock().recover_poison("WidgetAdapter::update_documents");
            links.latest = documents
                .iter()
                .map(|(info, text)| (info.uri.clone(), (info.clone(), text.clone())))
                .collect();
            links.failed = false;

            let mut to_connect = Vec::new();
            for (info, text) in &documents {
                if links.pending.contains(&info.uri) {
                    continue;
                }
                let live = links
                    .connections
                    .get(&info.uri)
                    .map(|(_, connection)| Arc::clone(connection))
                    .filter(|connection| !connection.state().is_terminal());
                let Some(connection) = live else {
                    links.connections.remove(&info.uri);
                    links.pending.insert(info.uri.clone());
                    to_connect.push(info.clone());
                    continue;
                };
                if let Err(e) = connection.send_full_text_change(text, info) {
                    log::warn!(
                        target: "polylsp::adapter",
                        "Failed to sync {} to {}: {}",
                        info.uri,
                        connection.server_id(),
                        e
                    );
                    links.connections.remove(&info.uri);
                    links.failed = true;
                }
            }

            if self.state() == AdapterState::VirtualDocumentBuilt {
                transition(&self.state, &path, AdapterState::Connecting);
            }
            to_connect
        };

        for info in to_connect {
            let task = self.connect_task();
            tokio::spawn(task.run(info));
        }

        settle(
            &self.links.lock().recover_poison("WidgetAdapter::update_documents"),
            &self.state,
            &path,
        );
        self.state()
    }

    fn connect_task(&self) -> ConnectTask<T> {
        ConnectTask {
            path: self.widget.path(),
            manager: Arc::clone(&self.manager),
            links: Arc::clone(&self.links),
            state: Arc::clone(&self.state),
            update_lock: Arc::clone(&self.update_lock),
            messages: self.messages.clone(),
            cancel: self.cancel.clone(),
        }
    }

    /// Build the root on first use, then rebuild it from the widget.
    async fn rebuild(&mut self) {
        let path = self.widget.path();
        if let Some(root) = &self.root
            && root.document.path() != path
        {
            let old_path = root.document.path().to_string();
            log::info!(target: "polylsp::adapter", "{} renamed to {}", old_path, path);
            self.release_documents().await;
            self.root = None;
            self.manager.rename_adapter(&old_path, &path);
        }

        let blocks = self.widget.code_blocks();
        let root = self.root.get_or_insert_with(|| {
            let (sender, events) = document_events();
            let document = VirtualDocument::new(
                DocumentOptions {
                    language: self.widget.language(),
                    path: path.clone(),
                    file_extension: self.widget.file_extension(),
                    registry: Arc::clone(&self.extractors),
                },
                sender,
            );
            RootDocument { document, events }
        });

        update_documents(&mut root.document, &blocks);
        if self.state() == AdapterState::Uninitialized {
            self.transition(AdapterState::VirtualDocumentBuilt);
        }
    }

    /// Documents closed by the last rebuild.
    fn drain_document_events(&mut self) -> Vec<DocumentInfo> {
        let Some(root) = self.root.as_mut() else {
            return Vec::new();
        };
        drain_events(&mut root.events)
            .into_iter()
            .filter_map(|event| match event {
                DocumentEvent::ForeignOpened(info) => {
                    log::debug!(target: "polylsp::adapter", "Opened {}", info.uri);
                    None
                }
                DocumentEvent::ForeignClosed(info) => Some(info),
            })
            .collect()
    }

    /// Tell servers the widget was saved.
    ///
    /// Sends `didSave` for the root and every open foreign document. An
    /// adapter that is not connected retries connecting instead.
    pub async fn on_saved(&mut self) -> AdapterState {
        match self.state() {
            AdapterState::Disposed => return AdapterState::Disposed,
            AdapterState::Connected => {}
            _ => return self.update_documents().await,
        }

        let Some(root) = self.root() else {
            return self.state();
        };
        let links = self.links.lock().recover_poison("WidgetAdapter::on_saved");
        for document in root.active_documents() {
            let info = document.info();
            let Some((_, connection)) = links.connections.get(&info.uri) else {
                continue;
            };
            if let Err(e) = connection.send_saved(&info, &document.value()) {
                log::warn!(target: "polylsp::adapter", "didSave for {} failed: {}", info.uri, e);
            }
        }
        drop(links);
        self.state()
    }

    /// Close every foreign document and unregister all documents from the
    /// manager. The adapter can connect again on the next update.
    pub async fn disconnect(&mut self) {
        self.release_documents().await;
        if matches!(
            self.state(),
            AdapterState::Connecting | AdapterState::Connected
        ) {
            self.transition(AdapterState::VirtualDocumentBuilt);
        }
    }

    /// Connect tasks still in flight release their document when they finish.
    async fn release_documents(&mut self) {
        let mut released: Vec<DocumentInfo> = Vec::new();
        if let Some(root) = self.root.as_mut() {
            root.document.dispose();
            released.extend(drain_events(&mut root.events).into_iter().filter_map(
                |event| match event {
                    DocumentEvent::ForeignClosed(info) => Some(info),
                    DocumentEvent::ForeignOpened(_) => None,
                },
            ));
        }
        {
            let mut links = self.links.lock().recover_poison("WidgetAdapter::release_documents");
            links.latest.clear();
            released.extend(links.connections.drain().map(|(_, (info, _))| info));
        }

        let mut seen = HashSet::new();
        for info in released {
            if seen.insert(info.uri.clone()) {
                self.manager.unregister_document(&info).await;
            }
        }
    }

    /// Disconnect and drop the document tree for good.
    pub async fn dispose(&mut self) {
        if self.state() == AdapterState::Disposed {
            return;
        }
        self.cancel.cancel();
        self.disconnect().await;
        if let Some(root) = self.root.take() {
            self.manager.unregister_adapter(root.document.path());
        } else {
            self.manager.unregister_adapter(&self.widget.path());
        }
        self.transition(AdapterState::Disposed);
    }
}

impl<T: Transport> ConnectTask<T> {
    /// Connect `info`, then push the text it has by now.
    ///
    /// A document that left the tree in the meantime, or an adapter that was
    /// disposed, only releases the registration the connect made.
    async fn run(self, info: DocumentInfo) {
        let result = self.manager.connect(&info).await;

        let release = {
            let _guard = self.update_lock.acquire().await;
            let mut links = self.links.lock().recover_poison("WidgetAdapter::connect");
            links.pending.remove(&info.uri);
            let release = self.apply(&mut links, &info, result);
            if !self.cancel.is_cancelled() {
                settle(&links, &self.state, &self.path);
            }
            release
        };

        if release {
            self.manager.unregister_document(&info).await;
        }
    }

    /// Record a connect result. True when the new registration is unwanted.
    fn apply(
        &self,
        links: &mut Links,
        info: &DocumentInfo,
        result: BridgeResult<Arc<LspConnection>>,
    ) -> bool {
        let connection = match result {
            Ok(connection) => connection,
            Err(BridgeError::UnsupportedLanguage { language }) => {
                log::debug!(target: "polylsp::adapter", "No server for {} in {}", language, info.uri);
                return false;
            }
            Err(e) => {
                if !self.cancel.is_cancelled() {
                    log::warn!(target: "polylsp::adapter", "Cannot connect {}: {}", info.uri, e);
                    links.failed = true;
                }
                return false;
            }
        };

        if self.cancel.is_cancelled() {
            return true;
        }
        let Some((latest_info, text)) = links.latest.get(&info.uri).cloned() else {
            log::debug!(target: "polylsp::adapter", "{} left the document before its server was ready", info.uri);
            return true;
        };

        self.wire(links, &connection);
        if let Err(e) = connection.send_full_text_change(&text, &latest_info) {
            log::warn!(
                target: "polylsp::adapter",
                "Failed to sync {} to {}: {}",
                info.uri,
                connection.server_id(),
                e
            );
            links.failed = true;
            return false;
        }
        links.connections.insert(info.uri.clone(), (latest_info, connection));
        false
    }

    /// Forward user-facing notifications of a newly seen server.
    fn wire(&self, links: &mut Links, connection: &Arc<LspConnection>) {
        let Some(messages) = &self.messages else {
            return;
        };
        if !links.wired.insert(connection.server_id().to_string()) {
            return;
        }
        for method in USER_FACING_METHODS {
            let mut notifications = connection.subscribe(method);
            let messages = messages.clone();
            let server_id = connection.server_id().to_string();
            tokio::spawn(async move {
                while let Some(params) = notifications.recv().await {
                    let message = ServerMessage {
                        server_id: server_id.clone(),
                        method: method.to_string(),
                        params,
                    };
                    if messages.send(message).is_err() {
                        break;
                    }
                }
            });
        }
    }
}
