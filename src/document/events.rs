use tokio::sync::mpsc;

/// What a consumer needs to address one virtual document on a server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentInfo {
    /// URI relative to the workspace root
    pub uri: String,
    pub language: String,
    pub id_path: String,
}

/// Changes in the set of foreign documents of a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentEvent {
    ForeignOpened(DocumentInfo),
    ForeignClosed(DocumentInfo),
}

pub type DocumentEventSender = mpsc::UnboundedSender<DocumentEvent>;
pub type DocumentEventReceiver = mpsc::UnboundedReceiver<DocumentEvent>;

/// Channel shared by every document of one tree.
pub fn document_events() -> (DocumentEventSender, DocumentEventReceiver) {
    mpsc::unbounded_channel()
}

/// Drain everything currently queued without waiting.
pub fn drain_events(receiver: &mut DocumentEventReceiver) -> Vec<DocumentEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
