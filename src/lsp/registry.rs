//! Connections shared by every document tree of the process.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use super::LspConnection;

#[derive(Debug)]
struct RegistryEntry {
    connection: Arc<LspConnection>,
    /// Server URIs of the documents using the connection
    documents: HashSet<String>,
}

/// One live connection per server identity, reference counted by document.
///
/// Documents of the same language in different widgets share a server
/// through this registry. Only [`DocumentConnectionManager`] mutates it.
///
/// [`DocumentConnectionManager`]: super::DocumentConnectionManager
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: DashMap<String, RegistryEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, server_id: &str) -> Option<Arc<LspConnection>> {
        self.entries
            .get(server_id)
            .map(|entry| Arc::clone(&entry.connection))
    }

    /// Cache `connection` for `server_id`, replacing a previous one.
    pub(crate) fn insert(&self, server_id: &str, connection: Arc<LspConnection>) {
        self.entries.insert(
            server_id.to_string(),
            RegistryEntry {
                connection,
                documents: HashSet::new(),
            },
        );
    }

    /// Record that `document` uses the connection of `server_id`.
    ///
    /// Returns the number of documents referencing it afterwards.
    pub(crate) fn retain_document(&self, server_id: &str, document: &str) -> usize {
        match self.entries.get_mut(server_id) {
            Some(mut entry) => {
                entry.documents.insert(document.to_string());
                entry.documents.len()
            }
            None => 0,
        }
    }

    /// Drop the reference of `document`.
    ///
    /// When it was the last one the connection is evicted and returned so
    /// the caller can close it.
    pub(crate) fn release_document(
        &self,
        server_id: &str,
        document: &str,
    ) -> Option<Arc<LspConnection>> {
        self.entries
            .remove_if_mut(server_id, |_, entry| {
                entry.documents.remove(document) && entry.documents.is_empty()
            })
            .map(|(_, entry)| entry.connection)
    }

    /// Evict the entry of `server_id` if it still caches `connection`.
    pub(crate) fn evict(&self, server_id: &str, connection: &Arc<LspConnection>) -> bool {
        self.entries
            .remove_if(server_id, |_, entry| {
                Arc::ptr_eq(&entry.connection, connection)
            })
            .is_some()
    }

    pub fn reference_count(&self, server_id: &str) -> usize {
        self.entries
            .get(server_id)
            .map_or(0, |entry| entry.documents.len())
    }

    pub fn server_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::lsp::transport::{MemoryTransport, Transport};
    use serde_json::json;

    async fn connection() -> Arc<LspConnection> {
        let (transport, _incoming) = MemoryTransport::new();
        // The server end is dropped; the connection never becomes ready
        let socket = transport
            .connect("pylsp", &ServerConfig::default())
            .await
            .unwrap();
        LspConnection::start("pylsp", "file:///", socket, json!({}), None)
    }

    #[tokio::test]
    async fn last_release_evicts_and_returns_connection() {
        let registry = ConnectionRegistry::new();
        let conn = connection().await;
        registry.insert("pylsp", Arc::clone(&conn));

        assert_eq!(registry.retain_document("pylsp", "file:///a"), 1);
        assert_eq!(registry.retain_document("pylsp", "file:///b"), 2);
        assert_eq!(registry.retain_document("pylsp", "file:///b"), 2);

        assert!(registry.release_document("pylsp", "file:///a").is_none());
        assert!(registry.get("pylsp").is_some());

        let released = registry.release_document("pylsp", "file:///b").unwrap();
        assert!(Arc::ptr_eq(&released, &conn));
        assert!(registry.get("pylsp").is_none());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn releasing_unknown_documents_keeps_the_entry() {
        let registry = ConnectionRegistry::new();
        registry.insert("pylsp", connection().await);

        assert!(registry.release_document("pylsp", "file:///never").is_none());
        assert_eq!(registry.server_ids(), vec!["pylsp"]);
        assert_eq!(registry.retain_document("other", "file:///a"), 0);
    }

    #[tokio::test]
    async fn evict_only_removes_the_same_instance() {
        let registry = ConnectionRegistry::new();
        let old = connection().await;
        let new = connection().await;
        registry.insert("pylsp", Arc::clone(&new));

        assert!(!registry.evict("pylsp", &old));
        assert!(registry.evict("pylsp", &new));
        assert_eq!(registry.reference_count("pylsp"), 0);
    }
}
