//! Which adapters exist and which one belongs to the focused widget.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

use super::SharedAdapter;
use crate::error::LockResultExt;
use crate::lsp::Transport;

/// Adapters of open widgets keyed by widget id, plus the current one.
pub struct WidgetTracker<T: Transport> {
    adapters: Mutex<BTreeMap<String, SharedAdapter<T>>>,
    current: watch::Sender<Option<String>>,
}

impl<T: Transport> Default for WidgetTracker<T> {
    fn default() -> Self {
        Self {
            adapters: Mutex::new(BTreeMap::new()),
            current: watch::Sender::new(None),
        }
    }
}

impl<T: Transport> std::fmt::Debug for WidgetTracker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WidgetTracker")
            .field("widgets", &self.widget_ids())
            .field("current", &self.current_id())
            .finish()
    }
}

impl<T: Transport> WidgetTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, widget_id: &str, adapter: SharedAdapter<T>) {
        self.adapters
            .lock()
            .recover_poison("WidgetTracker::add")
            .insert(widget_id.to_string(), adapter);
    }

    pub fn get(&self, widget_id: &str) -> Option<SharedAdapter<T>> {
        self.adapters
            .lock()
            .recover_poison("WidgetTracker::get")
            .get(widget_id)
            .map(Arc::clone)
    }

    pub fn widget_ids(&self) -> Vec<String> {
        self.adapters
            .lock()
            .recover_poison("WidgetTracker::widget_ids")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.lock().recover_poison("WidgetTracker::len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark `widget_id` as focused. Unknown widgets are ignored.
    pub fn set_current(&self, widget_id: &str) -> bool {
        if self.get(widget_id).is_none() {
            return false;
        }
        self.current.send_if_modified(|current| {
            if current.as_deref() == Some(widget_id) {
                return false;
            }
            *current = Some(widget_id.to_string());
            true
        });
        true
    }

    pub fn current_id(&self) -> Option<String> {
        self.current.borrow().clone()
    }

    pub fn current(&self) -> Option<SharedAdapter<T>> {
        self.current_id().and_then(|id| self.get(&id))
    }

    /// Observe focus changes.
    pub fn watch_current(&self) -> watch::Receiver<Option<String>> {
        self.current.subscribe()
    }

    /// Forget the widget and dispose its adapter.
    pub async fn close(&self, widget_id: &str) -> bool {
        let removed = self
            .adapters
            .lock()
            .recover_poison("WidgetTracker::close")
            .remove(widget_id);
        let Some(adapter) = removed else {
            return false;
        };
        self.current.send_if_modified(|current| {
            if current.as_deref() != Some(widget_id) {
                return false;
            }
            *current = None;
            true
        });
        adapter.lock().await.dispose().await;
        true
    }

    /// Dispose every adapter.
    pub async fn close_all(&self) {
        for widget_id in self.widget_ids() {
            self.close(&widget_id).await;
        }
    }
}
