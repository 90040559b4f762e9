use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::error::LockResultExt;

/// Versions and open state of the documents synced over one connection.
///
/// Keys are server URIs. A document is open between its `didOpen` and its
/// `didClose`; versions only ever grow while it is.
#[derive(Debug, Default)]
pub(crate) struct DocumentTracker {
    inner: Mutex<TrackerState>,
}

#[derive(Debug, Default)]
struct TrackerState {
    versions: HashMap<String, i32>,
    opened: HashSet<String>,
}

impl DocumentTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Mark `uri` open. Returns its version, or `None` if it already was open.
    pub(crate) fn open(&self, uri: &str) -> Option<i32> {
        let mut state = self.inner.lock().recover_poison("DocumentTracker::open");
        if !state.opened.insert(uri.to_string()) {
            return None;
        }
        Some(*state.versions.entry(uri.to_string()).or_insert(0))
    }

    pub(crate) fn is_opened(&self, uri: &str) -> bool {
        self.inner
            .lock()
            .recover_poison("DocumentTracker::is_opened")
            .opened
            .contains(uri)
    }

    /// Bump and return the version of `uri`.
    pub(crate) fn next_version(&self, uri: &str) -> i32 {
        let mut state = self
            .inner
            .lock()
            .recover_poison("DocumentTracker::next_version");
        let version = state.versions.entry(uri.to_string()).or_insert(0);
        *version += 1;
        *version
    }

    pub(crate) fn version(&self, uri: &str) -> Option<i32> {
        self.inner
            .lock()
            .recover_poison("DocumentTracker::version")
            .versions
            .get(uri)
            .copied()
    }

    /// Mark `uri` closed. Returns whether it was open.
    pub(crate) fn close(&self, uri: &str) -> bool {
        let mut state = self.inner.lock().recover_poison("DocumentTracker::close");
        state.versions.remove(uri);
        state.opened.remove(uri)
    }

    pub(crate) fn opened_count(&self) -> usize {
        self.inner
            .lock()
            .recover_poison("DocumentTracker::opened_count")
            .opened
            .len()
    }

    pub(crate) fn clear(&self) {
        let mut state = self.inner.lock().recover_poison("DocumentTracker::clear");
        state.versions.clear();
        state.opened.clear();
    }
}
