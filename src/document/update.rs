//! The rebuild cycle and the lock serializing it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::{CodeBlock, VirtualDocument};
use crate::position::Position;

/// Wait between two attempts to take the update lock.
pub const UPDATE_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Attempts before a rebuild proceeds without the lock.
pub const UPDATE_LOCK_MAX_POLLS: u32 = 10;

/// Rebuild `root` from `blocks`.
///
/// Clears the whole tree, appends every block in order, then closes foreign
/// documents that went unused for too long. Callers hold the tree's
/// [`UpdateLock`] so two rebuilds never interleave.
pub fn update_documents(root: &mut VirtualDocument, blocks: &[CodeBlock]) {
    root.clear();
    for block in blocks {
        root.append_code_block(block, Position::zero(), None);
    }
    root.close_expired_documents();
}

/// Polling lock around rebuilds of one document tree.
///
/// Acquisition polls instead of queuing. A caller that cannot get the lock
/// within [`UPDATE_LOCK_MAX_POLLS`] attempts logs a warning and proceeds
/// anyway rather than stalling the editor.
#[derive(Debug, Default)]
pub struct UpdateLock {
    busy: AtomicBool,
}

/// Releases the [`UpdateLock`] on drop if it was actually taken.
#[derive(Debug)]
pub struct UpdateGuard<'a> {
    lock: &'a UpdateLock,
    owned: bool,
}

impl UpdateGuard<'_> {
    /// False when the caller proceeded after giving up on the lock.
    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        if self.owned {
            self.lock.busy.store(false, Ordering::Release);
        }
    }
}

impl UpdateLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn try_acquire(&self) -> Option<UpdateGuard<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| UpdateGuard {
                lock: self,
                owned: true,
            })
    }

    /// Take the lock, polling every [`UPDATE_LOCK_POLL_INTERVAL`].
    pub async fn acquire(&self) -> UpdateGuard<'_> {
        for _ in 0..UPDATE_LOCK_MAX_POLLS {
            if let Some(guard) = self.try_acquire() {
                return guard;
            }
            tokio::time::sleep(UPDATE_LOCK_POLL_INTERVAL).await;
        }
        if let Some(guard) = self.try_acquire() {
            return guard;
        }

        log::warn!(
            target: "polylsp::update_lock",
            "Update lock still busy after {} polls; rebuilding anyway",
            UPDATE_LOCK_MAX_POLLS
        );
        UpdateGuard {
            lock: self,
            owned: false,
        }
    }

    /// Run `update` while holding the lock.
    pub async fn with_update_lock<R>(&self, update: impl FnOnce() -> R) -> R {
        let _guard = self.acquire().await;
        update()
    }
}
