//! Archive change stamp
//!
//! Workers compare the stamp they last downloaded against the current one to
//! decide whether to fetch the archive again.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared, observable modification stamp of the distribution archive.
///
/// `None` until the archive has been built or inspected once.
#[derive(Debug, Clone)]
pub struct ChangeStamp {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl ChangeStamp {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Record a new stamp, notifying subscribers only if it changed
    pub fn publish(&self, stamp: impl Into<String>) -> bool {
        let stamp = stamp.into();
        self.tx.send_if_modified(|current| {
            if current.as_deref() == Some(stamp.as_str()) {
                false
            } else {
                *current = Some(stamp);
                true
            }
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }

    /// Whether a client holding `seen` should fetch the archive again
    pub fn is_stale(&self, seen: &str) -> bool {
        self.tx.borrow().as_deref() != Some(seen)
    }
}

impl Default for ChangeStamp {
    fn default() -> Self {
        Self::new()
    }
}
