use std::sync::{Arc, PoisonError, RwLock};

use postbox_common::CapturedMessage;

/// In-memory store of captured messages, in delivery order.
///
/// Sessions append to it while tests read snapshots. Recovers if the lock is
/// poisoned by accessing the underlying data.
#[derive(Debug, Clone, Default)]
pub struct CaptureStore {
    messages: Arc<RwLock<Vec<CapturedMessage>>>,
}

impl CaptureStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, message: CapturedMessage) {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
    }

    /// A copy of every message received so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<CapturedMessage> {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
