use std::fmt::Debug;

use tokio::sync::mpsc::UnboundedReceiver;

/// A live view of a document or collection.
///
/// Snapshots are buffered in delivery order. The subscription is released
/// from the store when this is dropped.
pub struct Subscription<T> {
    receiver: UnboundedReceiver<T>,
    on_drop: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl<T> Subscription<T> {
    pub fn new<F>(receiver: UnboundedReceiver<T>, on_drop: F) -> Self
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        Self {
            receiver,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// Waits for the next snapshot. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Returns a snapshot if one is already buffered
    pub fn try_next(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }
}

impl<T> Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(on_drop) = self.on_drop.take() {
            on_drop()
        }
    }
}
