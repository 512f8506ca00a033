use std::sync::{Arc, Weak};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Single-producer / single-consumer hand-off from an engine thread to the
/// owning task.
///
/// The relay holds the only strong reference to its sender. Engine callbacks
/// get a [`Producer`] (a weak reference), so once [`Relay::finish`] drops the
/// sender no callback can push into it again.
pub struct Relay<T> {
    tx: Arc<mpsc::UnboundedSender<T>>,
    pump: JoinHandle<usize>,
}

impl<T: Send + 'static> Relay<T> {
    /// Start a relay whose pump forwards every item into `outlet`.
    ///
    /// Must be called from within a Tokio runtime (worker threads spawned by
    /// `spawn_blocking` qualify).
    pub fn spawn<M>(outlet: mpsc::UnboundedSender<M>) -> Self
    where
        M: From<T> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let pump = tokio::spawn(async move {
            let mut forwarded = 0usize;
            while let Some(item) = rx.recv().await {
                if outlet.send(M::from(item)).is_err() {
                    // Owning task is gone; nothing left to deliver to.
                    break;
                }
                forwarded += 1;
            }
            forwarded
        });
        Self { tx: Arc::new(tx), pump }
    }

    pub fn producer(&self) -> Producer<T> {
        Producer(Arc::downgrade(&self.tx))
    }

    /// Tear the relay down. Blocks until every item sent before this call has
    /// been forwarded; nothing sent afterwards is delivered.
    ///
    /// Call from a blocking context (a worker thread), never from async code.
    pub fn finish(self) {
        let Relay { tx, pump } = self;
        drop(tx);
        match Handle::try_current() {
            Ok(handle) => match handle.block_on(pump) {
                Ok(forwarded) => debug!(forwarded, "relay drained"),
                Err(e) => warn!("relay pump failed: {e}"),
            },
            Err(_) => {
                // No runtime left to drive the pump: it dies with it.
                pump.abort();
            }
        }
    }
}

/// Weak sending side of a [`Relay`], safe to hand to engine callbacks.
pub struct Producer<T>(Weak<mpsc::UnboundedSender<T>>);

impl<T> Producer<T> {
    /// Forward one item. Returns false once the relay has been finished.
    pub fn send(&self, item: T) -> bool {
        match self.0.upgrade() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        Producer(Weak::clone(&self.0))
    }
}
