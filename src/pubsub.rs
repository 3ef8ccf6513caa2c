//! In-process event fabric: the buffer shim over raw engine subscriptions
//! and the fan-out broker behind the block notifier.
//!
//! The engine's buffered subscribe path may silently drop events and
//! force-unsubscribe slow consumers, while its unbuffered path can freeze
//! the engine outright. [`BufferedSubscription`] converts bounded-unsafe to
//! unbounded-safe: a pump task reads the engine channel without conditional
//! delay and appends to an in-memory FIFO, so consumer slowness costs
//! memory instead of engine liveness.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::{EngineEvent, EngineSubscription};

/// Unbounded wrapper around a raw engine subscription.
pub struct BufferedSubscription {
    out: mpsc::UnboundedReceiver<EngineEvent>,
    cancelled: watch::Receiver<bool>,
    pump: JoinHandle<()>,
}

impl BufferedSubscription {
    pub fn new(subscription: EngineSubscription) -> Self {
        let EngineSubscription {
            mut out,
            mut cancelled,
        } = subscription;
        let (tx, rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        // The pump must never wait on anything but the upstream channel;
        // draining continues through cancellation until the engine drops its
        // sender, so buffered events are delivered before the outbound
        // channel closes.
        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = out.recv() => match event {
                        Some(event) => {
                            if tx.send(event).is_err() {
                                // Consumer dropped its receiver.
                                break;
                            }
                        }
                        None => break,
                    },
                    changed = cancelled.changed() => {
                        if changed.is_err() || *cancelled.borrow() {
                            // Upstream cancelled: drain whatever is left.
                            while let Ok(event) = out.try_recv() {
                                if tx.send(event).is_err() {
                                    break;
                                }
                            }
                            break;
                        }
                    }
                }
            }
            let _ = cancel_tx.send(true);
        });

        Self {
            out: rx,
            cancelled: cancel_rx,
            pump,
        }
    }

    /// Receive the next buffered event, in engine-emission order. `None`
    /// means the subscription was cancelled and the FIFO has been drained.
    pub async fn recv(&mut self) -> Option<EngineEvent> {
        self.out.recv().await
    }

    /// Completes once the underlying subscription has been cancelled.
    /// Buffered events may still be pending in [`recv`] at that point.
    pub async fn cancelled(&mut self) {
        let _ = self.cancelled.wait_for(|cancelled| *cancelled).await;
    }
}

impl Drop for BufferedSubscription {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

struct BrokerInner<T> {
    watchers: Mutex<HashMap<u64, mpsc::UnboundedSender<T>>>,
    next_watcher: AtomicU64,
}

/// Single-producer fan-out broker. Each broadcast is delivered to every
/// watcher live at that moment; late attachers only observe later items.
pub struct Broker<T> {
    inner: Arc<BrokerInner<T>>,
}

impl<T> Clone for Broker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Broker<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                watchers: Mutex::new(HashMap::new()),
                next_watcher: AtomicU64::new(0),
            }),
        }
    }

    pub fn subscribe(&self) -> BrokerSubscription<T> {
        let id = self.inner.next_watcher.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.watchers.lock().insert(id, tx);
        BrokerSubscription {
            id,
            receiver: rx,
            inner: self.inner.clone(),
        }
    }

    pub fn broadcast(&self, item: T) {
        let mut watchers = self.inner.watchers.lock();
        watchers.retain(|id, tx| {
            if tx.send(item.clone()).is_ok() {
                true
            } else {
                debug!(watcher = id, "dropping detached broker watcher");
                false
            }
        });
    }

    pub fn watcher_count(&self) -> usize {
        self.inner.watchers.lock().len()
    }
}

impl<T: Clone + Send + 'static> Default for Broker<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A live broker watcher; dropping it detaches from the broker.
pub struct BrokerSubscription<T> {
    id: u64,
    receiver: mpsc::UnboundedReceiver<T>,
    inner: Arc<BrokerInner<T>>,
}

impl<T> BrokerSubscription<T> {
    /// Next broadcast item, in broadcast order. `None` once every broker
    /// handle has been dropped.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }
}

impl<T> Drop for BrokerSubscription<T> {
    fn drop(&mut self) {
        self.inner.watchers.lock().remove(&self.id);
    }
}
