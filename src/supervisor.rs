use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// Lightweight task supervisor tracking the host's background workers and
/// providing the drain used by shutdown and cleanup.
#[derive(Clone, Default)]
pub struct Supervisor {
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a supervised worker. The future's error, if any, is logged and
    /// does not propagate.
    pub fn spawn<Fut>(&self, name: &'static str, future: Fut)
    where
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            if let Err(err) = future.await {
                tracing::warn!(%name, ?err, "supervised worker terminated with error");
            }
        });
        self.tasks.lock().push(handle);
    }

    /// Wait for every supervised worker to finish. Idempotent.
    pub async fn shutdown(&self) {
        let handles = {
            let mut tasks = self.tasks.lock();
            tasks.drain(..).collect::<Vec<_>>()
        };
        for handle in handles {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    tracing::warn!(?err, "supervised worker aborted");
                }
            }
        }
    }

    pub fn task_count(&self) -> usize {
        self.tasks.lock().len()
    }
}
