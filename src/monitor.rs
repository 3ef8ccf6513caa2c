//! Failure monitor distinguishing orderly engine shutdown from collapse.
//!
//! The engine can panic during replay before any public handle exists, and
//! its consensus state machine can die long after start. The monitor
//! observes the consensus termination channel in the background and reports
//! a crash unless a clean shutdown was announced first.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub struct FailureMonitor {
    clean_shutdown: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl FailureMonitor {
    /// Spawn the monitor over the engine's consensus termination channel.
    pub fn new(mut terminated: watch::Receiver<bool>) -> Self {
        let clean_shutdown = Arc::new(AtomicBool::new(false));
        let marker = clean_shutdown.clone();
        let task = tokio::spawn(async move {
            // Either the channel flips to terminated or its sender is
            // dropped; both mean the consensus state machine is gone.
            let _ = terminated.wait_for(|done| *done).await;
            if marker.load(Ordering::SeqCst) {
                debug!("consensus engine terminated cleanly");
            } else {
                error!("consensus engine terminated unexpectedly");
            }
        });
        Self {
            clean_shutdown,
            task,
        }
    }

    /// Announce an orderly stop, suppressing the crash diagnosis.
    ///
    /// There is a narrow window between the engine-stop call and node
    /// termination during which a real crash would be mistaken for a clean
    /// exit; callers mark immediately before initiating the stop.
    pub fn mark_clean_shutdown(&self) {
        self.clean_shutdown.store(true, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn is_clean(&self) -> bool {
        self.clean_shutdown.load(Ordering::SeqCst)
    }
}

impl Drop for FailureMonitor {
    fn drop(&mut self) {
        self.task.abort();
    }
}
