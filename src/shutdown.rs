//! Graceful shutdown coordination.
//!
//! Background tasks subscribe to a broadcast signal and run their own
//! teardown (the stats flusher uses it for a final best-effort flush)
//! instead of being cancelled mid-cycle; the coordinator then waits for
//! them with a bounded timeout.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Tracks background tasks and fans out the shutdown signal.
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    tasks: JoinSet<()>,
}

impl ShutdownCoordinator {
    /// Creates a new coordinator.
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            shutdown_tx,
            tasks: JoinSet::new(),
        }
    }

    /// Gets a shutdown signal receiver for a task to watch.
    #[must_use]
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            receiver: self.shutdown_tx.subscribe(),
        }
    }

    /// Spawns a tracked background task. The future is responsible for
    /// observing its own [`ShutdownSignal`] and returning.
    pub fn spawn<F>(&mut self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(async move {
            future.await;
            debug!(task = name, "background task finished");
        });
    }

    /// Signals shutdown and waits for tracked tasks, aborting whatever is
    /// still running once `timeout` elapses.
    pub async fn shutdown(mut self, timeout: Duration) {
        info!("initiating graceful shutdown");
        let _ = self.shutdown_tx.send(());

        let drained = tokio::time::timeout(timeout, async {
            while let Some(result) = self.tasks.join_next().await {
                if let Err(err) = result {
                    warn!(error = %err, "task failed during shutdown");
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!("shutdown timeout reached, aborting remaining tasks");
            self.tasks.abort_all();
        }
        info!("shutdown complete");
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver half of the shutdown broadcast.
pub struct ShutdownSignal {
    receiver: broadcast::Receiver<()>,
}

impl ShutdownSignal {
    /// Waits for the shutdown signal.
    pub async fn recv(&mut self) {
        let _ = self.receiver.recv().await;
    }
}

/// Waits for SIGTERM or SIGINT.
pub async fn wait_for_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, initiating shutdown"),
        () = terminate => info!("received SIGTERM, initiating shutdown"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_task_observes_signal_and_finishes() {
        let mut coordinator = ShutdownCoordinator::new();
        let mut signal = coordinator.subscribe();
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        coordinator.spawn("test-task", async move {
            signal.recv().await;
            flag.store(true, Ordering::SeqCst);
        });

        coordinator.shutdown(Duration::from_secs(1)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stuck_task_is_aborted_after_timeout() {
        let mut coordinator = ShutdownCoordinator::new();
        coordinator.spawn("stuck-task", std::future::pending());
        coordinator.shutdown(Duration::from_millis(50)).await;
    }
}
