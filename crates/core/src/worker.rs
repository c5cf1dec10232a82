//! Background loop lifecycle: a running flag, a shutdown signal that cuts the
//! inter-tick sleep short, and a join on stop.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

/// Handed to a loop body so it can observe stop requests.
pub struct StopSignal {
    running: Arc<AtomicBool>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl StopSignal {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Sleep for `interval`. Returns `false` if a stop was requested before or
    /// during the sleep.
    pub async fn sleep(&mut self, interval: Duration) -> bool {
        if !self.is_running() {
            return false;
        }
        tokio::select! {
            _ = self.shutdown_rx.recv() => false,
            _ = tokio::time::sleep(interval) => self.is_running(),
        }
    }

    /// Resolves once a stop has been requested. Cancel safe.
    pub async fn stopped(&mut self) {
        if !self.is_running() {
            return;
        }
        // Err means the handle is gone, which is a stop as well
        let _ = self.shutdown_rx.recv().await;
    }
}

/// Owns one spawned loop. `stop` is idempotent and only returns once the
/// loop task has exited.
pub struct LoopHandle {
    name: String,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl LoopHandle {
    /// Spawn `body` on the runtime.
    pub fn spawn<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(StopSignal) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let running = Arc::new(AtomicBool::new(true));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let signal = StopSignal {
            running: Arc::clone(&running),
            shutdown_rx,
        };
        let join = tokio::spawn(body(signal));
        debug!(loop_name = %name, "Spawned loop");

        Self {
            name,
            running,
            shutdown_tx,
            join: Mutex::new(Some(join)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether stop has not been requested yet. The task may still have exited
    /// on its own; see [`LoopHandle::is_finished`].
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Whether the loop task has exited (or has already been joined).
    pub async fn is_finished(&self) -> bool {
        match self.join.lock().await.as_ref() {
            Some(handle) => handle.is_finished(),
            None => true,
        }
    }

    /// Request a stop and wait for the loop to exit. Concurrent callers all
    /// wait for the same join.
    pub async fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }

        let mut join = self.join.lock().await;
        if let Some(handle) = join.take() {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(loop_name = %self.name, "Loop panicked: {}", e);
                }
            }
            debug!(loop_name = %self.name, "Loop joined");
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        // Dropping without stop still lets the task wind down at its next check
        if self.running.swap(false, Ordering::SeqCst) {
            let _ = self.shutdown_tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_stop_interrupts_sleep_and_joins() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);

        let handle = LoopHandle::spawn("ticker", move |mut signal| async move {
            loop {
                counter.fetch_add(1, Ordering::SeqCst);
                if !signal.sleep(Duration::from_secs(3600)).await {
                    break;
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop().await;

        assert_eq!(handle.name(), "ticker");
        assert!(!handle.is_running());
        assert!(handle.is_finished().await);
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let handle = LoopHandle::spawn("idle", |mut signal| async move {
            signal.stopped().await;
        });

        handle.stop().await;
        handle.stop().await;
        assert!(handle.is_finished().await);
    }

    #[tokio::test]
    async fn test_concurrent_stops_both_wait_for_exit() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&exited);

        let handle = Arc::new(LoopHandle::spawn("slow-exit", move |mut signal| async move {
            signal.stopped().await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
        }));

        let a = {
            let handle = Arc::clone(&handle);
            let exited = Arc::clone(&exited);
            tokio::spawn(async move {
                handle.stop().await;
                exited.load(Ordering::SeqCst)
            })
        };
        let b = {
            let handle = Arc::clone(&handle);
            let exited = Arc::clone(&exited);
            tokio::spawn(async move {
                handle.stop().await;
                exited.load(Ordering::SeqCst)
            })
        };

        assert!(a.await.unwrap());
        assert!(b.await.unwrap());
    }

    #[tokio::test]
    async fn test_loop_that_exits_on_its_own() {
        let handle = LoopHandle::spawn("one-shot", |_signal| async move {});
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(handle.is_running());
        assert!(handle.is_finished().await);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_stop_signal_sleep_returns_true_while_running() {
        let (tx, rx) = broadcast::channel(1);
        let mut signal = StopSignal {
            running: Arc::new(AtomicBool::new(true)),
            shutdown_rx: rx,
        };
        assert!(signal.sleep(Duration::from_millis(1)).await);
        drop(tx);
        assert!(!signal.sleep(Duration::from_secs(3600)).await);
    }
}
