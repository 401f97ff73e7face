//! Cancellation context for a pipeline run
//!
//! A Context carries a cancellation signal and an optional deadline. The
//! pipeline races every long running step against it, so an abandoned run
//! still unwinds through its cleanup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;

#[derive(Clone)]
pub struct Context {
    signal: Arc<CancelSignal>,
}

struct CancelSignal {
    deadline: Option<Instant>,
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    fn new(deadline: Option<Instant>, cancelled: bool) -> Arc<Self> {
        let (tx, rx) = watch::channel(cancelled);
        Arc::new(Self { deadline, tx, rx })
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            signal: CancelSignal::new(None, false),
        }
    }

    /// Derive a context that is cancelled when `timeout` elapses or when
    /// this context is cancelled, whichever comes first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let expires = Instant::now() + timeout;
        let deadline = self
            .signal
            .deadline
            .map_or(expires, |inherited| inherited.min(expires));
        let child = Self {
            signal: CancelSignal::new(Some(deadline), self.is_cancelled()),
        };

        let parent = self.clone();
        let watcher = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(expires.into()) => {
                    tracing::debug!("run deadline exceeded");
                }
                _ = parent.cancelled() => {}
            }
            watcher.cancel();
        });

        child
    }

    pub fn is_cancelled(&self) -> bool {
        *self.signal.rx.borrow()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.signal.deadline
    }

    /// Resolves once this context is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.signal.rx.clone();
        // The sender lives next to the receiver, so the channel stays open
        // while `self` is alive.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    pub fn cancel(&self) {
        self.signal.tx.send_replace(true);
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
