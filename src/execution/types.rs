use std::fmt;
use tokio::sync::watch;

/// Lifecycle of the collector process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Uninitialized,
    Initializing,
    Ready,
    Polling,
    Processing,
    ShuttingDown,
    Stopped,
    Failed,
}

impl fmt::Display for CollectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Outcome of one history task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed { average_price: i64 },
    Skipped(&'static str),
    Failed(String),
}

/// Sender half of the shutdown signal. Cloneable so every signal listener can hold one.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub fn trigger(&self) {
        // Stored even when the collector has already dropped its receiver
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Resolves once shutdown is requested. Never resolves if the sender is gone
/// without a request, so only a competing timer can end the wait.
pub async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
