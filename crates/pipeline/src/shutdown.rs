//! Graceful-shutdown signaling.
//!
//! One flag is created at daemon start and threaded through the
//! conductor, the fetcher, and any bounded fan-outs. Loops check it
//! between units of work; in-flight HTTP and the current transaction are
//! allowed to finish.

use tokio::sync::watch;

/// Cloneable cancellation flag.
#[derive(Clone)]
pub struct ShutdownFlag {
    sender: watch::Sender<bool>,
    receiver: watch::Receiver<bool>,
}

impl ShutdownFlag {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(true);
        Self { sender, receiver }
    }

    /// True while the daemon should keep working.
    pub fn is_running(&self) -> bool {
        *self.receiver.borrow()
    }

    pub fn set_running(&self, running: bool) {
        // Send only fails when every receiver is gone, which means nobody
        // is watching anyway.
        let _ = self.sender.send(running);
    }

    /// Sleep that wakes early on shutdown. Returns false when shutdown
    /// interrupted the wait.
    pub async fn sleep(&self, duration: std::time::Duration) -> bool {
        let mut receiver = self.receiver.clone();
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = receiver.wait_for(|running| !running) => false,
        }
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_when_running() {
        let flag = ShutdownFlag::new();
        assert!(flag.sleep(Duration::from_secs(5)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_wakes_early_on_shutdown() {
        let flag = ShutdownFlag::new();
        let sleeper = flag.clone();
        let handle = tokio::spawn(async move { sleeper.sleep(Duration::from_secs(3600)).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        flag.set_running(false);
        assert!(!handle.await.unwrap());
        assert!(!flag.is_running());
    }
}
