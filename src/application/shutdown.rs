//! Graceful-shutdown plumbing shared by the long-running services.
//!
//! One sender, many receivers: each service loop holds a watch receiver
//! and finishes its current batch or message when the flag flips.

use tokio::sync::watch;

/// Broadcast shutdown flag for the service loops.
pub struct ShutdownSignal {
    sender: watch::Sender<bool>,
}

impl ShutdownSignal {
    /// Creates an untriggered signal.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// Subscribes a service loop.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }

    /// Flips the flag; services drain and exit.
    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for SIGINT or SIGTERM.
pub async fn wait_for_termination() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let signal = ShutdownSignal::new();
        let mut first = signal.subscribe();
        let mut second = signal.subscribe();

        signal.trigger();

        first.changed().await.unwrap();
        second.changed().await.unwrap();
        assert!(*first.borrow());
        assert!(*second.borrow());
    }

    #[tokio::test]
    async fn subscribers_start_untriggered() {
        let signal = ShutdownSignal::new();
        assert!(!*signal.subscribe().borrow());
    }
}
