//! Cooperative stop flags shared between the pipeline units

use std::sync::Arc;
use tokio::sync::watch;

/// A stop flag that can be raised from any clone and awaited
#[derive(Debug, Clone)]
pub struct StopSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Raises the flag; raising it again is a no-op
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the flag is raised
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as `self`, so this only returns once raised.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}
