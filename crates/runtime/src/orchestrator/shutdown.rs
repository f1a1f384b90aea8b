//! Cooperative cancellation for the continuous testing loop

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Notify;

/// Cloneable stop signal.
///
/// The loop checks it between iterations and wakes from its interval sleep
/// when it fires. An in-flight candidate is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    requested: Arc<RwLock<bool>>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop; idempotent. Returns true only for the call that
    /// actually flipped the flag.
    pub fn shutdown(&self) -> bool {
        {
            let mut requested = self.requested.write();
            if *requested {
                return false;
            }
            *requested = true;
        }
        self.notify.notify_waiters();
        tracing::info!("Continuous testing shutdown requested");
        true
    }

    pub fn is_shutdown(&self) -> bool {
        *self.requested.read()
    }

    /// Resolves once a stop has been requested
    pub async fn wait(&self) {
        let notified = self.notify.notified();
        if self.is_shutdown() {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_is_idempotent() {
        let handle = ShutdownHandle::new();
        assert!(!handle.is_shutdown());
        assert!(handle.shutdown());
        assert!(!handle.shutdown());
        assert!(handle.is_shutdown());
    }

    #[test]
    fn test_concurrent_shutdown_fires_once() {
        let handle = ShutdownHandle::new();
        let threads: Vec<_> = (0..16)
            .map(|_| {
                let handle = handle.clone();
                std::thread::spawn(move || handle.shutdown())
            })
            .collect();
        let fired = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|fired| *fired)
            .count();
        assert_eq!(fired, 1);
        assert!(handle.is_shutdown());
    }

    #[tokio::test]
    async fn test_wait_returns_after_shutdown() {
        let handle = ShutdownHandle::new();
        let waiter = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.shutdown();
        tokio::time::timeout(Duration::from_secs(2), waiter)
            .await
            .unwrap()
            .unwrap();

        // Already requested: returns immediately
        tokio::time::timeout(Duration::from_millis(100), handle.wait())
            .await
            .unwrap();
    }
}
