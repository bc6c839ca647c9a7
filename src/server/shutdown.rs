//! Shutdown signalling between the process signal handler and the server tasks.

use std::future::Future;
use std::io;

use tokio::sync::watch;

/// Resolve once `true` has been sent on the shutdown channel.
///
/// A dropped sender also resolves, since no signal can arrive any more.
pub async fn wait_for(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Forward `signal` to the shutdown channel.
///
/// If the signal handler cannot be installed the sender is held for the
/// life of the process, so the server keeps running rather than stopping
/// right after boot.
pub async fn forward_signal<F>(signal: F, tx: watch::Sender<bool>)
where
    F: Future<Output = io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
            tx.send(true).ok();
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_signal_triggers_shutdown() {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(forward_signal(async { Ok(()) }, tx));

        tokio::time::timeout(Duration::from_secs(1), wait_for(rx))
            .await
            .expect("shutdown should be signalled");
    }

    #[tokio::test]
    async fn test_failed_signal_handler_keeps_server_running() {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(forward_signal(
            async { Err(io::Error::new(io::ErrorKind::Other, "no signal support")) },
            tx,
        ));

        let waited = tokio::time::timeout(Duration::from_millis(100), wait_for(rx)).await;
        assert!(waited.is_err(), "server must not stop when the handler fails");
    }

    #[tokio::test]
    async fn test_dropped_sender_releases_waiters() {
        let (tx, rx) = watch::channel(false);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), wait_for(rx))
            .await
            .expect("waiter should be released");
    }
}
