//! Reconnection policy for the relay path: a fixed delay between attempts,
//! applied identically after failures and after clean server closes. No
//! backoff, no attempt cap.

use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::relay::RelaySession;

/// Delay between the end of one relay attempt and the start of the next.
pub(crate) const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Drive `session` until shutdown. Each attempt's outcome is logged and
/// absorbed; the only way out of the loop is the shutdown signal.
pub(crate) async fn supervise<S: RelaySession>(
    session: &mut S,
    delay: Duration,
    shutdown: &mut watch::Receiver<bool>,
) {
    if *shutdown.borrow() {
        return;
    }
    loop {
        tokio::select! {
            outcome = session.run_once() => match outcome {
                Ok(()) => info!(delay_secs = delay.as_secs(), "relay session ended, reconnecting"),
                Err(e) => warn!(error = %e, delay_secs = delay.as_secs(), "relay session failed, reconnecting"),
            },
            _ = shutdown.changed() => {
                info!("shutdown requested, relay supervisor stopping");
                return;
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => {
                info!("shutdown requested during reconnect delay");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails instantly on every attempt.
    struct AlwaysFailing {
        attempts: Arc<AtomicU32>,
    }

    impl RelaySession for AlwaysFailing {
        async fn run_once(&mut self) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            anyhow::bail!("connection refused")
        }
    }

    /// Closes cleanly on every attempt.
    struct AlwaysClosing {
        attempts: Arc<AtomicU32>,
    }

    impl RelaySession for AlwaysClosing {
        async fn run_once(&mut self) -> anyhow::Result<()> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Connects and never returns, like a healthy long-lived stream.
    struct NeverEnding;

    impl RelaySession for NeverEnding {
        async fn run_once(&mut self) -> anyhow::Result<()> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempts_are_retried_at_fixed_cadence() {
        let attempts = Arc::new(AtomicU32::new(0));
        let mut session = AlwaysFailing {
            attempts: Arc::clone(&attempts),
        };
        let (tx, mut rx) = watch::channel(false);

        // Attempts land at t = 0s, 3s, 6s, ..., 30s. Shutdown at 31.5s
        // falls inside the twelfth delay, so exactly eleven attempts run.
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(31_500)).await;
            let _ = tx.send(true);
        });
        supervise(&mut session, RECONNECT_DELAY, &mut rx).await;

        assert_eq!(attempts.load(Ordering::Relaxed), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_server_close_reconnects_with_same_delay() {
        let attempts = Arc::new(AtomicU32::new(0));
        let mut session = AlwaysClosing {
            attempts: Arc::clone(&attempts),
        };
        let (tx, mut rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(4_500)).await;
            let _ = tx.send(true);
        });
        supervise(&mut session, RECONNECT_DELAY, &mut rx).await;

        // t = 0s and t = 3s ran; shutdown arrives during the third delay.
        assert_eq!(attempts.load(Ordering::Relaxed), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_a_live_session() {
        let mut session = NeverEnding;
        let (tx, mut rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let _ = tx.send(true);
        });
        supervise(&mut session, RECONNECT_DELAY, &mut rx).await;
    }

    #[tokio::test(start_paused = true)]
    async fn pre_signaled_shutdown_runs_no_attempts() {
        let attempts = Arc::new(AtomicU32::new(0));
        let mut session = AlwaysFailing {
            attempts: Arc::clone(&attempts),
        };
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).expect("receiver alive");

        supervise(&mut session, RECONNECT_DELAY, &mut rx).await;

        assert_eq!(attempts.load(Ordering::Relaxed), 0);
    }
}
