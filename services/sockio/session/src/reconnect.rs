//! Reconnect supervisor with linear backoff.

use crate::signal::CloseSignal;
use crate::ClientError;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on the delay between attempts
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Attempt cap and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Maximum consecutive attempts (0 = unbounded)
    pub max_attempts: u32,
    /// Delay before the first attempt, multiplied by the attempt number
    pub base_delay: Duration,
}

impl ReconnectPolicy {
    /// Delay before the attempt following `attempts` failures
    pub fn delay_for(&self, attempts: u32) -> Duration {
        self.base_delay
            .saturating_mul(attempts.saturating_add(1))
            .min(MAX_RECONNECT_DELAY)
    }

    /// Whether `attempts` failures exhaust the policy
    pub fn exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}

/// How a supervisor run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectOutcome {
    /// A connect attempt succeeded
    Reconnected,
    /// Attempt cap reached; the client stays disconnected
    GaveUp,
    /// Client closed while reconnecting
    Aborted,
}

#[derive(Debug, Default)]
struct ReconnectState {
    attempts: u32,
}

/// Drives reconnect attempts and owns the ack-id counter
#[derive(Debug)]
pub struct ReconnectSupervisor {
    policy: ReconnectPolicy,
    state: Mutex<ReconnectState>,
    ack_counter: AtomicU64,
}

impl ReconnectSupervisor {
    /// Create a supervisor with a zero attempt counter
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(ReconnectState::default()),
            ack_counter: AtomicU64::new(0),
        }
    }

    /// The policy in force
    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Allocate the next ack id. Ids start at 1 and are never reused.
    pub fn next_ack_id(&self) -> u64 {
        self.ack_counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Consecutive failed attempts since the last success
    pub fn attempts(&self) -> u32 {
        self.lock().attempts
    }

    fn lock(&self) -> MutexGuard<'_, ReconnectState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Retry `connect` until it succeeds, the cap is reached, or `cancel` fires
    pub async fn run<F, Fut>(&self, cancel: &CloseSignal, mut connect: F) -> ReconnectOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), ClientError>>,
    {
        loop {
            let delay = {
                let state = self.lock();
                if self.policy.exhausted(state.attempts) {
                    warn!(
                        "Giving up after {} reconnect attempts",
                        state.attempts
                    );
                    return ReconnectOutcome::GaveUp;
                }
                self.policy.delay_for(state.attempts)
            };

            debug!("Reconnecting in {:?}", delay);
            tokio::select! {
                biased;

                _ = cancel.fired() => return ReconnectOutcome::Aborted,
                _ = tokio::time::sleep(delay) => {}
            }

            match connect().await {
                Ok(()) => {
                    self.lock().attempts = 0;
                    info!("Reconnected");
                    return ReconnectOutcome::Reconnected;
                }
                Err(ClientError::Closed) => return ReconnectOutcome::Aborted,
                Err(e) => {
                    let mut state = self.lock();
                    state.attempts += 1;
                    warn!("Reconnect attempt {} failed: {}", state.attempts, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TransportError;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            base_delay: Duration::from_secs(1),
        }
    }

    fn refused() -> Result<(), ClientError> {
        Err(ClientError::Transport(TransportError::Dial(
            "connection refused".to_string(),
        )))
    }

    #[test]
    fn test_linear_backoff_with_cap() {
        let policy = policy(0);
        let delays: Vec<_> = (0..6).map(|a| policy.delay_for(a)).collect();
        assert_eq!(
            delays,
            (1..=6).map(Duration::from_secs).collect::<Vec<_>>()
        );
        assert_eq!(policy.delay_for(29), Duration::from_secs(30));
        assert_eq!(policy.delay_for(45), MAX_RECONNECT_DELAY);
        assert_eq!(policy.delay_for(u32::MAX), MAX_RECONNECT_DELAY);
    }

    #[test]
    fn test_ack_ids_are_monotonic() {
        let supervisor = ReconnectSupervisor::new(policy(0));
        assert_eq!(supervisor.next_ack_id(), 1);
        assert_eq!(supervisor.next_ack_id(), 2);
        assert_eq!(supervisor.next_ack_id(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_cap() {
        let supervisor = ReconnectSupervisor::new(policy(3));
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CloseSignal::new();

        let start = tokio::time::Instant::now();
        let outcome = supervisor
            .run(&cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { refused() }
            })
            .await;
        assert_eq!(outcome, ReconnectOutcome::GaveUp);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(supervisor.attempts(), 3);
        // 1s + 2s + 3s of backoff
        assert!(start.elapsed() >= Duration::from_secs(6));

        // A later trigger performs zero attempts
        let outcome = supervisor
            .run(&cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { refused() }
            })
            .await;
        assert_eq!(outcome, ReconnectOutcome::GaveUp);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_resets_attempts() {
        let supervisor = ReconnectSupervisor::new(policy(0));
        let calls = Arc::new(AtomicU32::new(0));
        let cancel = CloseSignal::new();

        let outcome = supervisor
            .run(&cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        refused()
                    } else {
                        Ok(())
                    }
                }
            })
            .await;
        assert_eq!(outcome, ReconnectOutcome::Reconnected);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(supervisor.attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_closed_abort() {
        let supervisor = ReconnectSupervisor::new(policy(0));
        let cancel = CloseSignal::new();
        cancel.fire();

        let outcome = supervisor.run(&cancel, || async { Ok(()) }).await;
        assert_eq!(outcome, ReconnectOutcome::Aborted);

        let outcome = supervisor
            .run(&CloseSignal::new(), || async { Err(ClientError::Closed) })
            .await;
        assert_eq!(outcome, ReconnectOutcome::Aborted);
        assert_eq!(supervisor.attempts(), 0);
    }
}
