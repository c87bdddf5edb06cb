//! Single-flight credential refresh
//!
//! The first operation that observes an expired session becomes the leader and
//! runs the [`CredentialRefresher`]; every other operation that observes expiry
//! while the refresh is in flight becomes a follower and waits for the leader
//! to finish (bounded by [`FollowerWait`]).

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::GatewayError;
use crate::gateway::RequestGateway;

/// Renews the session after the server rejected it.
///
/// Invoked at most once per coordinated refresh cycle. Implementations
/// typically run a refresh mutation through
/// [`RequestGateway::execute_unguarded`] and store the new identifier in a
/// [`SessionProvider`](crate::SessionProvider).
///
/// A failure is reported to the operation that triggered the refresh and is
/// conventionally [`GatewayError::ForceLogout`].
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    async fn refresh(&self, gateway: &RequestGateway) -> Result<(), GatewayError>;
}

/// How long a follower waits for the leader before retrying anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowerWait {
    /// Number of polls (default: 10)
    pub max_iterations: u32,
    /// Delay between polls (default: 500ms)
    pub poll_interval: Duration,
}

impl Default for FollowerWait {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl FollowerWait {
    /// Upper bound of a single follower wait.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.poll_interval.saturating_mul(self.max_iterations)
    }
}

/// How a caller took part in a refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This caller led the refresh and it succeeded
    Refreshed,
    /// Another caller's refresh finished while this one waited
    Joined,
    /// The wait bound elapsed with the refresh still in flight
    WaitExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshPhase {
    Idle,
    Refreshing,
}

/// Refresh register shared by every operation of one gateway.
pub struct RefreshCoordinator {
    phase: watch::Sender<RefreshPhase>,
    wait: FollowerWait,
    cycles: AtomicU64,
}

impl fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refreshing", &self.is_refreshing())
            .field("wait", &self.wait)
            .field("cycles", &self.cycles())
            .finish_non_exhaustive()
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new(FollowerWait::default())
    }
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new(wait: FollowerWait) -> Self {
        let (phase, _) = watch::channel(RefreshPhase::Idle);
        Self {
            phase,
            wait,
            cycles: AtomicU64::new(0),
        }
    }

    /// Whether a leader is currently refreshing.
    #[must_use]
    pub fn is_refreshing(&self) -> bool {
        *self.phase.borrow() == RefreshPhase::Refreshing
    }

    /// Number of refresh cycles led so far.
    #[must_use]
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn follower_wait(&self) -> FollowerWait {
        self.wait
    }

    /// Take part in a refresh cycle.
    ///
    /// If no refresh is in flight the caller becomes the leader and `refresh`
    /// runs; otherwise the caller waits for the leader to finish. The register
    /// returns to idle when the leader finishes or its future is dropped.
    ///
    /// # Errors
    ///
    /// Returns the refresher's error when this caller led the cycle and the
    /// refresh failed. Followers never fail.
    pub async fn coordinate<F, Fut>(&self, refresh: F) -> Result<RefreshOutcome, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), GatewayError>>,
    {
        let Some(lease) = self.try_lead() else {
            return Ok(self.follow().await);
        };

        let cycle = self.cycles.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(role = "leader", cycle, "refreshing credentials");

        let result = refresh().await;
        drop(lease);

        match result {
            Ok(()) => {
                tracing::info!(role = "leader", cycle, "credential refresh succeeded");
                Ok(RefreshOutcome::Refreshed)
            }
            Err(e) => {
                tracing::warn!(role = "leader", cycle, error = %e, "credential refresh failed");
                Err(e)
            }
        }
    }

    /// Test-and-set `Idle -> Refreshing`.
    fn try_lead(&self) -> Option<RefreshLease<'_>> {
        let acquired = self.phase.send_if_modified(|phase| {
            if *phase == RefreshPhase::Idle {
                *phase = RefreshPhase::Refreshing;
                true
            } else {
                false
            }
        });
        if acquired {
            Some(RefreshLease { phase: &self.phase })
        } else {
            None
        }
    }

    async fn follow(&self) -> RefreshOutcome {
        let mut rx = self.phase.subscribe();
        if *rx.borrow_and_update() == RefreshPhase::Idle {
            return RefreshOutcome::Joined;
        }

        for iteration in 1..=self.wait.max_iterations {
            let released = tokio::time::timeout(
                self.wait.poll_interval,
                rx.wait_for(|phase| *phase == RefreshPhase::Idle),
            )
            .await
            .is_ok();

            if released {
                tracing::debug!(role = "follower", iterations = iteration, "leader finished");
                return RefreshOutcome::Joined;
            }
        }

        tracing::warn!(
            role = "follower",
            iterations = self.wait.max_iterations,
            waited_ms = u64::try_from(self.wait.total().as_millis()).unwrap_or(u64::MAX),
            "credential refresh still in flight; retrying without it"
        );
        RefreshOutcome::WaitExceeded
    }
}

/// Held by the leader; resets the register to idle on drop.
struct RefreshLease<'a> {
    phase: &'a watch::Sender<RefreshPhase>,
}

impl Drop for RefreshLease<'_> {
    fn drop(&mut self) {
        self.phase.send_replace(RefreshPhase::Idle);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn single_caller_leads_and_resets() {
        let coordinator = RefreshCoordinator::default();
        let outcome = coordinator
            .coordinate(|| async { Ok(()) })
            .await
            .unwrap();

        assert_eq!(outcome, RefreshOutcome::Refreshed);
        assert!(!coordinator.is_refreshing());
        assert_eq!(coordinator.cycles(), 1);
    }

    #[tokio::test]
    async fn leader_error_is_returned_and_register_reset() {
        let coordinator = RefreshCoordinator::default();
        let err = coordinator
            .coordinate(|| async { Err(GatewayError::force_logout("invalid-refresh")) })
            .await
            .unwrap_err();

        assert!(err.to_string().contains("invalid-refresh"));
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_refresh() {
        let coordinator = Arc::new(RefreshCoordinator::default());
        let runs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let runs = Arc::clone(&runs);
                tokio::spawn(async move {
                    coordinator
                        .coordinate(|| async move {
                            runs.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(200)).await;
                            Ok(())
                        })
                        .await
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == RefreshOutcome::Refreshed)
                .count(),
            1
        );
        assert!(outcomes.iter().all(|o| *o != RefreshOutcome::WaitExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn follower_fails_open_after_wait_bound() {
        let coordinator = Arc::new(RefreshCoordinator::new(FollowerWait {
            max_iterations: 3,
            poll_interval: Duration::from_millis(100),
        }));
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let leader = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .coordinate(|| async move {
                        let _ = release_rx.await;
                        Ok(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert!(coordinator.is_refreshing());

        let started = tokio::time::Instant::now();
        let outcome = coordinator.coordinate(|| async { Ok(()) }).await.unwrap();
        assert_eq!(outcome, RefreshOutcome::WaitExceeded);
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(coordinator.cycles(), 1);

        release_tx.send(()).unwrap();
        assert_eq!(leader.await.unwrap().unwrap(), RefreshOutcome::Refreshed);
        assert!(!coordinator.is_refreshing());
    }

    #[tokio::test]
    async fn dropped_leader_releases_register() {
        let coordinator = RefreshCoordinator::default();
        {
            let pending = coordinator.coordinate(|| std::future::pending());
            tokio::pin!(pending);
            assert!(
                tokio::time::timeout(Duration::from_millis(10), &mut pending)
                    .await
                    .is_err()
            );
            assert!(coordinator.is_refreshing());
        }
        assert!(!coordinator.is_refreshing());
    }

    #[test]
    fn follower_wait_total() {
        assert_eq!(FollowerWait::default().total(), Duration::from_secs(5));
    }
}
