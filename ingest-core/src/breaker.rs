//! Circuit breaker gating every outbound chain call.
//!
//! ```text
//! Closed --(failure_threshold consecutive failures)--> Open
//! Open   --(cooldown elapsed, next call)-----------> HalfOpen (one probe)
//! HalfOpen --probe ok--> Closed
//! HalfOpen --probe err--> Open (cooldown doubled, capped)
//! ```
//!
//! State lives behind a synchronous mutex that is never held across an
//! await point. Time comes from [`tokio::time::Instant`] so tests can run
//! with a paused clock.

use crate::config::BreakerConfig;
pub use ledger_ingest_sdk::objects::BreakerState;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// Short-circuited while open; the call was not attempted
    #[error("circuit open, retry in {retry_in:?}")]
    Open { retry_in: Duration },

    /// Half-open and another caller holds the single probe slot
    #[error("circuit half-open, probe already in flight")]
    ProbeInFlight,

    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// True when the breaker refused the call without attempting it.
    pub fn is_short_circuit(&self) -> bool {
        !matches!(self, BreakerError::Inner(_))
    }
}

/// Read-only view used by the health reporter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    /// Time left before the next probe is admitted, when open.
    pub cooldown_remaining: Option<Duration>,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    /// Failed half-open probes since the last close.
    reopen_count: u32,
    cooldown_until: Option<Instant>,
    probe_in_flight: bool,
    last_health: Option<(Instant, bool)>,
}

pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                reopen_count: 0,
                cooldown_until: None,
                probe_in_flight: false,
                last_health: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` through the breaker.
    ///
    /// Any `Err` from `f` counts as a failure. If the returned future is
    /// dropped before `f` completes, a held probe slot is released without
    /// recording an outcome.
    pub async fn call<T, E, F, Fut>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let guard = self.admit()?;
        let result = f().await;
        guard.finish(result.is_ok());
        result.map_err(BreakerError::Inner)
    }

    /// Endpoint liveness, cached for `health_cache_ttl`.
    ///
    /// A fresh cached result is returned without calling `probe`. While the
    /// breaker short-circuits, the endpoint is reported unhealthy without
    /// being contacted.
    pub async fn health_check<T, E, F, Fut>(&self, probe: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        {
            let inner = self.lock();
            if let Some((at, healthy)) = inner.last_health {
                if at.elapsed() < self.config.health_cache_ttl {
                    return healthy;
                }
            }
        }

        let healthy = match self.call(probe).await {
            Ok(_) => true,
            Err(BreakerError::ProbeInFlight) => return false,
            Err(_) => false,
        };
        self.lock().last_health = Some((Instant::now(), healthy));
        healthy
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let now = Instant::now();
        let cooldown_remaining = inner
            .cooldown_until
            .filter(|_| inner.state == BreakerState::Open)
            .map(|until| until.saturating_duration_since(now));
        // An open breaker whose cooldown has run out admits the next call
        // as a probe, so it is already half-open from the caller's view.
        let state = match cooldown_remaining {
            Some(remaining) if remaining.is_zero() => BreakerState::HalfOpen,
            _ => inner.state,
        };
        BreakerSnapshot {
            state,
            consecutive_failures: inner.consecutive_failures,
            cooldown_remaining,
        }
    }

    pub fn state(&self) -> BreakerState {
        self.snapshot().state
    }

    fn admit<E>(&self) -> Result<CallGuard<'_>, BreakerError<E>> {
        let mut inner = self.lock();
        let now = Instant::now();

        if inner.state == BreakerState::Open {
            let until = inner.cooldown_until.unwrap_or(now);
            if now < until {
                return Err(BreakerError::Open {
                    retry_in: until - now,
                });
            }
            info!("Circuit breaker cooldown elapsed, entering half-open");
            inner.state = BreakerState::HalfOpen;
        }

        match inner.state {
            BreakerState::HalfOpen if inner.probe_in_flight => Err(BreakerError::ProbeInFlight),
            BreakerState::HalfOpen => {
                inner.probe_in_flight = true;
                Ok(CallGuard {
                    breaker: self,
                    probe: true,
                    finished: false,
                })
            }
            _ => Ok(CallGuard {
                breaker: self,
                probe: false,
                finished: false,
            }),
        }
    }

    fn on_success(&self, probe: bool) {
        let mut inner = self.lock();
        if probe || inner.state != BreakerState::Closed {
            info!("Circuit breaker closed");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.reopen_count = 0;
        inner.cooldown_until = None;
        if probe {
            inner.probe_in_flight = false;
        }
        inner.last_health = Some((Instant::now(), true));
    }

    fn on_failure(&self, probe: bool) {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);

        if probe {
            inner.probe_in_flight = false;
            inner.reopen_count = inner.reopen_count.saturating_add(1);
            let cooldown = self.config.cooldown_for(inner.reopen_count);
            inner.state = BreakerState::Open;
            inner.cooldown_until = Some(Instant::now() + cooldown);
            warn!(?cooldown, "Circuit breaker probe failed, reopening");
        } else if inner.state == BreakerState::Closed
            && inner.consecutive_failures >= self.config.failure_threshold
        {
            let cooldown = self.config.cooldown_for(0);
            inner.state = BreakerState::Open;
            inner.cooldown_until = Some(Instant::now() + cooldown);
            warn!(
                consecutive_failures = inner.consecutive_failures,
                ?cooldown,
                "Circuit breaker opened"
            );
        }
    }
}

/// Admission ticket for one call. Dropping it unfinished frees the probe slot.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    finished: bool,
}

impl CallGuard<'_> {
    fn finish(mut self, ok: bool) {
        self.finished = true;
        if ok {
            self.breaker.on_success(self.probe);
        } else {
            self.breaker.on_failure(self.probe);
        }
    }
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if self.probe && !self.finished {
            self.breaker.lock().probe_in_flight = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: 3,
            cooldown: Duration::from_secs(30),
            max_cooldown: Duration::from_secs(100),
            health_cache_ttl: Duration::from_secs(5),
        })
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.call(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.call(|| async { Ok::<_, &'static str>(()) }).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_opens_after_threshold_and_short_circuits() {
        let breaker = breaker();
        for _ in 0..3 {
            assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner("boom"))));
        }
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.snapshot().consecutive_failures, 3);

        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = breaker
            .call(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(())
            })
            .await;
        assert!(matches!(result, Err(BreakerError::Open { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_in_closed_resets_failures() {
        let breaker = breaker();
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        succeed(&breaker).await.unwrap();
        fail(&breaker).await.unwrap_err();
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_probe_closes() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(matches!(succeed(&breaker).await, Err(BreakerError::Open { .. })));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_probe_admitted() {
        let breaker = Arc::new(breaker());
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let probe = {
            let breaker = breaker.clone();
            tokio::spawn(async move {
                breaker
                    .call(move || async move {
                        let _ = release_rx.await;
                        Ok::<_, &'static str>(())
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        assert!(matches!(succeed(&breaker).await, Err(BreakerError::ProbeInFlight)));
        release_tx.send(()).unwrap();
        probe.await.unwrap().unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_doubles_cooldown_up_to_cap() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        assert_eq!(breaker.snapshot().cooldown_remaining, Some(Duration::from_secs(30)));

        tokio::time::advance(Duration::from_secs(30)).await;
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert_eq!(breaker.snapshot().cooldown_remaining, Some(Duration::from_secs(60)));

        tokio::time::advance(Duration::from_secs(60)).await;
        fail(&breaker).await.unwrap_err();
        assert_eq!(breaker.snapshot().cooldown_remaining, Some(Duration::from_secs(100)));

        tokio::time::advance(Duration::from_secs(100)).await;
        succeed(&breaker).await.unwrap();
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        assert_eq!(breaker.snapshot().cooldown_remaining, Some(Duration::from_secs(30)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_probe_releases_slot() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        tokio::time::advance(Duration::from_secs(30)).await;

        let hung = breaker.call(|| std::future::pending::<Result<(), &'static str>>());
        let timed_out = tokio::time::timeout(Duration::from_secs(1), hung).await;
        assert!(timed_out.is_err());

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_is_cached() {
        let breaker = breaker();
        let probes = AtomicU32::new(0);
        let counter = &probes;
        let probe = move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, &'static str>(())
        };

        assert!(breaker.health_check(probe).await);
        assert!(breaker.health_check(probe).await);
        assert_eq!(probes.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(breaker.health_check(probe).await);
        assert_eq!(probes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_does_not_contact_open_endpoint() {
        let breaker = breaker();
        for _ in 0..3 {
            fail(&breaker).await.unwrap_err();
        }
        let probes = AtomicU32::new(0);
        let counter = &probes;
        let healthy = breaker
            .health_check(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &'static str>(())
            })
            .await;
        assert!(!healthy);
        assert_eq!(probes.load(Ordering::SeqCst), 0);
    }
}
