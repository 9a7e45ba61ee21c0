use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitBreakerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            OPEN => CircuitBreakerState::Open,
            HALF_OPEN => CircuitBreakerState::HalfOpen,
            _ => CircuitBreakerState::Closed,
        }
    }
}

#[derive(Error, Debug)]
pub enum CallError<E> {
    #[error("circuit breaker is open")]
    Open,
    #[error("{0}")]
    Failed(E),
}

/// Lock-free circuit breaker guarding a single upstream.
///
/// Concurrent failures may push `failures` a little past the threshold before
/// the state flips to open; the breaker is a throttle, not a transaction.
pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicU32,
    // millis since `epoch`
    last_failure: AtomicU64,
    trial_in_flight: AtomicBool,
    epoch: Instant,
    threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: AtomicU8::new(CLOSED),
            failures: AtomicU32::new(0),
            last_failure: AtomicU64::new(0),
            trial_in_flight: AtomicBool::new(false),
            epoch: Instant::now(),
            threshold: threshold.max(1),
            cooldown,
        }
    }

    pub fn state(&self) -> CircuitBreakerState {
        CircuitBreakerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Runs `attempt` unless the circuit is open. The attempt is not invoked
    /// at all when rejected.
    pub async fn call<F, Fut, T, E>(&self, attempt: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let _trial = match self.admit() {
            Admission::Rejected => return Err(CallError::Open),
            Admission::Pass => None,
            Admission::Trial(guard) => Some(guard),
        };

        match attempt().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(CallError::Failed(e))
            }
        }
    }

    fn admit(&self) -> Admission<'_> {
        match self.state.load(Ordering::Acquire) {
            CLOSED => Admission::Pass,
            OPEN => {
                if !self.cooldown_elapsed() {
                    return Admission::Rejected;
                }
                let _ = self
                    .state
                    .compare_exchange(OPEN, HALF_OPEN, Ordering::AcqRel, Ordering::Acquire);
                self.try_trial()
            }
            _ => self.try_trial(),
        }
    }

    // Em half-open só uma chamada de teste passa por vez.
    fn try_trial(&self) -> Admission<'_> {
        if self
            .trial_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Admission::Rejected;
        }
        let guard = TrialGuard(&self.trial_in_flight);

        // A previous trial may have failed between our cooldown check and
        // taking the slot; its failure restarts the cooldown.
        if !self.cooldown_elapsed() {
            let _ = self
                .state
                .compare_exchange(HALF_OPEN, OPEN, Ordering::AcqRel, Ordering::Acquire);
            return Admission::Rejected;
        }
        Admission::Trial(guard)
    }

    fn cooldown_elapsed(&self) -> bool {
        let since_failure = self.now_millis().saturating_sub(self.last_failure.load(Ordering::Acquire));
        since_failure >= self.cooldown.as_millis() as u64
    }

    fn record_success(&self) {
        self.failures.store(0, Ordering::Relaxed);
        self.state.store(CLOSED, Ordering::Release);
    }

    fn record_failure(&self) {
        let previous = self.state.load(Ordering::Acquire);
        let failures = self.failures.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        self.last_failure.store(self.now_millis(), Ordering::Release);

        if previous == HALF_OPEN || failures >= self.threshold {
            self.state.store(OPEN, Ordering::Release);
        }
    }

    fn now_millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }
}

enum Admission<'a> {
    Pass,
    Trial(TrialGuard<'a>),
    Rejected,
}

// Libera a vaga de teste mesmo se o futuro for abandonado.
struct TrialGuard<'a>(&'a AtomicBool);

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
