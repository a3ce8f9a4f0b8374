//! Circuit breaker for a single keyed dependency.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast with [`BreakerError::Open`]
//! - Half-Open: a single probe call is let through to test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: opening_threshold consecutive failures, counted from the
//!                first failure of a run and forgiven once opening_window elapses
//! Open → Half-Open: closing_delay elapsed
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (closing_delay restarts)
//! ```
//!
//! Every transition is serialized by the breaker's own lock, and observers are
//! notified while that lock is held so they see transitions in the order they
//! happened. Observers must not call back into the breaker that notifies them.

use crate::config::BreakerConfig;
use crate::metrics_defs::{BREAKER_CLOSED, BREAKER_HALF_OPENED, BREAKER_OPENED, BREAKER_REJECTED};
use parking_lot::Mutex;
use shared::counter;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::AbortHandle;

/// Anything that can name a breaker: addresses, hostnames, partner names.
pub trait BreakerKey: Clone + fmt::Display + Send + Sync + 'static {}

impl<T> BreakerKey for T where T: Clone + fmt::Display + Send + Sync + 'static {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Receives state transitions of the breakers it is attached to.
pub trait BreakerObserver<K>: Send + Sync {
    fn on_open(&self, _key: &K) {}

    fn on_half_open(&self, _key: &K) {}

    fn on_close(&self, _key: &K) {}
}

#[derive(Error, Debug, PartialEq)]
pub enum BreakerError<E> {
    /// The call was vetoed without being attempted
    #[error("open circuit")]
    Open,

    #[error("{0}")]
    Inner(E),
}

impl<E> BreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open)
    }
}

#[derive(Debug, Clone, Copy)]
enum TimerAction {
    ForgiveFailures,
    HalfOpen,
}

struct Machine {
    state: BreakerState,
    failures: u32,
    probe_in_flight: bool,
    // Bumped every time the pending timer is replaced or cancelled, so a
    // timer that already woke up cannot act on a newer state.
    timer_epoch: u64,
    timer: Option<AbortHandle>,
}

impl Machine {
    fn cancel_timer(&mut self) {
        self.timer_epoch = self.timer_epoch.wrapping_add(1);
        if let Some(handle) = self.timer.take() {
            handle.abort();
        }
    }
}

struct Shared<K: BreakerKey> {
    key: K,
    config: BreakerConfig,
    observers: Vec<Arc<dyn BreakerObserver<K>>>,
    machine: Mutex<Machine>,
}

impl<K: BreakerKey> Shared<K> {
    /// Returns `Some(is_probe)` when the call may proceed.
    fn admit(&self) -> Option<bool> {
        let mut machine = self.machine.lock();
        match machine.state {
            BreakerState::Closed => Some(false),
            BreakerState::Open => None,
            BreakerState::HalfOpen if machine.probe_in_flight => None,
            BreakerState::HalfOpen => {
                machine.probe_in_flight = true;
                Some(true)
            }
        }
    }

    fn record(self: &Arc<Self>, probe: bool, succeeded: bool) {
        let mut machine = self.machine.lock();

        if probe {
            machine.probe_in_flight = false;
            if machine.state != BreakerState::HalfOpen {
                return;
            }
            if succeeded {
                self.close(&mut machine);
            } else {
                self.open(&mut machine);
            }
            return;
        }

        // Late results of calls admitted before the circuit opened are ignored.
        if machine.state != BreakerState::Closed {
            return;
        }

        if succeeded {
            machine.failures = 0;
            machine.cancel_timer();
            return;
        }

        machine.failures += 1;
        if machine.failures >= self.config.opening_threshold {
            self.open(&mut machine);
        } else if machine.failures == 1 {
            self.schedule(
                &mut machine,
                self.config.opening_window(),
                TimerAction::ForgiveFailures,
            );
        }
    }

    fn open(self: &Arc<Self>, machine: &mut Machine) {
        tracing::warn!(
            key = %self.key,
            failures = machine.failures,
            "Circuit breaker opened"
        );
        machine.state = BreakerState::Open;
        self.schedule(machine, self.config.closing_delay(), TimerAction::HalfOpen);
        counter!(BREAKER_OPENED, "key" => self.key.to_string()).increment(1);
        for observer in &self.observers {
            observer.on_open(&self.key);
        }
    }

    fn half_open(&self, machine: &mut Machine) {
        tracing::info!(key = %self.key, "Circuit breaker half-open, waiting for probe");
        machine.state = BreakerState::HalfOpen;
        machine.probe_in_flight = false;
        counter!(BREAKER_HALF_OPENED, "key" => self.key.to_string()).increment(1);
        for observer in &self.observers {
            observer.on_half_open(&self.key);
        }
    }

    fn close(&self, machine: &mut Machine) {
        tracing::info!(key = %self.key, "Circuit breaker closed");
        machine.state = BreakerState::Closed;
        machine.failures = 0;
        machine.cancel_timer();
        counter!(BREAKER_CLOSED, "key" => self.key.to_string()).increment(1);
        for observer in &self.observers {
            observer.on_close(&self.key);
        }
    }

    fn schedule(self: &Arc<Self>, machine: &mut Machine, delay: Duration, action: TimerAction) {
        machine.cancel_timer();
        let epoch = machine.timer_epoch;
        let weak: Weak<Self> = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.fire(epoch, action);
            }
        });
        machine.timer = Some(handle.abort_handle());
    }

    fn fire(&self, epoch: u64, action: TimerAction) {
        let mut machine = self.machine.lock();
        if machine.timer_epoch != epoch {
            return;
        }
        machine.timer = None;

        match action {
            TimerAction::ForgiveFailures => {
                if machine.state == BreakerState::Closed {
                    tracing::debug!(
                        key = %self.key,
                        failures = machine.failures,
                        "Opening window elapsed, forgiving failures"
                    );
                    machine.failures = 0;
                }
            }
            TimerAction::HalfOpen => {
                if machine.state == BreakerState::Open {
                    self.half_open(&mut machine);
                }
            }
        }
    }
}

impl<K: BreakerKey> Drop for Shared<K> {
    fn drop(&mut self) {
        self.machine.get_mut().cancel_timer();
    }
}

/// Outcome slot for one admitted call. A call that is dropped before it
/// settles (for example because the caller's deadline fired) counts as failed.
struct Permit<K: BreakerKey> {
    shared: Arc<Shared<K>>,
    probe: bool,
    settled: bool,
}

impl<K: BreakerKey> Permit<K> {
    fn settle(mut self, succeeded: bool) {
        self.settled = true;
        self.shared.record(self.probe, succeeded);
    }
}

impl<K: BreakerKey> Drop for Permit<K> {
    fn drop(&mut self) {
        if !self.settled {
            self.shared.record(self.probe, false);
        }
    }
}

/// Per-key circuit breaker. Clones share the same state.
#[derive(Clone)]
pub struct CircuitBreaker<K: BreakerKey> {
    shared: Arc<Shared<K>>,
}

impl<K: BreakerKey> CircuitBreaker<K> {
    pub fn new(
        key: K,
        config: BreakerConfig,
        observers: Vec<Arc<dyn BreakerObserver<K>>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                key,
                config,
                observers,
                machine: Mutex::new(Machine {
                    state: BreakerState::Closed,
                    failures: 0,
                    probe_in_flight: false,
                    timer_epoch: 0,
                    timer: None,
                }),
            }),
        }
    }

    pub fn key(&self) -> &K {
        &self.shared.key
    }

    pub fn state(&self) -> BreakerState {
        self.shared.machine.lock().state
    }

    /// Consecutive failures counted in the current run.
    pub fn failure_count(&self) -> u32 {
        self.shared.machine.lock().failures
    }

    /// Runs `operation` unless the circuit is open.
    ///
    /// An `Err` from the operation counts as a failure; the original error is
    /// returned as [`BreakerError::Inner`]. When the circuit is open, or a
    /// half-open probe is already in flight, the operation is not invoked and
    /// [`BreakerError::Open`] is returned.
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(probe) = self.shared.admit() else {
            counter!(BREAKER_REJECTED, "key" => self.shared.key.to_string()).increment(1);
            return Err(BreakerError::Open);
        };

        let permit = Permit {
            shared: self.shared.clone(),
            probe,
            settled: false,
        };

        let result = operation().await;
        permit.settle(result.is_ok());
        result.map_err(BreakerError::Inner)
    }
}

impl<K: BreakerKey> fmt::Debug for CircuitBreaker<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let machine = self.shared.machine.lock();
        f.debug_struct("CircuitBreaker")
            .field("key", &self.shared.key.to_string())
            .field("state", &machine.state)
            .field("failures", &machine.failures)
            .finish()
    }
}
