//! Core circuit breaker implementation.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::Span;

use crate::clock::Clock;
use crate::config::{BreakerBuilder, Settings, StateChangeFn};
use crate::counts::Counts;
use crate::error::{BreakerError, BreakerResult};
use crate::hook::HookRegistry;
use crate::metrics::MetricSink;
use crate::policy::{DefaultPolicy, TripPolicy};
use crate::state::{Generation, State, StateMachine, Transitions};

/// Inner state of the circuit breaker, shared between clones and
/// outstanding [`Done`](crate::Done) tokens.
pub(crate) struct BreakerInner<P> {
    name: String,
    machine: Mutex<StateMachine>,
    policy: P,
    clock: Arc<dyn Clock>,
    metric_sink: Arc<dyn MetricSink>,
    hooks: Arc<HookRegistry>,
    on_state_change: Option<StateChangeFn>,
    span: Span,
}

impl<P> BreakerInner<P>
where
    P: TripPolicy,
{
    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    pub(crate) fn span(&self) -> &Span {
        &self.span
    }

    /// Returns the up-to-date state, generation and counts in one critical
    /// section.
    pub(crate) fn snapshot(&self) -> (State, Generation, Counts) {
        let mut transitions = Transitions::new();
        let snapshot = {
            let mut machine = self.machine.lock();
            let (state, generation) = machine.current_state(self.clock.now(), &mut transitions);
            (state, generation, machine.counts())
        };
        self.notify(&transitions);
        snapshot
    }

    pub(crate) fn before_request(&self) -> Result<Generation, BreakerError<Infallible>> {
        let mut transitions = Transitions::new();
        let admission = {
            let mut machine = self.machine.lock();
            machine.before_request(self.clock.now(), &mut transitions)
        };
        self.notify(&transitions);

        match &admission {
            Ok(generation) => {
                tracing::trace!(parent: &self.span, %generation, "call admitted");
            }
            Err(err) => {
                let state = match err {
                    BreakerError::TooManyRequests => State::HalfOpen,
                    _ => State::Open,
                };
                tracing::debug!(parent: &self.span, %state, "call rejected: {}", err);
                self.metric_sink.record_rejection(&self.name, state);
                self.hooks.execute_rejected_hook(&self.name, state);
            }
        }

        admission
    }

    pub(crate) fn after_request(&self, generation: Generation, success: bool) {
        let transitions = self.record(generation, success);
        self.notify(&transitions);
    }

    /// Applies an outcome under the lock and logs it. Returns the transitions
    /// it caused without replaying them.
    fn record(&self, generation: Generation, success: bool) -> Transitions {
        let mut transitions = Transitions::new();
        let recorded = {
            let mut machine = self.machine.lock();
            machine.after_request(
                generation,
                success,
                &self.policy,
                self.clock.now(),
                &mut transitions,
            )
        };

        if !recorded {
            tracing::debug!(
                parent: &self.span,
                %generation,
                success,
                "discarding outcome from superseded generation"
            );
        }

        transitions
    }

    /// Reports a call that was actually run, feeding the metric sink too.
    pub(crate) fn complete(&self, generation: Generation, success: bool, started: Instant) {
        let duration = self.clock.now().saturating_duration_since(started);
        self.metric_sink.record_call(&self.name, success, duration);
        self.after_request(generation, success);
    }

    /// Records a failure for a call that is unwinding. Transitions are only
    /// logged; hooks and the metric sink are not run.
    fn record_unwinding(&self, generation: Generation) {
        for &(from, to, generation) in &self.record(generation, false) {
            self.log_transition(from, to, generation);
        }
    }

    fn log_transition(&self, from: State, to: State, generation: Generation) {
        match to {
            State::Open => tracing::warn!(
                parent: &self.span,
                %from,
                %to,
                %generation,
                "circuit breaker opened"
            ),
            _ => tracing::info!(
                parent: &self.span,
                %from,
                %to,
                %generation,
                "circuit breaker state changed"
            ),
        }
    }

    /// Replays transitions to logs, sinks and hooks. Called without the lock.
    fn notify(&self, transitions: &Transitions) {
        for &(from, to, generation) in transitions {
            self.log_transition(from, to, generation);
            self.metric_sink.record_state_transition(&self.name, from, to, generation);
            if let Some(observer) = &self.on_state_change {
                observer(&self.name, from, to);
            }
            self.hooks.execute_state_transition_hook(&self.name, from, to);
        }
    }
}

/// A circuit breaker that can wrap function calls to prevent cascading failures.
///
/// Cloning is cheap and yields a handle to the same breaker.
pub struct CircuitBreaker<P = DefaultPolicy> {
    inner: Arc<BreakerInner<P>>,
}

impl CircuitBreaker<DefaultPolicy> {
    /// Creates a new builder for customizing a circuit breaker.
    pub fn builder() -> BreakerBuilder<DefaultPolicy> {
        BreakerBuilder::new()
    }
}

impl<P> CircuitBreaker<P>
where
    P: TripPolicy,
{
    /// Creates a new circuit breaker from `settings`.
    pub fn new(settings: Settings<P>) -> Self {
        let now = settings.clock.now();
        let machine = StateMachine::new(
            settings.effective_max_requests(),
            settings.effective_interval(),
            settings.effective_timeout(),
            now,
        );
        let span = settings
            .span
            .clone()
            .unwrap_or_else(|| tracing::info_span!("circuit_breaker", name = %settings.name));

        tracing::debug!(
            parent: &span,
            max_requests = settings.effective_max_requests(),
            interval = ?settings.effective_interval(),
            timeout = ?settings.effective_timeout(),
            "circuit breaker created"
        );

        let inner = BreakerInner {
            name: settings.name,
            machine: Mutex::new(machine),
            policy: settings.ready_to_trip,
            clock: settings.clock,
            metric_sink: settings.metric_sink,
            hooks: settings.hooks,
            on_state_change: settings.on_state_change,
            span,
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<BreakerInner<P>> {
        &self.inner
    }

    /// Returns the breaker's name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the up-to-date state, applying any expiry that has passed.
    pub fn state(&self) -> State {
        self.inner.snapshot().0
    }

    /// Returns the counts of the current generation.
    pub fn counts(&self) -> Counts {
        self.inner.snapshot().2
    }

    /// Returns the current generation.
    pub fn generation(&self) -> Generation {
        self.inner.snapshot().1
    }

    /// Asks whether a call may proceed. On success the call is counted against
    /// the returned generation, which must be passed to
    /// [`after_request`](Self::after_request) once the outcome is known.
    pub fn before_request(&self) -> Result<Generation, BreakerError<Infallible>> {
        self.inner.before_request()
    }

    /// Records the outcome of a call admitted under `generation`. Outcomes
    /// from a generation that has since been superseded are ignored.
    pub fn after_request(&self, generation: Generation, success: bool) {
        self.inner.after_request(generation, success)
    }

    /// Executes a function wrapped by the circuit breaker.
    ///
    /// Rejections are returned without running `f`. Otherwise `f` runs outside
    /// the breaker's lock and its outcome is recorded; its error is passed
    /// through inside [`BreakerError::Operation`]. If `f` panics, the call is
    /// recorded as a failure and the panic keeps unwinding.
    pub fn execute<F, T, E>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let generation = self.inner.before_request().map_err(|err| err.lift::<E>())?;

        let guard = CallGuard::new(&self.inner, generation);
        let result = f();
        guard.finish(result.is_ok());

        result.map_err(BreakerError::Operation)
    }
}

#[cfg(feature = "async")]
impl<P> CircuitBreaker<P>
where
    P: TripPolicy,
{
    /// Executes an async function wrapped by the circuit breaker.
    ///
    /// If the returned future is dropped before the operation completes, the
    /// call is recorded as a failure.
    pub async fn execute_async<F, Fut, T, E>(&self, f: F) -> BreakerResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let generation = self.inner.before_request().map_err(|err| err.lift::<E>())?;

        let guard = CallGuard::new(&self.inner, generation);
        let result = f().await;
        guard.finish(result.is_ok());

        result.map_err(BreakerError::Operation)
    }
}

impl<P> Clone for CircuitBreaker<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> std::fmt::Debug for CircuitBreaker<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

/// Reports a failure for an admitted call unless it is finished explicitly,
/// covering panics and dropped futures.
struct CallGuard<'a, P: TripPolicy> {
    inner: &'a BreakerInner<P>,
    generation: Generation,
    started: Instant,
    armed: bool,
}

impl<'a, P: TripPolicy> CallGuard<'a, P> {
    fn new(inner: &'a BreakerInner<P>, generation: Generation) -> Self {
        Self {
            inner,
            generation,
            started: inner.now(),
            armed: true,
        }
    }

    fn finish(mut self, success: bool) {
        self.armed = false;
        self.inner.complete(self.generation, success, self.started);
    }
}

impl<P: TripPolicy> Drop for CallGuard<'_, P> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        if std::thread::panicking() {
            tracing::debug!(
                parent: &self.inner.span,
                generation = %self.generation,
                "call panicked, recording failure"
            );
            self.inner.record_unwinding(self.generation);
        } else {
            tracing::debug!(
                parent: &self.inner.span,
                generation = %self.generation,
                "call ended without an outcome, recording failure"
            );
            self.inner.complete(self.generation, false, self.started);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn breaker(clock: &ManualClock) -> CircuitBreaker {
        CircuitBreaker::builder()
            .name("test")
            .timeout(Duration::from_secs(60))
            .clock(clock.clone())
            .build()
    }

    #[test]
    fn test_execute_passes_operation_error_through() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);

        let result: BreakerResult<(), &str> = cb.execute(|| Err("nope"));
        assert_eq!(result, Err(BreakerError::Operation("nope")));
        assert_eq!(cb.counts().total_failures, 1);
        assert_eq!(cb.counts().requests, 1);
    }

    #[test]
    fn test_guard_records_failure_on_drop() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);

        let generation = cb.shared().before_request().expect("admitted");
        drop(CallGuard::new(cb.shared(), generation));

        let counts = cb.counts();
        assert_eq!(counts.total_failures, 1);
        assert_eq!(counts.consecutive_failures, 1);
    }

    #[test]
    fn test_finished_guard_records_once() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);

        let generation = cb.shared().before_request().expect("admitted");
        CallGuard::new(cb.shared(), generation).finish(true);

        let counts = cb.counts();
        assert_eq!(counts.total_successes, 1);
        assert_eq!(counts.total_failures, 0);
    }

    #[test]
    fn test_clones_share_state() {
        let clock = ManualClock::new();
        let cb = breaker(&clock);
        let other = cb.clone();

        for _ in 0..6 {
            let _ = other.execute(|| Err::<(), _>("down"));
        }
        assert_eq!(cb.state(), State::Open);
        assert_eq!(cb.name(), "test");
    }
}
