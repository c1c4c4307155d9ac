//! Configuration for circuit breakers.

use std::sync::Arc;
use std::time::Duration;

use tracing::Span;

use crate::breaker::CircuitBreaker;
use crate::clock::{Clock, SystemClock};
use crate::hook::HookRegistry;
use crate::metrics::{MetricSink, NullMetricSink};
use crate::policy::{DefaultPolicy, TripPolicy};
use crate::state::State;
use crate::two_step::TwoStepCircuitBreaker;

/// Observer called with `(name, from, to)` on every transition.
pub type StateChangeFn = Arc<dyn Fn(&str, State, State) + Send + Sync + 'static>;

/// Open-state cooldown used when none (or zero) is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Settings a breaker is constructed from. Immutable once the breaker exists.
pub struct Settings<P = DefaultPolicy> {
    /// Diagnostic label passed to hooks, sinks and log events.
    pub name: String,
    /// Probe calls admitted while half-open. `0` is treated as `1`.
    pub max_requests: u32,
    /// Closed-state counting window. `Duration::ZERO` never resets by time.
    pub interval: Duration,
    /// Open-state cooldown. `Duration::ZERO` means [`DEFAULT_TIMEOUT`].
    pub timeout: Duration,
    /// Predicate evaluated after every failure while closed.
    pub ready_to_trip: P,
    /// Observer called on every transition, before the registry hooks.
    /// Independent of `hooks`, so a shared registry is never modified.
    pub on_state_change: Option<StateChangeFn>,
    /// Event hooks.
    pub hooks: Arc<HookRegistry>,
    /// Metrics destination.
    pub metric_sink: Arc<dyn MetricSink>,
    /// Time source for expiry checks.
    pub clock: Arc<dyn Clock>,
    /// Span log events are attached to. Defaults to a `circuit_breaker` span
    /// carrying the breaker name.
    pub span: Option<Span>,
}

impl Default for Settings<DefaultPolicy> {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_requests: 1,
            interval: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
            ready_to_trip: DefaultPolicy::default(),
            on_state_change: None,
            hooks: Arc::new(HookRegistry::new()),
            metric_sink: Arc::new(NullMetricSink),
            clock: Arc::new(SystemClock),
            span: None,
        }
    }
}

impl<P> Settings<P> {
    /// Effective half-open probe quota.
    pub(crate) fn effective_max_requests(&self) -> u32 {
        self.max_requests.max(1)
    }

    /// Effective closed-state window, `None` when counts never expire.
    pub(crate) fn effective_interval(&self) -> Option<Duration> {
        (!self.interval.is_zero()).then_some(self.interval)
    }

    /// Effective open-state cooldown.
    pub(crate) fn effective_timeout(&self) -> Duration {
        if self.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            self.timeout
        }
    }
}

/// Builder for creating circuit breakers with custom configurations.
pub struct BreakerBuilder<P = DefaultPolicy> {
    settings: Settings<P>,
}

impl Default for BreakerBuilder<DefaultPolicy> {
    fn default() -> Self {
        Self::new()
    }
}

impl BreakerBuilder<DefaultPolicy> {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            settings: Settings::default(),
        }
    }
}

impl<P> BreakerBuilder<P>
where
    P: TripPolicy,
{
    /// Sets the breaker name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.settings.name = name.into();
        self
    }

    /// Sets how many probe calls are admitted while half-open.
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.settings.max_requests = max_requests;
        self
    }

    /// Sets the closed-state window after which counts are cleared.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.settings.interval = interval;
        self
    }

    /// Sets the cooldown before an open circuit starts probing.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    /// Replaces the trip predicate. Accepts any [`TripPolicy`], including
    /// closures over [`Counts`](crate::Counts).
    pub fn ready_to_trip<Q: TripPolicy>(self, policy: Q) -> BreakerBuilder<Q> {
        let Settings {
            name,
            max_requests,
            interval,
            timeout,
            ready_to_trip: _,
            on_state_change,
            hooks,
            metric_sink,
            clock,
            span,
        } = self.settings;

        BreakerBuilder {
            settings: Settings {
                name,
                max_requests,
                interval,
                timeout,
                ready_to_trip: policy,
                on_state_change,
                hooks,
                metric_sink,
                clock,
                span,
            },
        }
    }

    /// Sets the observer called with `(name, from, to)` on every transition.
    pub fn on_state_change<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, State, State) + Send + Sync + 'static,
    {
        self.settings.on_state_change = Some(Arc::new(f));
        self
    }

    /// Sets a hook registry for the circuit breaker.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.settings.hooks = Arc::new(hooks);
        self
    }

    /// Sets a metric sink for the circuit breaker.
    pub fn metric_sink<M: MetricSink>(mut self, sink: M) -> Self {
        self.settings.metric_sink = Arc::new(sink);
        self
    }

    /// Sets the time source.
    pub fn clock<C: Clock>(mut self, clock: C) -> Self {
        self.settings.clock = Arc::new(clock);
        self
    }

    /// Attaches the breaker's log events to `span`.
    pub fn span(mut self, span: Span) -> Self {
        self.settings.span = Some(span);
        self
    }

    /// Returns the settings collected so far.
    pub fn into_settings(self) -> Settings<P> {
        self.settings
    }

    /// Builds a circuit breaker with the configured settings.
    pub fn build(self) -> CircuitBreaker<P> {
        CircuitBreaker::new(self.settings)
    }

    /// Builds a two-step circuit breaker with the configured settings.
    pub fn build_two_step(self) -> TwoStepCircuitBreaker<P> {
        TwoStepCircuitBreaker::new(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_are_normalised() {
        let settings = BreakerBuilder::new()
            .max_requests(0)
            .timeout(Duration::ZERO)
            .interval(Duration::ZERO)
            .into_settings();

        assert_eq!(settings.effective_max_requests(), 1);
        assert_eq!(settings.effective_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(settings.effective_interval(), None);
    }

    #[test]
    fn test_builder_keeps_settings_across_policy_change() {
        let settings = BreakerBuilder::new()
            .name("payments")
            .max_requests(3)
            .interval(Duration::from_secs(10))
            .ready_to_trip(|counts: &crate::Counts| counts.total_failures > 2)
            .timeout(Duration::from_secs(5))
            .into_settings();

        assert_eq!(settings.name, "payments");
        assert_eq!(settings.effective_max_requests(), 3);
        assert_eq!(settings.effective_interval(), Some(Duration::from_secs(10)));
        assert_eq!(settings.effective_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_observer_leaves_hook_registry_untouched() {
        let settings = BreakerBuilder::new()
            .hooks(HookRegistry::new())
            .on_state_change(|_, _, _| {})
            .into_settings();

        assert!(settings.on_state_change.is_some());
        assert!(format!("{:?}", settings.hooks).contains("on_state_change: false"));
    }
}
