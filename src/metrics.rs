//! Metric sinks that receive circuit breaker events.

use std::time::Duration;

use crate::state::{Generation, State};

/// Trait for metrics sinks that can receive circuit breaker events.
///
/// Sinks are called outside the breaker's lock. Events from one thread arrive
/// in order, but transitions made on different threads may be delivered out of
/// order. `generation` increases with every transition of a breaker, so a sink
/// tracking the current state should keep the highest one it has seen.
pub trait MetricSink: Send + Sync + 'static {
    /// Records a state transition event. `generation` is the one started by
    /// the transition.
    fn record_state_transition(&self, name: &str, from: State, to: State, generation: Generation);

    /// Records a call the breaker refused to run.
    fn record_rejection(&self, name: &str, state: State);

    /// Records the outcome of a call that was run.
    fn record_call(&self, name: &str, success: bool, duration: Duration);
}

/// A null metrics sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMetricSink;

impl MetricSink for NullMetricSink {
    fn record_state_transition(&self, _: &str, _: State, _: State, _: Generation) {}
    fn record_rejection(&self, _name: &str, _state: State) {}
    fn record_call(&self, _name: &str, _success: bool, _duration: Duration) {}
}

#[cfg(feature = "prometheus")]
pub use self::prometheus::PrometheusSink;

#[cfg(feature = "prometheus")]
mod prometheus {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use prometheus_client::encoding::EncodeLabelSet;
    use prometheus_client::metrics::counter::Counter;
    use prometheus_client::metrics::family::Family;
    use prometheus_client::metrics::gauge::Gauge;
    use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
    use prometheus_client::registry::Registry;

    use super::MetricSink;
    use crate::state::{Generation, State};

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct TransitionLabels {
        breaker: String,
        from: String,
        to: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct BreakerLabels {
        breaker: String,
        state: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct CallLabels {
        breaker: String,
        outcome: String,
    }

    #[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
    struct NameLabels {
        breaker: String,
    }

    /// Exports breaker events as Prometheus metrics.
    ///
    /// Metrics are labelled with the breaker name, so one sink can be shared by
    /// several breakers.
    #[derive(Clone)]
    pub struct PrometheusSink {
        transitions: Family<TransitionLabels, Counter>,
        rejections: Family<BreakerLabels, Counter>,
        calls: Family<CallLabels, Counter>,
        call_duration: Family<NameLabels, Histogram>,
        state: Family<NameLabels, Gauge>,
        latest: Arc<Mutex<HashMap<String, Generation>>>,
    }

    fn state_value(state: State) -> i64 {
        match state {
            State::Closed => 0,
            State::HalfOpen => 1,
            State::Open => 2,
        }
    }

    impl PrometheusSink {
        /// Creates a sink and registers its metrics under `registry`.
        pub fn new(registry: &mut Registry) -> Self {
            let sink = Self {
                transitions: Family::default(),
                rejections: Family::default(),
                calls: Family::default(),
                call_duration: Family::new_with_constructor(|| {
                    Histogram::new(exponential_buckets(0.001, 2.0, 14))
                }),
                state: Family::default(),
                latest: Arc::default(),
            };

            registry.register(
                "circuit_breaker_transitions",
                "State transitions by breaker",
                sink.transitions.clone(),
            );
            registry.register(
                "circuit_breaker_rejections",
                "Calls rejected without running",
                sink.rejections.clone(),
            );
            registry.register(
                "circuit_breaker_calls",
                "Calls run through the breaker by outcome",
                sink.calls.clone(),
            );
            registry.register(
                "circuit_breaker_call_duration_seconds",
                "Duration of calls run through the breaker",
                sink.call_duration.clone(),
            );
            registry.register(
                "circuit_breaker_state",
                "Current state (0 closed, 1 half-open, 2 open)",
                sink.state.clone(),
            );

            sink
        }
    }

    impl MetricSink for PrometheusSink {
        fn record_state_transition(
            &self,
            name: &str,
            from: State,
            to: State,
            generation: Generation,
        ) {
            self.transitions
                .get_or_create(&TransitionLabels {
                    breaker: name.to_owned(),
                    from: from.as_str().to_owned(),
                    to: to.as_str().to_owned(),
                })
                .inc();

            // A late replay of an older transition must not overwrite the gauge.
            let mut latest = self.latest.lock();
            let seen = latest.entry(name.to_owned()).or_insert(Generation::ZERO);
            if generation > *seen {
                *seen = generation;
                self.state
                    .get_or_create(&NameLabels {
                        breaker: name.to_owned(),
                    })
                    .set(state_value(to));
            }
        }

        fn record_rejection(&self, name: &str, state: State) {
            self.rejections
                .get_or_create(&BreakerLabels {
                    breaker: name.to_owned(),
                    state: state.as_str().to_owned(),
                })
                .inc();
        }

        fn record_call(&self, name: &str, success: bool, duration: Duration) {
            let outcome = if success { "success" } else { "failure" };
            self.calls
                .get_or_create(&CallLabels {
                    breaker: name.to_owned(),
                    outcome: outcome.to_owned(),
                })
                .inc();
            self.call_duration
                .get_or_create(&NameLabels {
                    breaker: name.to_owned(),
                })
                .observe(duration.as_secs_f64());
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use prometheus_client::encoding::text::encode;

        #[test]
        fn test_prometheus_sink_exports_transitions() {
            let mut registry = Registry::default();
            let sink = PrometheusSink::new(&mut registry);

            sink.record_state_transition("db", State::Closed, State::Open, Generation::ZERO.next());
            sink.record_rejection("db", State::Open);
            sink.record_call("db", false, Duration::from_millis(3));

            let mut out = String::new();
            encode(&mut out, &registry).expect("encode registry");
            assert!(out.contains("circuit_breaker_transitions_total"));
            assert!(out.contains("from=\"closed\""));
            assert!(out.contains("circuit_breaker_state{breaker=\"db\"} 2"));
        }

        #[test]
        fn test_state_gauge_ignores_late_transitions() {
            let mut registry = Registry::default();
            let sink = PrometheusSink::new(&mut registry);
            let half_open = Generation::ZERO.next().next();
            let reopened = half_open.next();

            // Delivered out of order by two racing threads.
            sink.record_state_transition("db", State::HalfOpen, State::Open, reopened);
            sink.record_state_transition("db", State::Open, State::HalfOpen, half_open);

            let mut out = String::new();
            encode(&mut out, &registry).expect("encode registry");
            assert!(out.contains("circuit_breaker_state{breaker=\"db\"} 2"));
            assert!(out.contains("to=\"half-open\""));
        }
    }
}
