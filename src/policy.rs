//! Trip predicates deciding when a closed circuit should open.

use crate::counts::Counts;

/// Decides, from the current generation's counts, whether a closed circuit
/// should trip open.
///
/// Evaluated after every failure recorded while closed, with the breaker's
/// lock held. Implementations must not call back into the breaker.
pub trait TripPolicy: Send + Sync + 'static {
    /// Returns `true` if the circuit should open.
    fn ready_to_trip(&self, counts: &Counts) -> bool;
}

impl<F> TripPolicy for F
where
    F: Fn(&Counts) -> bool + Send + Sync + 'static,
{
    fn ready_to_trip(&self, counts: &Counts) -> bool {
        self(counts)
    }
}

/// Trips once consecutive failures strictly exceed a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsecutiveFailures(pub u32);

impl TripPolicy for ConsecutiveFailures {
    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.consecutive_failures > self.0
    }
}

/// The default predicate: more than five consecutive failures.
pub type DefaultPolicy = ConsecutiveFailures;

impl Default for ConsecutiveFailures {
    fn default() -> Self {
        ConsecutiveFailures(5)
    }
}

/// Trips when the failure ratio of the generation reaches a threshold, once
/// enough calls have been admitted to make the ratio meaningful.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureRatio {
    min_requests: u32,
    ratio: f64,
}

impl FailureRatio {
    /// Creates a ratio policy. `ratio` is clamped into `0.0..=1.0`.
    pub fn new(min_requests: u32, ratio: f64) -> Self {
        Self {
            min_requests,
            ratio: ratio.clamp(0.0, 1.0),
        }
    }
}

impl TripPolicy for FailureRatio {
    fn ready_to_trip(&self, counts: &Counts) -> bool {
        counts.requests >= self.min_requests && counts.failure_ratio() >= self.ratio
    }
}
