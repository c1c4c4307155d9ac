//! Two-step circuit breaker: admission and outcome reporting happen on
//! separate code paths.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use crate::breaker::{BreakerInner, CircuitBreaker};
use crate::config::{BreakerBuilder, Settings};
use crate::counts::Counts;
use crate::error::BreakerError;
use crate::policy::{DefaultPolicy, TripPolicy};
use crate::state::{Generation, State};

/// A circuit breaker that hands out a [`Done`] token instead of running the
/// operation itself.
///
/// Use it when the outcome of a call becomes known later, on another task or
/// thread.
pub struct TwoStepCircuitBreaker<P = DefaultPolicy> {
    cb: CircuitBreaker<P>,
}

impl TwoStepCircuitBreaker<DefaultPolicy> {
    /// Creates a new builder; finish it with
    /// [`build_two_step`](BreakerBuilder::build_two_step).
    pub fn builder() -> BreakerBuilder<DefaultPolicy> {
        BreakerBuilder::new()
    }
}

impl<P> TwoStepCircuitBreaker<P>
where
    P: TripPolicy,
{
    /// Creates a new two-step circuit breaker from `settings`.
    pub fn new(settings: Settings<P>) -> Self {
        Self {
            cb: CircuitBreaker::new(settings),
        }
    }

    /// Returns the breaker's name.
    pub fn name(&self) -> &str {
        self.cb.name()
    }

    /// Returns the up-to-date state.
    pub fn state(&self) -> State {
        self.cb.state()
    }

    /// Returns the counts of the current generation.
    pub fn counts(&self) -> Counts {
        self.cb.counts()
    }

    /// Checks whether a call may proceed. On success the returned [`Done`]
    /// must be used to report how the call went.
    pub fn allow(&self) -> Result<Done<P>, BreakerError<Infallible>> {
        let inner = self.cb.shared();
        let generation = inner.before_request()?;

        Ok(Done {
            started: inner.now(),
            inner: Arc::clone(inner),
            generation,
            reported: false,
        })
    }
}

impl<P> From<CircuitBreaker<P>> for TwoStepCircuitBreaker<P> {
    fn from(cb: CircuitBreaker<P>) -> Self {
        Self { cb }
    }
}

impl<P> Clone for TwoStepCircuitBreaker<P> {
    fn clone(&self) -> Self {
        Self {
            cb: self.cb.clone(),
        }
    }
}

/// Completion token for a call admitted by [`TwoStepCircuitBreaker::allow`].
///
/// Reporting consumes the token. Dropping it without reporting leaves the
/// admitted slot counted but unresolved until the generation ends.
#[must_use = "report the call's outcome with `done`"]
pub struct Done<P = DefaultPolicy>
where
    P: TripPolicy,
{
    inner: Arc<BreakerInner<P>>,
    generation: Generation,
    started: Instant,
    reported: bool,
}

impl<P> Done<P>
where
    P: TripPolicy,
{
    /// Generation the call was admitted under.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Reports the call's outcome. A no-op if the breaker has moved to a new
    /// generation since the call was admitted.
    pub fn done(mut self, success: bool) {
        self.reported = true;
        self.inner.complete(self.generation, success, self.started);
    }
}

impl<P> Drop for Done<P>
where
    P: TripPolicy,
{
    fn drop(&mut self) {
        if !self.reported {
            tracing::debug!(
                parent: self.inner.span(),
                generation = %self.generation,
                "done token dropped without an outcome"
            );
        }
    }
}

impl<P> std::fmt::Debug for Done<P>
where
    P: TripPolicy,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Done")
            .field("generation", &self.generation)
            .field("reported", &self.reported)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn two_step(clock: &ManualClock, max_requests: u32) -> TwoStepCircuitBreaker {
        CircuitBreaker::builder()
            .name("two-step")
            .max_requests(max_requests)
            .clock(clock.clone())
            .build_two_step()
    }

    fn trip(cb: &TwoStepCircuitBreaker) {
        for _ in 0..6 {
            cb.allow().expect("closed").done(false);
        }
        assert_eq!(cb.state(), State::Open);
    }

    #[test]
    fn test_done_records_outcome() {
        let clock = ManualClock::new();
        let cb = two_step(&clock, 1);

        let done = cb.allow().expect("closed");
        assert_eq!(cb.counts().requests, 1);
        done.done(true);

        assert_eq!(cb.counts().total_successes, 1);
        assert_eq!(cb.name(), "two-step");
    }

    #[test]
    fn test_done_after_rollover_is_noop() {
        let clock = ManualClock::new();
        let cb = two_step(&clock, 1);

        let straggler = cb.allow().expect("closed");
        trip(&cb);

        clock.advance(Duration::from_secs(61));
        let probe = cb.allow().expect("half-open probe");
        assert_eq!(cb.state(), State::HalfOpen);

        straggler.done(false);
        assert_eq!(cb.state(), State::HalfOpen);

        probe.done(true);
        assert_eq!(cb.state(), State::Closed);
    }

    #[test]
    fn test_dropped_token_keeps_slot() {
        let clock = ManualClock::new();
        let cb = two_step(&clock, 1);
        trip(&cb);
        clock.advance(Duration::from_secs(61));

        drop(cb.allow().expect("half-open probe"));
        assert!(matches!(cb.allow(), Err(BreakerError::TooManyRequests)));
    }
}
