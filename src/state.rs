//! Circuit breaker state machine implementation.
//!
//! [`StateMachine`] holds everything the breaker guards with its lock. It never
//! reads the clock itself: every method takes `now`, and expiry is evaluated
//! lazily on each access instead of by a timer.

use smallvec::SmallVec;
use std::convert::Infallible;
use std::fmt::{self, Display, Formatter};
use std::time::{Duration, Instant};

use crate::counts::Counts;
use crate::error::BreakerError;
use crate::policy::TripPolicy;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    /// Circuit is closed and operations are allowed.
    #[default]
    Closed,

    /// Circuit is allowing a limited number of probe operations to test recovery.
    HalfOpen,

    /// Circuit is open and operations are rejected.
    Open,
}

impl State {
    /// Returns the lowercase label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::HalfOpen => "half-open",
            State::Open => "open",
        }
    }
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one counting epoch of a breaker.
///
/// A generation is handed out when a call is admitted and must be handed back
/// when its outcome is reported. Outcomes carrying a generation that has since
/// been superseded are dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    pub(crate) const ZERO: Generation = Generation(0);

    pub(crate) fn next(self) -> Generation {
        Generation(self.0.wrapping_add(1))
    }

    /// Raw epoch number, useful for logging.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl Display for Generation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transitions `(from, to, generation)` applied during one critical section,
/// replayed to hooks once the lock is released. `generation` is the one the
/// transition started.
pub(crate) type Transitions = SmallVec<[(State, State, Generation); 2]>;

/// Lock-protected state of a breaker.
#[derive(Debug)]
pub(crate) struct StateMachine {
    state: State,
    generation: Generation,
    counts: Counts,
    expiry: Option<Instant>,
    max_requests: u32,
    interval: Option<Duration>,
    timeout: Duration,
}

impl StateMachine {
    /// Creates a closed machine. Construction opens the first generation.
    pub(crate) fn new(
        max_requests: u32,
        interval: Option<Duration>,
        timeout: Duration,
        now: Instant,
    ) -> Self {
        let mut machine = Self {
            state: State::Closed,
            generation: Generation::ZERO,
            counts: Counts::new(),
            expiry: None,
            max_requests: max_requests.max(1),
            interval,
            timeout,
        };
        machine.to_new_generation(now);
        machine
    }

    pub(crate) fn counts(&self) -> Counts {
        self.counts
    }

    /// Applies any expiry that has passed and returns the up-to-date state
    /// and generation.
    pub(crate) fn current_state(
        &mut self,
        now: Instant,
        transitions: &mut Transitions,
    ) -> (State, Generation) {
        match self.state {
            State::Closed => {
                if matches!(self.expiry, Some(expiry) if expiry < now) {
                    self.to_new_generation(now);
                }
            }
            State::Open => {
                if matches!(self.expiry, Some(expiry) if expiry < now) {
                    self.set_state(State::HalfOpen, now, transitions);
                }
            }
            State::HalfOpen => {}
        }

        (self.state, self.generation)
    }

    /// Admission check. On success the call is counted and its generation
    /// returned.
    pub(crate) fn before_request(
        &mut self,
        now: Instant,
        transitions: &mut Transitions,
    ) -> Result<Generation, BreakerError<Infallible>> {
        let (state, generation) = self.current_state(now, transitions);

        match state {
            State::Open => Err(BreakerError::Open),
            State::HalfOpen if self.counts.requests >= self.max_requests => {
                Err(BreakerError::TooManyRequests)
            }
            _ => {
                self.counts.on_request();
                Ok(generation)
            }
        }
    }

    /// Records the outcome of a call admitted under `before`. Returns `false`
    /// if the outcome was discarded because its generation is stale.
    pub(crate) fn after_request<P: TripPolicy + ?Sized>(
        &mut self,
        before: Generation,
        success: bool,
        policy: &P,
        now: Instant,
        transitions: &mut Transitions,
    ) -> bool {
        let (state, generation) = self.current_state(now, transitions);
        if generation != before {
            return false;
        }

        if success {
            self.on_success(state, now, transitions);
        } else {
            self.on_failure(state, policy, now, transitions);
        }
        true
    }

    fn on_success(&mut self, state: State, now: Instant, transitions: &mut Transitions) {
        match state {
            State::Closed => self.counts.on_success(),
            State::HalfOpen => {
                self.counts.on_success();
                if self.counts.consecutive_successes >= self.max_requests {
                    self.set_state(State::Closed, now, transitions);
                }
            }
            State::Open => {}
        }
    }

    fn on_failure<P: TripPolicy + ?Sized>(
        &mut self,
        state: State,
        policy: &P,
        now: Instant,
        transitions: &mut Transitions,
    ) {
        match state {
            State::Closed => {
                self.counts.on_failure();
                if policy.ready_to_trip(&self.counts) {
                    self.set_state(State::Open, now, transitions);
                }
            }
            State::HalfOpen => self.set_state(State::Open, now, transitions),
            State::Open => {}
        }
    }

    /// Moves to `state`, starting a new generation. A no-op if already there.
    pub(crate) fn set_state(&mut self, state: State, now: Instant, transitions: &mut Transitions) {
        if self.state == state {
            return;
        }

        let from = self.state;
        self.state = state;
        self.to_new_generation(now);
        transitions.push((from, state, self.generation));
    }

    fn to_new_generation(&mut self, now: Instant) {
        self.generation = self.generation.next();
        self.counts.clear();
        self.expiry = match self.state {
            State::Closed => self.interval.and_then(|interval| now.checked_add(interval)),
            // Unrepresentable deadline: stays open.
            State::Open => now.checked_add(self.timeout),
            State::HalfOpen => None,
        };
    }
}
