//! Per-generation call tallies.

/// Outcome tallies for the breaker's current generation.
///
/// Cleared whenever a new generation begins. `requests` counts admitted calls,
/// so it can run ahead of `total_successes + total_failures` while calls are in
/// flight or when an admitted call never reports back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Calls admitted in this generation.
    pub requests: u32,
    /// Successful outcomes recorded in this generation.
    pub total_successes: u32,
    /// Failed outcomes recorded in this generation.
    pub total_failures: u32,
    /// Successes since the last failure.
    pub consecutive_successes: u32,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl Counts {
    /// Creates an empty tally.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub(crate) fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    pub(crate) fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Outcomes recorded so far (successes plus failures).
    pub fn completed(&self) -> u32 {
        self.total_successes.saturating_add(self.total_failures)
    }

    /// Fraction of recorded outcomes that failed, `0.0` when nothing was recorded.
    pub fn failure_ratio(&self) -> f64 {
        let total = self.completed();
        if total == 0 {
            return 0.0;
        }

        self.total_failures as f64 / total as f64
    }
}
