//! Re-exports common types for convenient usage.
//!
//! # Example
//! ```rust,no_run
//! use epoch_breaker::prelude::*;
//!
//! let breaker = CircuitBreaker::builder().name("search").build();
//! assert_eq!(breaker.state(), State::Closed);
//! ```

pub use crate::{
    BreakerError, BreakerResult, CircuitBreaker, Counts, Done, State, TripPolicy,
    TwoStepCircuitBreaker,
};
