//! # epoch-breaker
//!
//! A circuit breaker that counts outcomes per *generation* and advances its
//! state lazily on access, without timers or background threads.
//!
//! The breaker protects callers from repeatedly invoking an operation that is
//! likely to fail. It operates in three states:
//!
//! - **Closed**: calls pass through and outcomes are counted. After each failure
//!   a trip predicate looks at the counts and may open the circuit.
//! - **Open**: calls are rejected immediately. Once the timeout has elapsed the
//!   next access moves the circuit to half-open.
//! - **Half-Open**: up to `max_requests` probe calls are admitted. That many
//!   consecutive successes close the circuit; a single failure reopens it.
//!
//! Every transition (and every expiry of the closed-state interval) starts a new
//! generation with fresh counts. A call is admitted under a generation and its
//! outcome only counts if that generation is still current when it is reported,
//! so stragglers from before a transition never pollute the new counts.
//!
//! ## Basic Usage
//!
//! ```rust
//! use epoch_breaker::{BreakerError, CircuitBreaker};
//! use std::time::Duration;
//!
//! let breaker = CircuitBreaker::builder()
//!     .name("inventory")
//!     .max_requests(2)
//!     .timeout(Duration::from_secs(30))
//!     .build();
//!
//! match breaker.execute(|| -> Result<String, std::io::Error> { Ok("in stock".to_string()) }) {
//!     Ok(body) => println!("call succeeded: {}", body),
//!     Err(BreakerError::Open) => println!("circuit is open, call was prevented"),
//!     Err(BreakerError::TooManyRequests) => println!("probe quota used up, try again shortly"),
//!     Err(BreakerError::Operation(err)) => println!("call failed: {}", err),
//! }
//! ```
//!
//! ## Two-Step Usage
//!
//! When the outcome is only known later, ask for permission first and report
//! back through the returned token:
//!
//! ```rust
//! use epoch_breaker::TwoStepCircuitBreaker;
//!
//! let breaker = TwoStepCircuitBreaker::builder().name("uploads").build_two_step();
//!
//! if let Ok(done) = breaker.allow() {
//!     // ... hand `done` to whatever learns the outcome ...
//!     done.done(true);
//! }
//! ```
//!
//! ## Features
//!
//! - `async` - `execute_async` for futures; a dropped future counts as a failure
//! - `prometheus` - Prometheus metrics sink

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod clock;
mod config;
mod counts;
mod error;
mod hook;
mod metrics;
mod policy;
pub mod prelude;
mod state;
mod two_step;

// Re-exports
pub use breaker::CircuitBreaker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{BreakerBuilder, Settings, StateChangeFn, DEFAULT_TIMEOUT};
pub use counts::Counts;
pub use error::{BreakerError, BreakerResult};
pub use hook::HookRegistry;
#[cfg(feature = "prometheus")]
pub use metrics::PrometheusSink;
pub use metrics::{MetricSink, NullMetricSink};
pub use policy::{ConsecutiveFailures, DefaultPolicy, FailureRatio, TripPolicy};
pub use state::{Generation, State};
pub use two_step::{Done, TwoStepCircuitBreaker};
