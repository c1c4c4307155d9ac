//! Error types for the circuit breaker library.

use std::convert::Infallible;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

/// Result type for circuit breaker operations.
pub type BreakerResult<T, E> = Result<T, BreakerError<E>>;

/// Error type for circuit breaker operations.
///
/// `Open` and `TooManyRequests` are rejections produced by the breaker itself;
/// the protected operation was not run. `Operation` carries the operation's own
/// error untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerError<E> {
    /// The circuit is open, calls are not permitted.
    Open,

    /// The circuit is half-open and its probe quota is used up.
    TooManyRequests,

    /// The underlying operation failed.
    Operation(E),
}

impl<E> BreakerError<E> {
    /// Returns `true` if the breaker refused to run the operation.
    pub fn is_rejection(&self) -> bool {
        matches!(self, BreakerError::Open | BreakerError::TooManyRequests)
    }

    /// Returns the operation's error, if that is what this is.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl BreakerError<Infallible> {
    /// Re-types an admission rejection for an operation's error type.
    pub(crate) fn lift<E>(self) -> BreakerError<E> {
        match self {
            BreakerError::Open => BreakerError::Open,
            BreakerError::TooManyRequests => BreakerError::TooManyRequests,
            BreakerError::Operation(never) => match never {},
        }
    }
}

impl<E> Display for BreakerError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BreakerError::Open => write!(f, "circuit breaker is open"),
            BreakerError::TooManyRequests => write!(f, "too many requests"),
            BreakerError::Operation(e) => write!(f, "operation error: {}", e),
        }
    }
}

impl<E: Error + 'static> Error for BreakerError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BreakerError::Operation(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_rejections() {
        assert!(BreakerError::<io::Error>::Open.is_rejection());
        assert!(BreakerError::<io::Error>::TooManyRequests.is_rejection());
        assert!(!BreakerError::Operation(io::Error::other("boom")).is_rejection());
    }

    #[test]
    fn test_operation_error_is_source() {
        let err = BreakerError::Operation(io::Error::other("boom"));
        assert_eq!(err.to_string(), "operation error: boom");
        assert_eq!(err.source().map(|e| e.to_string()).as_deref(), Some("boom"));
        assert_eq!(err.into_operation().map(|e| e.to_string()).as_deref(), Some("boom"));
    }
}
