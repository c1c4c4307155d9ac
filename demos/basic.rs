use epoch_breaker::{BreakerError, CircuitBreaker, Counts};
use std::error::Error;
use std::fmt;
use std::thread;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl Error for ServiceError {}

fn call_service(counter: &mut u32) -> Result<String, ServiceError> {
    *counter += 1;
    if (4..=9).contains(counter) {
        Err(ServiceError("External service error".to_string()))
    } else {
        Ok("Success".to_string())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let breaker = CircuitBreaker::builder()
        .name("inventory")
        .max_requests(2) // Two probes when half-open
        .timeout(Duration::from_secs(2))
        .ready_to_trip(|counts: &Counts| counts.requests >= 3 && counts.failure_ratio() >= 0.6)
        .on_state_change(|name, from, to| println!("[{}] {} -> {}", name, from, to))
        .build();

    println!("Circuit initial state: {}", breaker.state());

    let mut calls = 0;
    for i in 1..=20 {
        match breaker.execute(|| call_service(&mut calls)) {
            Ok(result) => println!("Attempt {}: call succeeded with result: {}", i, result),
            Err(BreakerError::Open) => println!("Attempt {}: circuit is open", i),
            Err(BreakerError::TooManyRequests) => {
                println!("Attempt {}: probe quota used up", i)
            }
            Err(BreakerError::Operation(err)) => println!("Attempt {}: call failed: {}", i, err),
        }

        let counts = breaker.counts();
        println!(
            "  state={} requests={} failures={}",
            breaker.state(),
            counts.requests,
            counts.total_failures
        );

        thread::sleep(Duration::from_millis(300));
    }
}
