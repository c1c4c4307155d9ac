use criterion::{black_box, criterion_group, criterion_main, Criterion};
use epoch_breaker::{CircuitBreaker, Counts, TwoStepCircuitBreaker};
use std::error::Error;
use std::fmt;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
struct BenchError(String);

impl BenchError {
    fn new(msg: &str) -> Self {
        BenchError(msg.to_string())
    }
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Benchmark error: {}", self.0)
    }
}

impl Error for BenchError {}

fn successful_operation() -> Result<(), BenchError> {
    Ok(())
}

fn failing_operation() -> Result<(), BenchError> {
    Err(BenchError::new("Simulated failure"))
}

fn bench_circuit_breaker_closed(c: &mut Criterion) {
    let breaker = CircuitBreaker::builder()
        .timeout(Duration::from_secs(30))
        .build();

    c.bench_function("circuit_breaker_closed_success", |b| {
        b.iter(|| black_box(breaker.execute(successful_operation)));
    });
}

fn bench_two_step_closed(c: &mut Criterion) {
    let breaker = TwoStepCircuitBreaker::builder().build_two_step();

    c.bench_function("two_step_allow_done", |b| {
        b.iter(|| {
            if let Ok(done) = breaker.allow() {
                done.done(black_box(true));
            }
        });
    });
}

fn bench_circuit_breaker_open_rejection(c: &mut Criterion) {
    let breaker = CircuitBreaker::builder()
        .ready_to_trip(|counts: &Counts| counts.consecutive_failures >= 5)
        .timeout(Duration::from_secs(3600))
        .build();

    for _ in 0..5 {
        let _ = breaker.execute(failing_operation);
    }

    c.bench_function("circuit_breaker_open_rejection", |b| {
        b.iter(|| black_box(breaker.execute(successful_operation)));
    });
}

fn bench_circuit_breaker_concurrent(c: &mut Criterion) {
    use std::sync::{Arc, Barrier};
    use std::thread;

    let breaker = CircuitBreaker::builder()
        .ready_to_trip(|_: &Counts| false) // Never trip
        .timeout(Duration::from_secs(30))
        .build();

    const THREAD_COUNT: usize = 4;
    const ITERATIONS_PER_THREAD: usize = 1000;

    c.bench_function("circuit_breaker_concurrent", |b| {
        b.iter(|| {
            let barrier = Arc::new(Barrier::new(THREAD_COUNT + 1));
            let mut handles = Vec::with_capacity(THREAD_COUNT);

            for _ in 0..THREAD_COUNT {
                let thread_breaker = breaker.clone();
                let thread_barrier = Arc::clone(&barrier);

                handles.push(thread::spawn(move || {
                    thread_barrier.wait();
                    for _ in 0..ITERATIONS_PER_THREAD {
                        let _ = black_box(thread_breaker.execute(successful_operation));
                    }
                }));
            }

            // Start all threads simultaneously
            barrier.wait();

            for handle in handles {
                handle.join().unwrap();
            }
        });
    });
}

criterion_group!(
    benches,
    bench_circuit_breaker_closed,
    bench_two_step_closed,
    bench_circuit_breaker_open_rejection,
    bench_circuit_breaker_concurrent
);
criterion_main!(benches);
