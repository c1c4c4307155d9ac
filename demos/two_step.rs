//! Reports outcomes from worker threads through the two-step API.

use epoch_breaker::{BreakerError, TwoStepCircuitBreaker};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

fn main() {
    tracing_subscriber::fmt().init();

    let breaker = TwoStepCircuitBreaker::builder()
        .name("uploads")
        .timeout(Duration::from_secs(1))
        .build_two_step();

    let (tx, rx) = mpsc::channel();

    for job in 0..12u32 {
        match breaker.allow() {
            Ok(done) => {
                let tx = tx.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(50));
                    // Jobs 2 through 8 fail.
                    let success = !(2..=8).contains(&job);
                    done.done(success);
                    let _ = tx.send((job, success));
                });
            }
            Err(BreakerError::Open) => println!("job {}: rejected, circuit open", job),
            Err(err) => println!("job {}: rejected, {}", job, err),
        }
        thread::sleep(Duration::from_millis(100));
    }
    drop(tx);

    for (job, success) in rx {
        println!("job {} finished, success = {}", job, success);
    }
    println!("final state: {}", breaker.state());
}
