//! A tour of every throttling mechanism.
//!
//! Run with:
//!
//! ```text
//! RUST_LOG=ratekeeper=debug cargo run --example strategies
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use ratekeeper::{
    Cost, CostVector, MultiThrottler, SyncThrottler, ThrottleRule, Throttler, WindowLimit,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    multi_rule().await?;
    fixed_delay().await?;
    token_bucket().await?;
    adaptive().await?;
    window_bound().await?;
    blocking_gate()?;

    Ok(())
}

/// Two budgets bind at once: request weight and order count.
async fn multi_rule() -> ratekeeper::Result<()> {
    println!("=== Multi-rule scheduler ===");
    let throttler = MultiThrottler::new(&[
        ThrottleRule::new("weight", 20.0, 0.01),
        ThrottleRule::new("orders", 3.0, 0.001),
    ])?;

    let start = Instant::now();
    for i in 1..=5 {
        throttler
            .throttle(CostVector::from([("weight", 2.0), ("orders", 1.0)]))?
            .await?;
        println!("order {i} admitted at {:?}", start.elapsed());
    }
    for (id, status) in throttler.status()? {
        println!("  {id}: {:.1}/{:.1} tokens", status.tokens, status.capacity);
    }
    Ok(())
}

async fn fixed_delay() -> ratekeeper::Result<()> {
    println!("=== Fixed delay ===");
    let mut throttler = Throttler::fixed_delay(Duration::from_millis(200));
    let start = Instant::now();
    for i in 1..=3 {
        throttler.throttle(Cost::Unit).await?;
        println!("request {i} released at {:?}", start.elapsed());
    }
    Ok(())
}

async fn token_bucket() -> ratekeeper::Result<()> {
    println!("=== Token bucket ===");
    let mut throttler = Throttler::bucket(5.0, 2.0)?;
    let start = Instant::now();
    for i in 1..=8 {
        throttler.throttle(Cost::Unit).await?;
        println!("request {i} released at {:?}", start.elapsed());
    }
    Ok(())
}

/// Simulated outcomes steer the delay up on errors, down on successes.
async fn adaptive() -> ratekeeper::Result<()> {
    println!("=== Adaptive backoff ===");
    let mut throttler =
        Throttler::adaptive(Duration::from_millis(100), Duration::from_secs(2))?;

    for i in 1..=6 {
        throttler.throttle(Cost::Unit).await?;
        let adaptive = throttler
            .as_adaptive_mut()
            .expect("configured as adaptive");
        if i % 2 == 0 {
            adaptive.on_error();
        } else {
            adaptive.on_success();
        }
        println!(
            "request {i} done, current delay {:?}",
            adaptive.current_delay()
        );
    }
    Ok(())
}

async fn window_bound() -> ratekeeper::Result<()> {
    println!("=== Window-bound ===");
    let mut throttler =
        Throttler::window_bound(WindowLimit::new(3.0, Duration::from_secs(2)))?;
    let start = Instant::now();
    for i in 1..=5 {
        throttler.throttle(Cost::Unit).await?;
        println!("request {i} released at {:?}", start.elapsed());
    }
    Ok(())
}

/// The blocking gate, shared by two plain threads.
fn blocking_gate() -> ratekeeper::Result<()> {
    println!("=== Blocking gate ===");
    let gate = Arc::new(SyncThrottler::new(Duration::from_millis(300)));
    let start = Instant::now();

    let handles: Vec<_> = (1..=2)
        .map(|i| {
            let gate = Arc::clone(&gate);
            std::thread::spawn(move || {
                gate.throttle(1.0);
                println!("thread {i} released at {:?}", start.elapsed());
            })
        })
        .collect();
    for handle in handles {
        let _ = handle.join();
    }
    Ok(())
}
