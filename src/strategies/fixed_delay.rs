use std::time::Duration;

/// The simplest pacing strategy: every call suspends for the same fixed
/// delay, regardless of cost.
///
/// Useful against services that document a plain "one request per N ms"
/// policy, or as a blunt instrument while reverse-engineering an
/// undocumented one.
#[derive(Debug, Clone)]
pub struct FixedDelayThrottler {
    delay: Duration,
}

impl FixedDelayThrottler {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    /// Suspend for the configured delay.
    pub async fn throttle(&self) {
        tokio::time::sleep(self.delay).await;
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn every_call_waits_the_same_delay() {
        let throttler = FixedDelayThrottler::new(Duration::from_millis(250));
        let start = Instant::now();
        throttler.throttle().await;
        throttler.throttle().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(550));
    }
}
