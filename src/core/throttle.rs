use std::time::Duration;
use tokio::time::Instant;

/// Frame rate assumed when a source cannot report one.
pub const FALLBACK_RATE: f64 = 30.0;

/// Caps how often a loop iterates.
///
/// Each [`tick`](Throttle::tick) sleeps for whatever is left of the target
/// interval since the previous tick. Overruns are not paid back: the next
/// interval is measured from when the late tick returned.
#[derive(Debug)]
pub struct Throttle {
    last_tick: Instant,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new()
    }
}

impl Throttle {
    pub fn new() -> Self {
        Self {
            last_tick: Instant::now(),
        }
    }

    /// The interval matching `rate` ticks per second, or [`FALLBACK_RATE`]
    /// when the rate is unknown, not a positive finite number, or so small
    /// that its interval does not fit in a `Duration`.
    pub fn interval_for_rate(rate: Option<f64>) -> Duration {
        rate.filter(|r| r.is_finite() && *r > 0.0)
            .and_then(|r| Duration::try_from_secs_f64(1.0 / r).ok())
            .unwrap_or_else(|| Duration::from_secs_f64(1.0 / FALLBACK_RATE))
    }

    /// Waits out the rest of `interval` and returns how long it slept.
    pub async fn tick(&mut self, interval: Duration) -> Duration {
        let elapsed = self.last_tick.elapsed();
        let remaining = interval.saturating_sub(elapsed);
        if !remaining.is_zero() {
            tokio::time::sleep(remaining).await;
        } else if !interval.is_zero() {
            log::trace!(
                "Iteration overran its interval ({:?} > {:?})",
                elapsed,
                interval
            );
        }
        self.last_tick = Instant::now();
        remaining
    }
}
