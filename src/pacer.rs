//! Fixed-rate tick clock for driving a detector outside a game/render loop.

use std::thread;
use std::time::{Duration, Instant};

/// Convert a wall-clock duration into a whole number of ticks at `rate_hz` (at least one).
pub fn ticks_for(duration: Duration, rate_hz: u32) -> u32 {
    let ticks = (duration.as_secs_f64() * rate_hz as f64).round();
    (ticks as u32).max(1)
}

/// Sleeps until successive tick boundaries.
///
/// After an overrun (a tick that took longer than the period) the schedule restarts from
/// "now" instead of firing a burst of catch-up ticks.
#[derive(Debug)]
pub struct TickPacer {
    period: Duration,
    next: Instant,
}

impl TickPacer {
    /// A pacer ticking `rate_hz` times per second. A zero rate is treated as 1 Hz.
    pub fn new(rate_hz: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / rate_hz.max(1) as f64);
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Block until the next tick boundary.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if self.next > now {
            thread::sleep(self.next - now);
            self.next += self.period;
        } else {
            self.next = now + self.period;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_durations_to_ticks() {
        assert_eq!(ticks_for(Duration::from_secs(2), 60), 120);
        assert_eq!(ticks_for(Duration::from_millis(250), 60), 15);
        assert_eq!(ticks_for(Duration::ZERO, 60), 1);
    }

    #[test]
    fn period_matches_rate() {
        let pacer = TickPacer::new(100);
        assert_eq!(pacer.period(), Duration::from_millis(10));
    }

    #[test]
    fn wait_does_not_return_early() {
        let mut pacer = TickPacer::new(200);
        let start = Instant::now();
        pacer.wait();
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_millis(9));
    }

    #[test]
    fn overrun_does_not_burst() {
        let mut pacer = TickPacer::new(1000);
        thread::sleep(Duration::from_millis(20));
        pacer.wait();

        let start = Instant::now();
        pacer.wait();
        assert!(start.elapsed() >= Duration::from_micros(500));
    }
}
