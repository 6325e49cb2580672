use log::debug;
use std::time::Duration;
use tokio::time::Instant;

/// Paces fetches to a fixed interval without accumulating drift.
///
/// Ticks are scheduled at `start + n * interval`. When a cycle overruns so
/// far that the next tick is already in the past, the schedule restarts from
/// `now + interval` instead of firing a burst of catch-up ticks.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    next_tick: Instant,
    resyncs: u64,
}

impl Pacer {
    /// First tick is due immediately
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, first_tick: Instant) -> Self {
        Self {
            interval,
            next_tick: first_tick,
            resyncs: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Applies from the next `advance`
    pub fn set_interval(&mut self, interval: Duration) {
        if interval != self.interval {
            debug!("pacing interval {:?} -> {:?}", self.interval, interval);
            self.interval = interval;
        }
    }

    pub fn next_tick(&self) -> Instant {
        self.next_tick
    }

    /// Time left before the next tick, `None` if it is due
    pub fn until_next(&self, now: Instant) -> Option<Duration> {
        if now < self.next_tick {
            Some(self.next_tick - now)
        } else {
            None
        }
    }

    /// Move to the following tick after a fetch, successful or not
    pub fn advance(&mut self, now: Instant) {
        self.next_tick += self.interval;
        if self.next_tick < now {
            self.next_tick = now + self.interval;
            self.resyncs += 1;
        }
    }

    /// How many times the schedule was restarted after an overrun
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Sleep until the next tick is due
    pub async fn wait(&self) {
        tokio::time::sleep_until(self.next_tick).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_until_next_never_fetches_early() {
        let start = Instant::now();
        let pacer = Pacer::starting_at(Duration::from_millis(200), start + Duration::from_millis(200));

        assert_eq!(pacer.until_next(start), Some(Duration::from_millis(200)));
        assert_eq!(pacer.until_next(start + Duration::from_millis(150)), Some(Duration::from_millis(50)));
        assert_eq!(pacer.until_next(start + Duration::from_millis(200)), None);
    }

    #[test]
    fn test_advance_keeps_fixed_grid() {
        let start = Instant::now();
        let mut pacer = Pacer::starting_at(Duration::from_millis(100), start);

        // Late by 30ms, still on the original grid
        pacer.advance(start + Duration::from_millis(30));
        assert_eq!(pacer.next_tick(), start + Duration::from_millis(100));
        assert_eq!(pacer.resyncs(), 0);
    }
}
