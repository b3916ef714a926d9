//! Tick time snapshots and the wall-clock sampler

use crate::config::DEFAULT_TICK_INTERVAL;
use log::warn;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Smoothing factor of the rolling `dt` average
pub const DT_SMOOTHING: f64 = 0.3;

/// Current wall-clock time in UTC seconds
pub fn utc_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs_f64()
}

pub fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

/// Immutable time snapshot for one tick.
///
/// A new snapshot is produced per tick with [`Time::advanced`] and handed
/// down the whole call graph of that tick. Prediction buffers keep copies so
/// replayed updates see exactly the time the original update saw.
///
/// All values are in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Time {
    current: f64,
    start: f64,
    total: f64,
    dt: f64,
    dt_average: f64,
    last: f64,
}

impl Time {
    pub fn new(start: f64) -> Self {
        Self::with_interval(start, DEFAULT_TICK_INTERVAL)
    }

    /// Creates a snapshot whose `dt` and rolling average start at `interval`
    pub fn with_interval(start: f64, interval: f64) -> Self {
        Self {
            current: start,
            start,
            total: 0.0,
            dt: interval,
            dt_average: interval,
            last: start,
        }
    }

    /// Snapshot of the wall clock right now
    pub fn now() -> Self {
        Self::new(utc_seconds())
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn dt_average(&self) -> f64 {
        self.dt_average
    }

    pub fn last(&self) -> f64 {
        self.last
    }

    /// Returns the snapshot that follows this one at time `now`.
    ///
    /// A sample older than `current` is ignored and this snapshot is
    /// returned unchanged.
    #[must_use]
    pub fn advanced(&self, now: f64) -> Self {
        if now < self.current {
            warn!(
                "New time {:.4} is older than current time {:.4}, keeping previous tick time",
                now, self.current
            );
            return *self;
        }

        let dt = now - self.current;
        Self {
            current: now,
            start: self.start,
            total: now - self.start,
            dt,
            dt_average: lerp(self.dt_average, dt, DT_SMOOTHING),
            last: self.current,
        }
    }
}

impl Default for Time {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_time_creation() {
        let time = Time::new(100.0);
        assert_eq!(time.current(), 100.0);
        assert_eq!(time.start(), 100.0);
        assert_eq!(time.total(), 0.0);
        assert_eq!(time.dt(), DEFAULT_TICK_INTERVAL);
        assert_eq!(time.dt_average(), DEFAULT_TICK_INTERVAL);
    }

    #[test]
    fn test_advance_is_copy_on_write() {
        let time = Time::new(10.0);
        let next = time.advanced(10.5);

        assert_eq!(time.current(), 10.0);
        assert_eq!(next.current(), 10.5);
        assert_eq!(next.last(), 10.0);
        assert_approx_eq!(next.dt(), 0.5, 1e-12);
        assert_approx_eq!(next.total(), 0.5, 1e-12);
    }

    #[test]
    fn test_rolling_average() {
        let time = Time::with_interval(0.0, 0.1).advanced(1.1);
        // 0.1 + (1.1 - 0.1) * 0.3
        assert_approx_eq!(time.dt_average(), 0.4, 1e-12);

        let steady = Time::with_interval(0.0, 1.0).advanced(1.0).advanced(2.0);
        assert_approx_eq!(steady.dt_average(), 1.0, 1e-12);
    }

    #[test]
    fn test_backwards_time_is_ignored() {
        let time = Time::new(5.0).advanced(6.0);
        let same = time.advanced(5.5);
        assert_eq!(same, time);
    }

    #[test]
    fn test_lerp() {
        assert_approx_eq!(lerp(0.0, 10.0, 0.3), 3.0, 1e-12);
        assert_approx_eq!(lerp(2.0, 2.0, 0.7), 2.0, 1e-12);
    }

    #[test]
    fn test_utc_seconds_increases() {
        let first = utc_seconds();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = utc_seconds();
        assert!(second > first);
    }
}
