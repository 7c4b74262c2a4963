//! Tunables for continuous-state replication.

use std::time::Duration;

use serde::Deserialize;

use crate::config::millis;

/// Settings shared by every sync channel of a session.
///
/// # Default Values
/// - `freshness_window`: 1 second
/// - `fast_interval`: 16 milliseconds, used while the surface moves quickly
/// - `slow_interval`: 100 milliseconds, used otherwise
/// - `velocity_threshold`: 1.0 surface fractions per second
/// - `smooth_threshold_px`: 300 pixels
/// - `extent_tolerance`: 5 % relative difference
/// - `suppress_window`: 150 milliseconds
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReplicationConfig {
    /// Largest age an inbound update may have and still be applied.
    #[serde(with = "millis")]
    pub freshness_window: Duration,
    /// Send interval while velocity is at or above the threshold.
    #[serde(with = "millis")]
    pub fast_interval: Duration,
    /// Send interval while velocity is below the threshold.
    #[serde(with = "millis")]
    pub slow_interval: Duration,
    /// Velocity separating fast from slow movement.
    pub velocity_threshold: f64,
    /// Largest jump, in pixels, applied with animation.
    pub smooth_threshold_px: f64,
    /// Relative extent difference beyond which pixel values stop being
    /// comparable.
    pub extent_tolerance: f64,
    /// How long local changes are held back after a remote update was
    /// applied.
    #[serde(with = "millis")]
    pub suppress_window: Duration,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            freshness_window: Duration::from_secs(1),
            fast_interval: Duration::from_millis(16),
            slow_interval: Duration::from_millis(100),
            velocity_threshold: 1.0,
            smooth_threshold_px: 300.0,
            extent_tolerance: 0.05,
            suppress_window: Duration::from_millis(150),
        }
    }
}

impl ReplicationConfig {
    /// Clamp values to usable bounds.
    ///
    /// Intervals are at least one millisecond and `fast_interval` never
    /// exceeds `slow_interval`. Non-finite or negative thresholds fall back
    /// to their defaults.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        self.fast_interval = self.fast_interval.max(Duration::from_millis(1));
        self.slow_interval = self.slow_interval.max(Duration::from_millis(1));
        if self.fast_interval > self.slow_interval {
            std::mem::swap(&mut self.fast_interval, &mut self.slow_interval);
        }
        self.velocity_threshold = non_negative(self.velocity_threshold, defaults.velocity_threshold);
        self.smooth_threshold_px =
            non_negative(self.smooth_threshold_px, defaults.smooth_threshold_px);
        self.extent_tolerance =
            non_negative(self.extent_tolerance, defaults.extent_tolerance).min(1.0);
        self
    }

    /// Send interval for the observed `velocity`.
    #[must_use]
    pub fn interval_for(&self, velocity: f64) -> Duration {
        if velocity >= self.velocity_threshold {
            self.fast_interval
        } else {
            self.slow_interval
        }
    }
}

fn non_negative(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn normalized_orders_intervals() {
        let cfg = ReplicationConfig {
            fast_interval: Duration::from_millis(200),
            slow_interval: Duration::ZERO,
            ..ReplicationConfig::default()
        }
        .normalized();
        assert_eq!(cfg.fast_interval, Duration::from_millis(1));
        assert_eq!(cfg.slow_interval, Duration::from_millis(200));
    }

    #[test]
    fn normalized_replaces_unusable_thresholds() {
        let cfg = ReplicationConfig {
            velocity_threshold: f64::NAN,
            smooth_threshold_px: -1.0,
            extent_tolerance: 4.0,
            ..ReplicationConfig::default()
        }
        .normalized();
        assert!((cfg.velocity_threshold - 1.0).abs() < f64::EPSILON);
        assert!((cfg.smooth_threshold_px - 300.0).abs() < f64::EPSILON);
        assert!((cfg.extent_tolerance - 1.0).abs() < f64::EPSILON);
    }

    #[rstest]
    #[case(0.0, 100)]
    #[case(0.99, 100)]
    #[case(1.0, 16)]
    #[case(12.0, 16)]
    fn interval_follows_velocity(#[case] velocity: f64, #[case] expected_ms: u64) {
        let cfg = ReplicationConfig::default();
        assert_eq!(cfg.interval_for(velocity), Duration::from_millis(expected_ms));
    }
}
