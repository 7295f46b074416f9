//! Band-crossing detector: tracks the signed grid band index and reports
//! crosses, subject to a cooldown shared across both directions.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossDirection {
    Down,
    Up,
}

/// Computes the signed band index `k = floor((p/center - 1)/price_interval)`.
pub fn band_index(price: f64, center: f64, price_interval: f64) -> i64 {
    ((price / center - 1.0) / price_interval).floor() as i64
}

#[derive(Debug, Clone, Default)]
pub struct BandCrossingDetector {
    last_k: Option<i64>,
    last_cross_at: Option<DateTime<Utc>>,
}

impl BandCrossingDetector {
    const COOLDOWN_SECS: i64 = 60;

    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one tick, returning a direction only when the band index moved
    /// and the per-symbol 60-second cooldown (any direction) has elapsed.
    pub fn on_tick(
        &mut self,
        price: f64,
        center: f64,
        price_interval: f64,
        now: DateTime<Utc>,
    ) -> Option<CrossDirection> {
        let k = band_index(price, center, price_interval);
        let previous = self.last_k.replace(k);

        let Some(prev_k) = previous else {
            return None;
        };
        if prev_k == k {
            return None;
        }

        let cooling_down = self
            .last_cross_at
            .is_some_and(|t| now - t < Duration::seconds(Self::COOLDOWN_SECS));
        if cooling_down {
            return None;
        }

        self.last_cross_at = Some(now);
        Some(if k < prev_k {
            CrossDirection::Down
        } else {
            CrossDirection::Up
        })
    }

    /// Forgets the last observed band index, used alongside `PriceTracker::reset`
    /// during a grid rebuild. Cooldown timestamp is preserved.
    pub fn reset_index(&mut self) {
        self.last_k = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn band_index_matches_worked_example() {
        // center=20, price_interval=0.05 (band width 1.00)
        assert_eq!(band_index(20.0, 20.0, 0.05), 0);
        assert_eq!(band_index(19.0, 20.0, 0.05), -1);
        assert_eq!(band_index(18.5, 20.0, 0.05), -2);
    }

    #[test]
    fn first_tick_never_crosses() {
        let mut d = BandCrossingDetector::new();
        assert_eq!(d.on_tick(20.0, 20.0, 0.05, t(0)), None);
    }

    #[test]
    fn downward_move_reports_down_outside_cooldown() {
        let mut d = BandCrossingDetector::new();
        d.on_tick(20.0, 20.0, 0.05, t(0));
        assert_eq!(d.on_tick(19.0, 20.0, 0.05, t(1)), Some(CrossDirection::Down));
    }

    #[test]
    fn second_cross_within_cooldown_is_suppressed() {
        let mut d = BandCrossingDetector::new();
        d.on_tick(20.0, 20.0, 0.05, t(0));
        assert_eq!(d.on_tick(19.0, 20.0, 0.05, t(1)), Some(CrossDirection::Down));
        // another cross 10s later, still within the 60s cooldown
        assert_eq!(d.on_tick(22.0, 20.0, 0.05, t(11)), None);
    }

    #[test]
    fn cross_after_cooldown_elapses_is_reported() {
        let mut d = BandCrossingDetector::new();
        d.on_tick(20.0, 20.0, 0.05, t(0));
        d.on_tick(19.0, 20.0, 0.05, t(1));
        assert_eq!(
            d.on_tick(22.0, 20.0, 0.05, t(62)),
            Some(CrossDirection::Up)
        );
    }
}
