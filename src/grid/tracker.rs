//! `PriceTracker`: detects price reversals against a running extremum.

const EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    TrackingUp,
    TrackingDown,
}

impl Default for TrackerState {
    fn default() -> Self {
        TrackerState::Idle
    }
}

/// A reversal of at least `callback_ratio` from the most recent extremum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Callback {
    /// Price fell back from a peak; carries `(peak, p)`.
    Down(f64, f64),
    /// Price rose back from a trough; carries `(trough, p)`.
    Up(f64, f64),
}

#[derive(Debug, Clone, Default)]
pub struct PriceTracker {
    pub state: TrackerState,
    pub peak: f64,
    pub trough: f64,
}

impl PriceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one tick. Returns a `Callback` if a reversal fired this tick.
    pub fn on_tick(&mut self, p: f64, center: f64, callback_ratio: f64) -> Option<Callback> {
        match self.state {
            TrackerState::Idle => {
                if p > center {
                    self.state = TrackerState::TrackingUp;
                    self.peak = p;
                } else if p < center {
                    self.state = TrackerState::TrackingDown;
                    self.trough = p;
                }
                None
            }
            TrackerState::TrackingUp => {
                if p >= self.peak - EPS {
                    self.peak = self.peak.max(p);
                    None
                } else if (self.peak - p) / self.peak >= callback_ratio {
                    let event = Callback::Down(self.peak, p);
                    self.state = TrackerState::TrackingDown;
                    self.trough = p;
                    Some(event)
                } else {
                    None
                }
            }
            TrackerState::TrackingDown => {
                if p <= self.trough + EPS {
                    self.trough = self.trough.min(p);
                    None
                } else if (p - self.trough) / self.trough >= callback_ratio {
                    let event = Callback::Up(self.trough, p);
                    self.state = TrackerState::TrackingUp;
                    self.peak = p;
                    Some(event)
                } else {
                    None
                }
            }
        }
    }

    /// Returns to `IDLE`, forgetting both extrema. The next tick re-seeds the
    /// tracker against the new center.
    pub fn reset(&mut self) {
        self.state = TrackerState::Idle;
        self.peak = 0.0;
        self.trough = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_seeds_on_first_tick_above_center() {
        let mut t = PriceTracker::new();
        assert!(t.on_tick(101.0, 100.0, 0.01).is_none());
        assert_eq!(t.state, TrackerState::TrackingUp);
        assert_eq!(t.peak, 101.0);
    }

    #[test]
    fn idle_seeds_on_first_tick_below_center() {
        let mut t = PriceTracker::new();
        assert!(t.on_tick(99.0, 100.0, 0.01).is_none());
        assert_eq!(t.state, TrackerState::TrackingDown);
        assert_eq!(t.trough, 99.0);
    }

    #[test]
    fn tracking_up_emits_callback_down_on_sufficient_pullback() {
        let mut t = PriceTracker::new();
        t.on_tick(105.1, 100.0, 0.05);
        assert_eq!(t.peak, 105.1);
        // pullback to 104.0: (105.1-104.0)/105.1 = 1.05% < 5%, no callback yet
        assert!(t.on_tick(104.0, 100.0, 0.05).is_none());
        assert_eq!(t.state, TrackerState::TrackingUp);
        // pullback to 99.5: (105.1-99.5)/105.1 = 5.33% >= 5%
        let cb = t.on_tick(99.5, 100.0, 0.05);
        assert_eq!(cb, Some(Callback::Down(105.1, 99.5)));
        assert_eq!(t.state, TrackerState::TrackingDown);
        assert_eq!(t.trough, 99.5);
    }

    #[test]
    fn tracking_down_emits_callback_up_on_sufficient_rally() {
        let mut t = PriceTracker::new();
        t.on_tick(18.5, 20.0, 0.005);
        assert_eq!(t.trough, 18.5);
        // (18.6-18.5)/18.5 = 0.54% >= 0.5%
        let cb = t.on_tick(18.6, 20.0, 0.005);
        assert_eq!(cb, Some(Callback::Up(18.5, 18.6)));
        assert_eq!(t.state, TrackerState::TrackingUp);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut t = PriceTracker::new();
        t.on_tick(105.0, 100.0, 0.05);
        t.reset();
        assert_eq!(t.state, TrackerState::Idle);
        assert_eq!(t.peak, 0.0);
        assert_eq!(t.trough, 0.0);
    }

    #[test]
    fn monotonic_ascent_keeps_updating_peak_without_callback() {
        let mut t = PriceTracker::new();
        for p in [101.0, 102.0, 103.0, 104.9] {
            assert!(t.on_tick(p, 100.0, 0.05).is_none());
        }
        assert_eq!(t.peak, 104.9);
        assert_eq!(t.state, TrackerState::TrackingUp);
    }
}
