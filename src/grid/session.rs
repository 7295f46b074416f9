//! `GridSession`: the live grid-trading state for one symbol, advanced one
//! tick at a time by `GridEngine::on_tick`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::grid::band::{BandCrossingDetector, CrossDirection};
use crate::grid::config::{GridConfig, GridStats, SessionStatus};
use crate::grid::tracker::{Callback, PriceTracker};
use crate::models::{IntentReason, Side, Tick, TradeIntent};

const MIN_TRADE_LOT: i64 = 100;
const MIN_TRADE_AMOUNT: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Armed {
    Buy,
    Sell,
}

pub struct GridSession {
    pub session_id: String,
    pub symbol: String,
    pub status: SessionStatus,
    pub center_price: f64,
    pub current_center_price: f64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_days: i64,
    pub config: GridConfig,
    pub stats: GridStats,
    pub last_exit_reason: Option<String>,
    pub tracker: PriceTracker,
    pub consecutive_tick_failures: u32,

    band: BandCrossingDetector,
    armed: Option<Armed>,
    armed_band_index: i64,
}

/// What happened on one `OnTick` call: signals to submit, whether the
/// session exited, and whether a rebuild occurred (informational, for logs).
#[derive(Debug, Default)]
pub struct TickOutcome {
    pub intents: Vec<TradeIntent>,
    pub exited: Option<(SessionStatus, &'static str)>,
    pub rebuilt: bool,
}

impl GridSession {
    pub fn start(
        symbol: String,
        center_price: f64,
        duration_days: i64,
        config: GridConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            symbol,
            status: SessionStatus::Active,
            center_price,
            current_center_price: center_price,
            start_time: now,
            end_time: now + ChronoDuration::days(duration_days),
            duration_days,
            config,
            stats: GridStats::default(),
            last_exit_reason: None,
            tracker: PriceTracker::new(),
            consecutive_tick_failures: 0,
            band: BandCrossingDetector::new(),
            armed: None,
            armed_band_index: 0,
        }
    }

    /// Reconstructs a session from persisted fields, used both by
    /// `PersistenceStore::load_*_grid_sessions` and by recovery at startup.
    /// Transient fields (`PriceTracker`, the band detector, arm state) start
    /// fresh: the next tick re-seeds them, per the recovery contract.
    #[allow(clippy::too_many_arguments)]
    pub fn rehydrate(
        session_id: String,
        symbol: String,
        status: SessionStatus,
        center_price: f64,
        current_center_price: f64,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        duration_days: i64,
        config: GridConfig,
        stats: GridStats,
        last_exit_reason: Option<String>,
    ) -> Self {
        Self {
            session_id,
            symbol,
            status,
            center_price,
            current_center_price,
            start_time,
            end_time,
            duration_days,
            config,
            stats,
            last_exit_reason,
            tracker: PriceTracker::new(),
            consecutive_tick_failures: 0,
            band: BandCrossingDetector::new(),
            armed: None,
            armed_band_index: 0,
        }
    }

    /// Advances the session one tick. `available` is the position's current
    /// available (T+1-settled, sellable) quantity, used for sell sizing only.
    /// `volume` is the position's total held quantity, used for the
    /// position-cleared exit; `available` alone would false-trigger on a
    /// same-day buy (settled next day, so `available` stays behind `volume`).
    /// `None` for either means the registry has no position for this symbol.
    pub fn on_tick(
        &mut self,
        tick: &Tick,
        volume: Option<i64>,
        available: Option<i64>,
        now: DateTime<Utc>,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();

        if self.status != SessionStatus::Active {
            return outcome;
        }

        if tick.is_stale() {
            return outcome;
        }

        let price = tick.last;

        if let Some(direction) = self
            .band
            .on_tick(price, self.current_center_price, self.config.price_interval, now)
        {
            self.armed = Some(match direction {
                CrossDirection::Down => Armed::Buy,
                CrossDirection::Up => Armed::Sell,
            });
            self.armed_band_index = crate::grid::band::band_index(
                price,
                self.current_center_price,
                self.config.price_interval,
            );
        }

        let callback = self
            .tracker
            .on_tick(price, self.current_center_price, self.config.callback_ratio);

        match (self.armed, callback) {
            (Some(Armed::Buy), Some(Callback::Up(..))) => {
                if let Some(intent) = self.try_build_buy(price) {
                    outcome.intents.push(intent);
                }
                self.armed = None;
            }
            (Some(Armed::Sell), Some(Callback::Down(..))) => {
                if let Some(intent) = self.try_build_sell(price, available.unwrap_or(0)) {
                    outcome.intents.push(intent);
                }
                self.armed = None;
            }
            _ => {}
        }

        if self.maybe_rebuild(price) {
            outcome.rebuilt = true;
        }

        if let Some((status, reason)) = self.check_exits(volume, now) {
            self.status = status;
            self.last_exit_reason = Some(reason.to_string());
            outcome.exited = Some((status, reason));
        }

        outcome
    }

    fn try_build_buy(&self, price: f64) -> Option<TradeIntent> {
        let amount = (self.config.max_investment * self.config.position_ratio)
            .min(self.config.max_investment - self.stats.current_investment);
        if amount <= 0.0 {
            return None;
        }
        let qty = ((amount / price / 100.0).floor() as i64) * 100;
        if qty < MIN_TRADE_LOT || price * qty as f64 < MIN_TRADE_AMOUNT {
            return None;
        }
        Some(TradeIntent {
            symbol: self.symbol.clone(),
            side: Side::Buy,
            qty,
            price,
            reason: IntentReason::GridBuy,
        })
    }

    fn try_build_sell(&self, price: f64, available: i64) -> Option<TradeIntent> {
        let qty = ((available as f64 * self.config.position_ratio / 100.0).floor() as i64) * 100;
        if qty < MIN_TRADE_LOT || price * qty as f64 < MIN_TRADE_AMOUNT || qty > available {
            return None;
        }
        Some(TradeIntent {
            symbol: self.symbol.clone(),
            side: Side::Sell,
            qty,
            price,
            reason: IntentReason::GridSell,
        })
    }

    /// Called by the engine once a grid buy/sell intent fills. Updates fund
    /// accounting and emits the trade event latched to the band index seen
    /// at arm time, not at fill time.
    pub fn record_fill(&mut self, side: Side, price: f64, qty: i64) -> crate::grid::config::GridTradeEvent {
        match side {
            Side::Buy => {
                self.stats.current_investment += price * qty as f64;
                self.stats.total_buy_amount += price * qty as f64;
                self.stats.buy_count += 1;
            }
            Side::Sell => {
                self.stats.current_investment = (self.stats.current_investment - price * qty as f64).max(0.0);
                self.stats.total_sell_amount += price * qty as f64;
                self.stats.sell_count += 1;
            }
        }
        self.stats.realized_pnl = self.stats.total_sell_amount - self.stats.total_buy_amount;

        crate::grid::config::GridTradeEvent {
            session_id: self.session_id.clone(),
            side,
            band_index: self.armed_band_index,
            price,
            volume: qty,
            timestamp: Utc::now(),
        }
    }

    /// Rebuild: when `current_center_price` drifts from `center_price` by more
    /// than half a band, reset the tracker and band index without touching
    /// statistics.
    fn maybe_rebuild(&mut self, price: f64) -> bool {
        let drift = (self.current_center_price - self.center_price).abs() / self.center_price;
        if drift >= self.config.price_interval / 2.0 {
            self.current_center_price = price;
            self.tracker.reset();
            self.band.reset_index();
            self.armed = None;
            true
        } else {
            false
        }
    }

    fn check_exits(
        &self,
        volume: Option<i64>,
        now: DateTime<Utc>,
    ) -> Option<(SessionStatus, &'static str)> {
        if volume == Some(0) || volume.is_none() {
            return Some((SessionStatus::Completed, "POSITION_CLEARED"));
        }

        let paired_ops = self.stats.buy_count > 0 && self.stats.sell_count > 0;
        let profit_ratio = self.stats.profit_ratio(self.config.max_investment);

        if paired_ops && profit_ratio <= self.config.stop_loss {
            return Some((SessionStatus::Stopped, "STOP_LOSS"));
        }
        if paired_ops && profit_ratio >= self.config.target_profit {
            return Some((SessionStatus::Completed, "TARGET_PROFIT"));
        }

        let deviation =
            (self.current_center_price - self.center_price).abs() / self.center_price;
        if deviation >= self.config.max_deviation {
            return Some((SessionStatus::Stopped, "DEVIATION"));
        }

        if now >= self.end_time {
            return Some((SessionStatus::Completed, "TIME_UP"));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(price: f64, ts: DateTime<Utc>) -> Tick {
        Tick {
            last: price,
            open: price,
            high: price,
            low: price,
            prev_close: price,
            volume: 0,
            amount: 0.0,
            ts,
        }
    }

    fn t(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn cross_then_callback_emits_buy_signal() {
        let cfg = GridConfig {
            price_interval: 0.05,
            position_ratio: 0.5,
            callback_ratio: 0.005,
            max_investment: 20_000.0,
            max_deviation: 0.2,
            target_profit: 0.2,
            stop_loss: -0.2,
            risk_level: crate::grid::RiskLevel::Moderate,
        };
        let mut session = GridSession::start("600519.SH".into(), 20.0, 30, cfg, t(0));

        // 20 -> 19.0 crosses into band k=-1, no callback
        let out = session.on_tick(&tick(19.0, t(1)), Some(1000), Some(1000), t(1));
        assert!(out.intents.is_empty());

        // 19.0 -> 18.5 (new trough)
        let out = session.on_tick(&tick(18.5, t(2)), Some(1000), Some(1000), t(2));
        assert!(out.intents.is_empty());

        // 18.5 -> 18.6: callback up of 0.54% >= 0.5%, armed buy fires
        let out = session.on_tick(&tick(18.6, t(3)), Some(1000), Some(1000), t(3));
        assert_eq!(out.intents.len(), 1);
        assert_eq!(out.intents[0].side, Side::Buy);
        assert_eq!(out.intents[0].qty % 100, 0);
        assert!(out.intents[0].qty as f64 * out.intents[0].price >= 100.0);
    }

    #[test]
    fn deviation_exit_fires_per_worked_example() {
        let cfg = GridConfig {
            price_interval: 0.05,
            position_ratio: 0.5,
            callback_ratio: 0.005,
            max_investment: 20_000.0,
            max_deviation: 0.10,
            target_profit: 0.2,
            stop_loss: -0.2,
            risk_level: crate::grid::RiskLevel::Moderate,
        };
        let mut session = GridSession::start("600519.SH".into(), 20.0, 30, cfg, t(0));
        session.current_center_price = 22.2;
        let out = session.on_tick(&tick(22.2, t(1)), Some(1000), Some(1000), t(1));
        assert_eq!(out.exited, Some((SessionStatus::Stopped, "DEVIATION")));
    }

    #[test]
    fn position_cleared_completes_session() {
        let cfg = GridConfig::moderate_preset();
        let mut session = GridSession::start("600519.SH".into(), 20.0, 30, cfg, t(0));
        let out = session.on_tick(&tick(20.1, t(1)), Some(0), Some(0), t(1));
        assert_eq!(out.exited, Some((SessionStatus::Completed, "POSITION_CLEARED")));
    }

    #[test]
    fn same_day_buy_does_not_false_trigger_position_cleared() {
        // T+1 settlement: a same-day buy raises `volume` but not `available`
        // until the next trading day. The exit must key off `volume`, not
        // `available`, or a session started right after a buy would complete
        // on its very first tick.
        let cfg = GridConfig::moderate_preset();
        let mut session = GridSession::start("600519.SH".into(), 20.0, 30, cfg, t(0));
        let out = session.on_tick(&tick(20.1, t(1)), Some(1000), Some(0), t(1));
        assert_ne!(out.exited, Some((SessionStatus::Completed, "POSITION_CLEARED")));
    }

    #[test]
    fn time_up_completes_session_after_end_time() {
        let cfg = GridConfig::moderate_preset();
        let mut session = GridSession::start("600519.SH".into(), 20.0, 1, cfg, t(0));
        let far_future = t(0) + ChronoDuration::days(2);
        let out = session.on_tick(&tick(20.1, far_future), Some(1000), Some(1000), far_future);
        assert_eq!(out.exited, Some((SessionStatus::Completed, "TIME_UP")));
    }

    #[test]
    fn stale_tick_is_skipped_without_state_change() {
        let cfg = GridConfig::moderate_preset();
        let mut session = GridSession::start("600519.SH".into(), 20.0, 30, cfg, t(0));
        let out = session.on_tick(&tick(0.0, t(1)), Some(1000), Some(1000), t(1));
        assert!(out.intents.is_empty());
        assert!(out.exited.is_none());
        assert_eq!(session.tracker.state, crate::grid::tracker::TrackerState::Idle);
    }
}
