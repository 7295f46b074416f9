//! Risk Management Module
//! Evaluates per-position risk rules against the latest tick: stop-loss,
//! first take-profit, dynamic trailing take-profit, replenishment-on-dip.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::ConfigSnapshot;
use crate::models::{IntentReason, Position, Side, Tick, TradeIntent};

const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Per-position risk rule evaluator. Holds only the rate-limit window state;
/// everything else is read fresh from the `Position` and the live config
/// snapshot each cycle.
pub struct RiskEngine {
    last_emitted: HashMap<(String, IntentReason), Instant>,
}

impl RiskEngine {
    pub fn new() -> Self {
        Self {
            last_emitted: HashMap::new(),
        }
    }

    /// Evaluates one position against the latest tick. Returns 0..N intents;
    /// never panics, never propagates an error — failures are logged and the
    /// symbol is skipped for this cycle, per the design's failure semantics.
    /// `portfolio_market_value` is the market value of every held position
    /// (this one included), used to bound replenishment against the
    /// account-wide cap rather than this position's own value.
    pub fn evaluate(
        &mut self,
        position: &Position,
        tick: Option<&Tick>,
        config: &ConfigSnapshot,
        portfolio_market_value: f64,
    ) -> Vec<TradeIntent> {
        let Some(tick) = tick else {
            return Vec::new();
        };
        if tick.is_stale() {
            return Vec::new();
        }

        let current_price = tick.last;
        let profit_ratio = if position.avg_cost > 0.0 {
            (current_price - position.avg_cost) / position.avg_cost
        } else {
            0.0
        };

        // 1. Stop-loss: full exit, terminal for this position this cycle.
        if config.stop_loss_enabled && profit_ratio <= config.stock_stop_loss {
            if let Some(intent) = self.try_emit(
                &position.symbol,
                IntentReason::StopLoss,
                Side::Sell,
                position.available,
                current_price,
            ) {
                return vec![intent];
            }
            return Vec::new();
        }

        let mut intents = Vec::new();

        // 2. First take-profit: partial exit, sets first_profit_triggered on fill.
        if !position.first_profit_triggered
            && config.first_profit_sell_enabled
            && profit_ratio >= config.first_profit_sell
        {
            let qty = ((position.volume as f64 * config.stock_gain_sell_percent / 100.0).floor()
                as i64)
                * 100;
            if qty > 0 {
                if let Some(intent) =
                    self.try_emit(&position.symbol, IntentReason::FirstTp, Side::Sell, qty, current_price)
                {
                    intents.push(intent);
                }
            }
        }

        // 3. Dynamic trailing take-profit: iterate the table from the highest
        // profit_floor downward; first rung whose pullback condition is met wins.
        let hp = position.highest_price;
        let hp_gain = if position.avg_cost > 0.0 {
            (hp - position.avg_cost) / position.avg_cost
        } else {
            0.0
        };
        let mut rungs = config.dynamic_take_profit.clone();
        rungs.sort_by(|a, b| b.profit_floor.partial_cmp(&a.profit_floor).unwrap());
        for rung in &rungs {
            if hp <= 0.0 {
                break;
            }
            let pullback = (hp - current_price) / hp;
            if hp_gain >= rung.profit_floor && pullback >= rung.trailing_pullback {
                if let Some(intent) = self.try_emit(
                    &position.symbol,
                    IntentReason::TrailingTp,
                    Side::Sell,
                    position.available,
                    current_price,
                ) {
                    intents.push(intent);
                }
                break;
            }
        }

        // 4. Replenishment buy: partial entry on drawdown from base cost.
        if config.stop_loss_buy_enabled && position.base_cost > 0.0 {
            let drawdown = (position.base_cost - current_price) / position.base_cost;
            if drawdown >= config.stop_loss_buy {
                let unit = ((config.single_buy_amount / current_price / 100.0).floor() as i64) * 100;
                if unit > 0 {
                    let added_value = unit as f64 * current_price;
                    let prospective_value = position.market_value() + added_value;
                    let total_value_ok = portfolio_market_value + added_value <= config.total_max_position;
                    let single_value_ok = prospective_value <= config.single_stock_max_position;
                    if total_value_ok && single_value_ok {
                        if let Some(intent) = self.try_emit(
                            &position.symbol,
                            IntentReason::Replenish,
                            Side::Buy,
                            unit,
                            current_price,
                        ) {
                            intents.push(intent);
                        }
                    }
                }
            }
        }

        intents
    }

    fn try_emit(
        &mut self,
        symbol: &str,
        reason: IntentReason,
        side: Side,
        qty: i64,
        price: f64,
    ) -> Option<TradeIntent> {
        if qty <= 0 {
            return None;
        }
        let key = (symbol.to_string(), reason);
        let now = Instant::now();
        if let Some(last) = self.last_emitted.get(&key) {
            if now.duration_since(*last) < RATE_LIMIT_WINDOW {
                return None;
            }
        }
        self.last_emitted.insert(key, now);
        info!(symbol, reason = reason.as_str(), qty, price, "risk intent emitted");
        Some(TradeIntent {
            symbol: symbol.to_string(),
            side,
            qty,
            price,
            reason,
        })
    }
}

impl Default for RiskEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn position(avg_cost: f64, current_price: f64, highest_price: f64) -> Position {
        Position {
            symbol: "600519.SH".into(),
            volume: 1000,
            available: 1000,
            avg_cost,
            base_cost: avg_cost,
            current_price,
            highest_price,
            stop_loss_price: 0.0,
            first_profit_triggered: false,
            open_date: Utc::now(),
        }
    }

    fn tick(price: f64) -> Tick {
        Tick {
            last: price,
            open: price,
            high: price,
            low: price,
            prev_close: price,
            volume: 0,
            amount: 0.0,
            ts: Utc::now(),
        }
    }

    #[test]
    fn first_take_profit_matches_worked_example() {
        let mut engine = RiskEngine::new();
        let config = ConfigSnapshot {
            first_profit_sell: 0.05,
            first_profit_sell_enabled: true,
            stock_gain_sell_percent: 0.60,
            ..ConfigSnapshot::default()
        };
        let position = position(10.00, 10.55, 10.55);
        let intents = engine.evaluate(&position, Some(&tick(10.55)), &config, position.market_value());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].side, Side::Sell);
        assert_eq!(intents[0].qty, 600);
        assert_eq!(intents[0].reason, IntentReason::FirstTp);
    }

    #[test]
    fn dynamic_trailing_take_profit_matches_worked_example() {
        let mut engine = RiskEngine::new();
        let config = ConfigSnapshot {
            dynamic_take_profit: vec![
                crate::config::TakeProfitRung {
                    profit_floor: 0.05,
                    trailing_pullback: 0.02,
                },
                crate::config::TakeProfitRung {
                    profit_floor: 0.10,
                    trailing_pullback: 0.03,
                },
            ],
            first_profit_sell_enabled: false,
            stop_loss_enabled: false,
            stop_loss_buy_enabled: false,
            ..ConfigSnapshot::default()
        };
        let mut position = position(10.0, 12.0, 12.0);
        position.first_profit_triggered = true;
        // hp=12 (20% gain), ap=11.63: (12-11.63)/12 = 3.08% >= 3%? table uses 0.10/0.03 rung
        let intents = engine.evaluate(&position, Some(&tick(11.63)), &config, position.market_value());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].reason, IntentReason::TrailingTp);
        assert_eq!(intents[0].qty, position.available);
    }

    #[test]
    fn stop_loss_dominates_and_is_terminal_for_the_cycle() {
        let mut engine = RiskEngine::new();
        let config = ConfigSnapshot::default();
        let position = position(10.0, 9.2, 10.0);
        let intents = engine.evaluate(&position, Some(&tick(9.2)), &config, position.market_value());
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].reason, IntentReason::StopLoss);
        assert_eq!(intents[0].qty, position.available);
    }

    #[test]
    fn rate_limit_suppresses_duplicate_reason_within_60_seconds() {
        let mut engine = RiskEngine::new();
        let config = ConfigSnapshot::default();
        let position = position(10.0, 9.2, 10.0);
        let first = engine.evaluate(&position, Some(&tick(9.2)), &config, position.market_value());
        assert_eq!(first.len(), 1);
        let second = engine.evaluate(&position, Some(&tick(9.2)), &config, position.market_value());
        assert!(second.is_empty());
    }

    #[test]
    fn missing_tick_skips_the_symbol_this_cycle() {
        let mut engine = RiskEngine::new();
        let config = ConfigSnapshot::default();
        let position = position(10.0, 9.0, 10.0);
        assert!(engine.evaluate(&position, None, &config, position.market_value()).is_empty());
    }

    #[test]
    fn replenishment_respects_position_caps() {
        let mut engine = RiskEngine::new();
        let config = ConfigSnapshot {
            stop_loss_buy_enabled: true,
            stop_loss_buy: 0.05,
            single_buy_amount: 10_000.0,
            single_stock_max_position: 1_000.0,
            total_max_position: 1_000_000.0,
            stop_loss_enabled: false,
            first_profit_sell_enabled: false,
            ..ConfigSnapshot::default()
        };
        let position = position(10.0, 9.0, 10.0);
        let intents = engine.evaluate(&position, Some(&tick(9.0)), &config, position.market_value());
        assert!(intents.is_empty(), "single_stock_max_position should reject the buy");
    }

    #[test]
    fn replenishment_respects_total_portfolio_cap_even_when_under_single_stock_cap() {
        // Two positions, each well under single_stock_max_position, but their
        // combined market value already exceeds total_max_position: the
        // aggregate must block the buy even though this position's own
        // prospective value would pass the single-stock check.
        let mut engine = RiskEngine::new();
        let config = ConfigSnapshot {
            stop_loss_buy_enabled: true,
            stop_loss_buy: 0.05,
            single_buy_amount: 1_000.0,
            single_stock_max_position: 50_000.0,
            total_max_position: 15_000.0,
            stop_loss_enabled: false,
            first_profit_sell_enabled: false,
            ..ConfigSnapshot::default()
        };
        let position = position(10.0, 9.0, 10.0);
        let other_position_value = 9_000.0;
        let portfolio_market_value = position.market_value() + other_position_value;
        let intents = engine.evaluate(&position, Some(&tick(9.0)), &config, portfolio_market_value);
        assert!(intents.is_empty(), "total_max_position should reject the buy once the portfolio sum is counted");
    }
}
