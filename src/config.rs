//! Live, swappable configuration.
//!
//! Loaded once from the environment at startup (the teacher's `Config::from_env`
//! idiom), then held as an `Arc<ConfigSnapshot>` behind a `parking_lot::RwLock`.
//! Workers sample the current snapshot at the start of a loop iteration; `POST
//! /api/config/save` validates a partial update and swaps the pointer atomically.

use std::env;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// One `(profit_floor, trailing_pullback)` rung of the dynamic take-profit table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TakeProfitRung {
    pub profit_floor: f64,
    pub trailing_pullback: f64,
}

/// Everything the risk engine, grid engine and orchestrator read each cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    // -- risk engine --
    pub stock_stop_loss: f64,
    pub stop_loss_enabled: bool,
    pub first_profit_sell: f64,
    pub first_profit_sell_enabled: bool,
    pub stock_gain_sell_percent: f64,
    pub stop_loss_buy: f64,
    pub stop_loss_buy_enabled: bool,
    pub dynamic_take_profit: Vec<TakeProfitRung>,
    pub single_buy_amount: f64,
    pub single_stock_max_position: f64,
    pub total_max_position: f64,

    // -- global switches --
    pub allow_buy: bool,
    pub allow_sell: bool,
    pub global_allow_buy_sell: bool,
    pub simulation_mode: bool,

    // -- broker connectivity --
    pub connect_port: u16,
    pub total_accounts: String,

    // -- cadences --
    pub refresh_interval_ms: u64,
    pub idle_refresh_interval_ms: u64,
    pub maintenance_interval_secs: u64,

    // -- persistence / server --
    pub database_path: String,
    pub http_port: u16,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            stock_stop_loss: -0.07,
            stop_loss_enabled: true,
            first_profit_sell: 0.05,
            first_profit_sell_enabled: true,
            stock_gain_sell_percent: 0.60,
            stop_loss_buy: 0.05,
            stop_loss_buy_enabled: true,
            dynamic_take_profit: vec![
                TakeProfitRung {
                    profit_floor: 0.05,
                    trailing_pullback: 0.02,
                },
                TakeProfitRung {
                    profit_floor: 0.10,
                    trailing_pullback: 0.03,
                },
                TakeProfitRung {
                    profit_floor: 0.15,
                    trailing_pullback: 0.05,
                },
            ],
            single_buy_amount: 10_000.0,
            single_stock_max_position: 50_000.0,
            total_max_position: 500_000.0,
            allow_buy: true,
            allow_sell: true,
            global_allow_buy_sell: false,
            simulation_mode: true,
            connect_port: 7001,
            total_accounts: "127.0.0.1".to_string(),
            refresh_interval_ms: 1_000,
            idle_refresh_interval_ms: 5_000,
            maintenance_interval_secs: 180,
            database_path: "./equity_supervisor.db".to_string(),
            http_port: 8080,
        }
    }
}

impl ConfigSnapshot {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            stock_stop_loss: env_f64("STOCK_STOP_LOSS", defaults.stock_stop_loss),
            stop_loss_enabled: env_bool("STOP_LOSS_ENABLED", defaults.stop_loss_enabled),
            first_profit_sell: env_f64("FIRST_PROFIT_SELL", defaults.first_profit_sell),
            first_profit_sell_enabled: env_bool(
                "FIRST_PROFIT_SELL_ENABLED",
                defaults.first_profit_sell_enabled,
            ),
            stock_gain_sell_percent: env_f64(
                "STOCK_GAIN_SELL_PERCENT",
                defaults.stock_gain_sell_percent,
            ),
            stop_loss_buy: env_f64("STOP_LOSS_BUY", defaults.stop_loss_buy),
            stop_loss_buy_enabled: env_bool(
                "STOP_LOSS_BUY_ENABLED",
                defaults.stop_loss_buy_enabled,
            ),
            dynamic_take_profit: defaults.dynamic_take_profit.clone(),
            single_buy_amount: env_f64("SINGLE_BUY_AMOUNT", defaults.single_buy_amount),
            single_stock_max_position: env_f64(
                "SINGLE_STOCK_MAX_POSITION",
                defaults.single_stock_max_position,
            ),
            total_max_position: env_f64("TOTAL_MAX_POSITION", defaults.total_max_position),
            allow_buy: env_bool("ALLOW_BUY", defaults.allow_buy),
            allow_sell: env_bool("ALLOW_SELL", defaults.allow_sell),
            global_allow_buy_sell: env_bool(
                "GLOBAL_ALLOW_BUY_SELL",
                defaults.global_allow_buy_sell,
            ),
            simulation_mode: env_bool("SIMULATION_MODE", defaults.simulation_mode),
            connect_port: env::var("CONNECT_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.connect_port),
            total_accounts: env::var("TOTAL_ACCOUNTS").unwrap_or(defaults.total_accounts),
            refresh_interval_ms: env::var("REFRESH_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.refresh_interval_ms),
            idle_refresh_interval_ms: env::var("IDLE_REFRESH_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.idle_refresh_interval_ms),
            maintenance_interval_secs: env::var("MAINTENANCE_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.maintenance_interval_secs),
            database_path: env::var("DATABASE_PATH").unwrap_or(defaults.database_path),
            http_port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_port),
        })
    }

    /// Applies a partial JSON update, validating ranges. Returns the merged,
    /// validated snapshot without mutating `self`.
    pub fn merge_validated(&self, patch: &serde_json::Value) -> Result<Self, Vec<String>> {
        let mut next = self.clone();
        let mut errors = Vec::new();

        macro_rules! apply_f64 {
            ($key:literal, $field:ident, $lo:expr, $hi:expr) => {
                if let Some(v) = patch.get($key).and_then(|v| v.as_f64()) {
                    if v < $lo || v > $hi {
                        errors.push(format!(
                            "{} must be within [{}, {}], got {}",
                            $key, $lo, $hi, v
                        ));
                    } else {
                        next.$field = v;
                    }
                }
            };
        }
        macro_rules! apply_bool {
            ($key:literal, $field:ident) => {
                if let Some(v) = patch.get($key).and_then(|v| v.as_bool()) {
                    next.$field = v;
                }
            };
        }

        apply_f64!("stockStopLoss", stock_stop_loss, -1.0, 0.0);
        apply_bool!("StopLossEnabled", stop_loss_enabled);
        apply_f64!("firstProfitSell", first_profit_sell, 0.0, 1.0);
        apply_bool!("firstProfitSellEnabled", first_profit_sell_enabled);
        apply_f64!(
            "stockGainSellPencent",
            stock_gain_sell_percent,
            0.0,
            1.0
        );
        apply_f64!("stopLossBuy", stop_loss_buy, 0.0, 1.0);
        apply_bool!("stopLossBuyEnabled", stop_loss_buy_enabled);
        apply_f64!("singleBuyAmount", single_buy_amount, 0.0, f64::MAX);
        apply_f64!(
            "singleStockMaxPosition",
            single_stock_max_position,
            0.0,
            f64::MAX
        );
        apply_f64!("totalMaxPosition", total_max_position, 0.0, f64::MAX);
        apply_bool!("allowBuy", allow_buy);
        apply_bool!("allowSell", allow_sell);
        apply_bool!("globalAllowBuySell", global_allow_buy_sell);
        apply_bool!("simulationMode", simulation_mode);

        if let Some(port) = patch.get("connectPort").and_then(|v| v.as_u64()) {
            next.connect_port = port as u16;
        }
        if let Some(host) = patch.get("totalAccounts").and_then(|v| v.as_str()) {
            next.total_accounts = host.to_string();
        }

        if errors.is_empty() {
            Ok(next)
        } else {
            Err(errors)
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

/// Shared, swappable handle passed to every worker.
#[derive(Clone)]
pub struct ConfigHandle(Arc<RwLock<Arc<ConfigSnapshot>>>);

impl ConfigHandle {
    pub fn new(initial: ConfigSnapshot) -> Self {
        Self(Arc::new(RwLock::new(Arc::new(initial))))
    }

    pub fn load(&self) -> Arc<ConfigSnapshot> {
        self.0.read().clone()
    }

    pub fn swap(&self, next: ConfigSnapshot) {
        *self.0.write() = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_validated_rejects_out_of_range() {
        let base = ConfigSnapshot::default();
        let patch = serde_json::json!({ "stockStopLoss": 1.0 });
        let err = base.merge_validated(&patch).unwrap_err();
        assert!(err.iter().any(|e| e.contains("stockStopLoss")));
    }

    #[test]
    fn merge_validated_applies_partial_update() {
        let base = ConfigSnapshot::default();
        let patch = serde_json::json!({ "allowBuy": false, "singleBuyAmount": 5000.0 });
        let next = base.merge_validated(&patch).unwrap();
        assert!(!next.allow_buy);
        assert_eq!(next.single_buy_amount, 5000.0);
        // untouched fields survive
        assert_eq!(next.allow_sell, base.allow_sell);
    }

    #[test]
    fn handle_swap_is_visible_to_new_loads() {
        let handle = ConfigHandle::new(ConfigSnapshot::default());
        let mut next = (*handle.load()).clone();
        next.global_allow_buy_sell = true;
        handle.swap(next);
        assert!(handle.load().global_allow_buy_sell);
    }
}
