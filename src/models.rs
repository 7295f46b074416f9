//! Core domain types shared across engines.
//!
//! These are plain data carriers; behavior lives in the owning module
//! (`position`, `risk`, `grid`, `market_data`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A snapshot of a security's price at a point in time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tick {
    pub last: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub prev_close: f64,
    pub volume: i64,
    pub amount: f64,
    pub ts: DateTime<Utc>,
}

impl Tick {
    pub fn is_stale(&self) -> bool {
        self.last <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// A held position in a single symbol. Owned exclusively by `PositionRegistry`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub volume: i64,
    pub available: i64,
    pub avg_cost: f64,
    pub base_cost: f64,
    pub current_price: f64,
    pub highest_price: f64,
    pub stop_loss_price: f64,
    pub first_profit_triggered: bool,
    pub open_date: DateTime<Utc>,
}

impl Position {
    pub fn market_value(&self) -> f64 {
        self.current_price * self.volume as f64
    }

    pub fn profit_ratio(&self) -> f64 {
        if self.avg_cost <= 0.0 {
            return 0.0;
        }
        (self.current_price - self.avg_cost) / self.avg_cost
    }
}

/// An immutable record of a filled order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub symbol: String,
    pub trade_time: DateTime<Utc>,
    pub side: Side,
    pub price: f64,
    pub volume: i64,
    pub order_id: String,
    pub commission: f64,
    pub strategy_tag: String,
}

impl Trade {
    pub fn amount(&self) -> f64 {
        self.price * self.volume as f64
    }
}

/// Reasons a `TradeIntent` was emitted. Mirrors the RiskEngine and GridEngine
/// triggers so downstream consumers (TradeExecutor, persistence, UI) can
/// pattern-match without stringly-typed reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntentReason {
    StopLoss,
    FirstTp,
    TrailingTp,
    Replenish,
    GridBuy,
    GridSell,
}

impl IntentReason {
    pub fn as_str(self) -> &'static str {
        match self {
            IntentReason::StopLoss => "STOP_LOSS",
            IntentReason::FirstTp => "FIRST_TP",
            IntentReason::TrailingTp => "TRAILING_TP",
            IntentReason::Replenish => "REPLENISH",
            IntentReason::GridBuy => "GRID_BUY",
            IntentReason::GridSell => "GRID_SELL",
        }
    }
}

/// A proposed order, emitted by RiskEngine or GridEngine and consumed by the
/// orchestrator's order-dispatch worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub side: Side,
    pub qty: i64,
    pub price: f64,
    pub reason: IntentReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceType {
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Submitted,
    Accepted,
    PartFilled,
    Filled,
    PartCancelled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::PartFilled => "PART_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::PartCancelled => "PART_CANCELLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::PartCancelled
        )
    }
}

/// A fill reported by the broker (or the simulation executor).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deal {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub price: f64,
    pub volume: i64,
    pub commission: f64,
    pub trade_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub available: f64,
    pub total_asset: f64,
    pub market_value: f64,
}

/// Six digits plus an exchange suffix, e.g. `600519.SH`.
pub fn validate_symbol(symbol: &str) -> Result<(), String> {
    let bytes = symbol.as_bytes();
    let valid = bytes.len() == 9
        && matches!(bytes[0], b'0' | b'3' | b'6')
        && bytes[1..6].iter().all(u8::is_ascii_digit)
        && bytes[6] == b'.'
        && matches!(&symbol[7..9], "SH" | "SZ");
    if valid {
        Ok(())
    } else {
        Err(format!(
            "symbol '{symbol}' does not match ^[036]\\d{{5}}\\.(SH|SZ)$"
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub market: String,
    pub display_name: String,
}

/// A saved grid configuration preset. `is_default` is exclusive across all
/// templates; the persistence layer enforces that on every upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskTemplate {
    pub name: String,
    pub config: crate::grid::GridConfig,
    pub description: String,
    pub is_default: bool,
    pub usage_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_symbol_accepts_known_good_codes() {
        assert!(validate_symbol("600519.SH").is_ok());
        assert!(validate_symbol("000001.SZ").is_ok());
        assert!(validate_symbol("300750.SZ").is_ok());
    }

    #[test]
    fn validate_symbol_rejects_malformed_codes() {
        assert!(validate_symbol("60051.SH").is_err());
        assert!(validate_symbol("600519.NY").is_err());
        assert!(validate_symbol("abcdef.SH").is_err());
        assert!(validate_symbol("900519.SH").is_err());
    }

    #[test]
    fn position_derived_fields() {
        let p = Position {
            symbol: "600519.SH".into(),
            volume: 1000,
            available: 1000,
            avg_cost: 10.0,
            base_cost: 10.0,
            current_price: 10.55,
            highest_price: 10.55,
            stop_loss_price: 9.3,
            first_profit_triggered: false,
            open_date: Utc::now(),
        };
        assert!((p.market_value() - 10550.0).abs() < 1e-9);
        assert!((p.profit_ratio() - 0.055).abs() < 1e-9);
    }
}
