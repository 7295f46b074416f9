//! Grid configuration, presets, statistics and session status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskLevel {
    Aggressive,
    Moderate,
    Conservative,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Aggressive => "aggressive",
            RiskLevel::Moderate => "moderate",
            RiskLevel::Conservative => "conservative",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "aggressive" => RiskLevel::Aggressive,
            "conservative" => RiskLevel::Conservative,
            _ => RiskLevel::Moderate,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    pub price_interval: f64,
    pub position_ratio: f64,
    pub callback_ratio: f64,
    pub max_investment: f64,
    pub max_deviation: f64,
    pub target_profit: f64,
    pub stop_loss: f64,
    pub risk_level: RiskLevel,
}

impl GridConfig {
    /// Range checks from the data model plus the `target_profit ≥ |stop_loss|`
    /// cross-field invariant.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        if !(0.0001..=0.20).contains(&self.price_interval) {
            errors.push("price_interval must be within [0.0001, 0.20]".to_string());
        }
        if !(0.01..=1.00).contains(&self.position_ratio) {
            errors.push("position_ratio must be within [0.01, 1.00]".to_string());
        }
        if !(0.001..=0.10).contains(&self.callback_ratio) {
            errors.push("callback_ratio must be within [0.001, 0.10]".to_string());
        }
        if self.max_investment < 0.0 {
            errors.push("max_investment must be >= 0".to_string());
        }
        if self.max_deviation <= 0.0 {
            errors.push("max_deviation must be > 0".to_string());
        }
        if self.target_profit <= 0.0 {
            errors.push("target_profit must be > 0".to_string());
        }
        if self.stop_loss >= 0.0 {
            errors.push("stop_loss must be < 0".to_string());
        }
        if self.target_profit < self.stop_loss.abs() {
            errors.push("target_profit must be >= |stop_loss|".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn aggressive_preset() -> Self {
        Self {
            price_interval: 0.03,
            position_ratio: 0.30,
            callback_ratio: 0.003,
            max_investment: 100_000.0,
            max_deviation: 0.15,
            target_profit: 0.20,
            stop_loss: -0.15,
            risk_level: RiskLevel::Aggressive,
        }
    }

    pub fn moderate_preset() -> Self {
        Self {
            price_interval: 0.02,
            position_ratio: 0.20,
            callback_ratio: 0.005,
            max_investment: 60_000.0,
            max_deviation: 0.10,
            target_profit: 0.12,
            stop_loss: -0.10,
            risk_level: RiskLevel::Moderate,
        }
    }

    pub fn conservative_preset() -> Self {
        Self {
            price_interval: 0.01,
            position_ratio: 0.10,
            callback_ratio: 0.008,
            max_investment: 30_000.0,
            max_deviation: 0.06,
            target_profit: 0.08,
            stop_loss: -0.06,
            risk_level: RiskLevel::Conservative,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GridStats {
    pub buy_count: i64,
    pub sell_count: i64,
    pub current_investment: f64,
    pub realized_pnl: f64,
    pub total_buy_amount: f64,
    pub total_sell_amount: f64,
}

impl GridStats {
    pub fn trade_count(&self) -> i64 {
        self.buy_count + self.sell_count
    }

    /// `(total_sell_amount − total_buy_amount) / max_investment`, computed
    /// from the raw cumulative totals rather than `realized_pnl` (which
    /// requires knowing the true average buy cost per sell and isn't tracked
    /// here).
    pub fn profit_ratio(&self, max_investment: f64) -> f64 {
        if max_investment <= 0.0 {
            return 0.0;
        }
        (self.total_sell_amount - self.total_buy_amount) / max_investment
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Stopped,
    Completed,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "stopped" => SessionStatus::Stopped,
            "completed" => SessionStatus::Completed,
            _ => SessionStatus::Active,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridTradeEvent {
    pub session_id: String,
    pub side: Side,
    pub band_index: i64,
    pub price: f64,
    pub volume: i64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_target_profit_below_stop_loss_magnitude() {
        let mut cfg = GridConfig::moderate_preset();
        cfg.target_profit = 0.05;
        cfg.stop_loss = -0.10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn presets_all_validate() {
        assert!(GridConfig::aggressive_preset().validate().is_ok());
        assert!(GridConfig::moderate_preset().validate().is_ok());
        assert!(GridConfig::conservative_preset().validate().is_ok());
    }
}
