//! PositionRegistry: the in-memory view of held positions, mirrored to
//! `PersistenceStore` on every mutation. GridEngine never touches positions
//! directly — it holds a symbol key and queries the registry on demand.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::warn;

use crate::models::{Deal, Position, Side, Tick};
use crate::persistence::PersistenceStore;

pub struct PositionRegistry {
    positions: RwLock<HashMap<String, Position>>,
    store: Arc<PersistenceStore>,
    version: AtomicU64,
}

impl PositionRegistry {
    pub fn new(store: Arc<PersistenceStore>) -> Self {
        let initial_version = store.get_positions_version().unwrap_or(0);
        let positions = store.load_positions().unwrap_or_default();
        let map = positions.into_iter().map(|p| (p.symbol.clone(), p)).collect();
        Self {
            positions: RwLock::new(map),
            store,
            version: AtomicU64::new(initial_version),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<Position> {
        self.positions.read().get(symbol).cloned()
    }

    pub fn all(&self) -> Vec<Position> {
        self.positions.read().values().cloned().collect()
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn bump_version(&self) -> u64 {
        let v = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        let _ = self.store.set_positions_version(v);
        v
    }

    /// Direct upsert used by holdings initialization (`/api/holdings/init`)
    /// and tests; does not go through fill accounting.
    pub fn upsert(
        &self,
        symbol: &str,
        volume: i64,
        avg_cost: f64,
        current_price: Option<f64>,
    ) -> anyhow::Result<()> {
        let mut positions = self.positions.write();
        let entry = positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position {
                symbol: symbol.to_string(),
                volume: 0,
                available: 0,
                avg_cost,
                base_cost: avg_cost,
                current_price: current_price.unwrap_or(avg_cost),
                highest_price: current_price.unwrap_or(avg_cost),
                stop_loss_price: 0.0,
                first_profit_triggered: false,
                open_date: Utc::now(),
            });
        entry.volume = volume;
        entry.available = volume;
        entry.avg_cost = avg_cost;
        if let Some(price) = current_price {
            entry.current_price = price;
            entry.highest_price = entry.highest_price.max(price);
        }
        self.store.upsert_position(entry)?;
        drop(positions);
        self.bump_version();
        Ok(())
    }

    pub fn remove(&self, symbol: &str) -> anyhow::Result<()> {
        let mut positions = self.positions.write();
        if positions.remove(symbol).is_some() {
            self.store.remove_position(symbol)?;
            drop(positions);
            self.bump_version();
        }
        Ok(())
    }

    /// Applies a fill deterministically per the BUY/SELL derivation rules.
    pub fn register_fill(&self, deal: &Deal) -> anyhow::Result<()> {
        let mut positions = self.positions.write();

        match deal.side {
            Side::Buy => {
                let entry = positions.entry(deal.symbol.clone()).or_insert_with(|| Position {
                    symbol: deal.symbol.clone(),
                    volume: 0,
                    available: 0,
                    avg_cost: 0.0,
                    base_cost: deal.price,
                    current_price: deal.price,
                    highest_price: deal.price,
                    stop_loss_price: 0.0,
                    first_profit_triggered: false,
                    open_date: deal.trade_time,
                });
                let old_volume = entry.volume;
                let new_volume = old_volume + deal.volume;
                entry.avg_cost = if new_volume > 0 {
                    (old_volume as f64 * entry.avg_cost + deal.volume as f64 * deal.price)
                        / new_volume as f64
                } else {
                    entry.avg_cost
                };
                if old_volume == 0 {
                    entry.base_cost = deal.price;
                    entry.open_date = deal.trade_time;
                }
                entry.volume = new_volume;
                // T+1: available does not increase until the next trading-day boundary.
                self.store.upsert_position(entry)?;
            }
            Side::Sell => {
                let emptied = if let Some(entry) = positions.get_mut(&deal.symbol) {
                    entry.volume = (entry.volume - deal.volume).max(0);
                    entry.available = (entry.available - deal.volume).max(0);
                    if entry.volume == 0 {
                        true
                    } else {
                        self.store.upsert_position(entry)?;
                        false
                    }
                } else {
                    warn!(symbol = %deal.symbol, "sell fill for unknown position");
                    false
                };
                if emptied {
                    self.store.remove_position(&deal.symbol)?;
                    positions.remove(&deal.symbol);
                    drop(positions);
                    self.bump_version();
                    return Ok(());
                }
            }
        }

        drop(positions);
        self.bump_version();
        Ok(())
    }

    /// Advances `available` to match `volume` for every position, modeling
    /// the T+1 trading-day boundary. Called once per day-rollover by the
    /// orchestrator's maintenance loop.
    pub fn roll_t_plus_one(&self) -> anyhow::Result<()> {
        let mut positions = self.positions.write();
        for position in positions.values_mut() {
            if position.available != position.volume {
                position.available = position.volume;
                self.store.upsert_position(position)?;
            }
        }
        drop(positions);
        self.bump_version();
        Ok(())
    }

    /// Pulls a tick per held symbol from the hub and recomputes derived
    /// fields. A `None` tick (no data from any source) leaves the position's
    /// `current_price` at its last known value.
    pub fn refresh_prices<F>(&self, mut get_tick: F) -> anyhow::Result<()>
    where
        F: FnMut(&str) -> Option<Tick>,
    {
        let symbols: Vec<String> = self.positions.read().keys().cloned().collect();
        let mut changed = false;
        let mut positions = self.positions.write();
        for symbol in symbols {
            let Some(position) = positions.get_mut(&symbol) else {
                continue;
            };
            let Some(tick) = get_tick(&symbol) else {
                continue;
            };
            if tick.is_stale() {
                continue;
            }
            position.current_price = tick.last;
            position.highest_price = position.highest_price.max(tick.last);
            changed = true;
            let _ = self.store.upsert_position(position);
        }
        drop(positions);
        if changed {
            self.bump_version();
        }
        Ok(())
    }
}
