//! GridEngine: owns every active `GridSession`, one per symbol, and advances
//! them on each tick from the orchestrator.
//!
//! Concurrency: `sessions` is a single read-write map (readers run in
//! parallel, mutations serialize); each session additionally holds its own
//! lock so `OnTick` on different symbols never contends. Lock order is
//! `PositionRegistry -> GridSession`, enforced by always resolving the
//! position snapshot before acquiring a session lock.

pub mod band;
pub mod config;
pub mod session;
pub mod tracker;

pub use config::{GridConfig, GridStats, GridTradeEvent, RiskLevel, SessionStatus};
pub use session::{GridSession, TickOutcome};
pub use tracker::PriceTracker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{Side, Tick};
use crate::persistence::PersistenceStore;
use crate::position::PositionRegistry;

const SESSION_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONSECUTIVE_TICK_FAILURES: u32 = 3;

pub struct GridEngine {
    sessions: RwLock<HashMap<String, Arc<Mutex<GridSession>>>>,
    store: Arc<PersistenceStore>,
}

impl GridEngine {
    pub fn new(store: Arc<PersistenceStore>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
        }
    }

    /// Rehydrates every `active` session from the store. Must complete
    /// within 2 seconds for up to ~100 sessions; the work here is a handful
    /// of indexed SQL reads plus in-memory map inserts, well inside budget.
    pub fn recover(&self) -> anyhow::Result<usize> {
        let rows = self.store.load_active_grid_sessions()?;
        let count = rows.len();
        let mut sessions = self.sessions.write();
        for session in rows {
            info!(symbol = %session.symbol, session_id = %session.session_id, "recovered active grid session");
            sessions.insert(session.symbol.clone(), Arc::new(Mutex::new(session)));
        }
        Ok(count)
    }

    pub fn has_active_session(&self, symbol: &str) -> bool {
        self.sessions.read().contains_key(symbol)
    }

    pub fn start_session(
        &self,
        positions: &PositionRegistry,
        symbol: &str,
        center_price: f64,
        duration_days: i64,
        config: GridConfig,
    ) -> Result<String, AppError> {
        crate::models::validate_symbol(symbol).map_err(AppError::Validation)?;
        config
            .validate()
            .map_err(|errs| AppError::Validation(errs.join("; ")))?;
        if !(1..=365).contains(&duration_days) {
            return Err(AppError::Validation(
                "duration_days must be within [1, 365]".to_string(),
            ));
        }
        if center_price <= 0.0 {
            return Err(AppError::Validation("center_price must be > 0".to_string()));
        }

        if positions.get(symbol).is_none() {
            return Err(AppError::Validation(format!(
                "no position exists for {symbol}"
            )));
        }

        let mut sessions = self.sessions.write();
        if sessions.contains_key(symbol) {
            return Err(AppError::Consistency(format!(
                "an active grid session already exists for {symbol}"
            )));
        }

        let session = GridSession::start(symbol.to_string(), center_price, duration_days, config, Utc::now());
        let session_id = session.session_id.clone();
        self.store
            .upsert_grid_session(&session)
            .map_err(AppError::Internal)?;
        sessions.insert(symbol.to_string(), Arc::new(Mutex::new(session)));
        Ok(session_id)
    }

    /// Idempotent: stopping an already-stopped (or unknown) session succeeds.
    pub fn stop_session(&self, session_id: &str) -> Result<(), AppError> {
        let mut sessions = self.sessions.write();
        let symbol = sessions
            .iter()
            .find(|(_, s)| s.lock().session_id == session_id)
            .map(|(sym, _)| sym.clone());

        let Some(symbol) = symbol else {
            return Ok(());
        };

        if let Some(session_arc) = sessions.remove(&symbol) {
            let mut session = session_arc.lock();
            session.status = SessionStatus::Stopped;
            session.last_exit_reason = Some("USER_STOP".to_string());
            self.store
                .upsert_grid_session(&session)
                .map_err(AppError::Internal)?;
        }
        Ok(())
    }

    /// Advances the session for `symbol` one tick, if one is active.
    /// Acquires the session lock with a 5-second timeout; on timeout the tick
    /// is skipped (logged once) rather than blocking the caller.
    pub fn on_tick(
        &self,
        symbol: &str,
        tick: &Tick,
        volume: Option<i64>,
        available: Option<i64>,
    ) -> Option<TickOutcome> {
        let session_arc = self.sessions.read().get(symbol).cloned()?;
        let Some(mut session) = session_arc.try_lock_for(SESSION_LOCK_TIMEOUT) else {
            warn!(symbol, "grid session lock timed out, skipping tick");
            return None;
        };

        let now = Utc::now();
        let outcome = session.on_tick(tick, volume, available, now);

        if let Err(e) = self.store.upsert_grid_session(&session) {
            warn!(symbol, error = %e, "failed to persist grid session after tick");
            session.consecutive_tick_failures += 1;
            if session.consecutive_tick_failures >= MAX_CONSECUTIVE_TICK_FAILURES {
                session.status = SessionStatus::Stopped;
                session.last_exit_reason = Some("ERROR".to_string());
            }
        } else {
            session.consecutive_tick_failures = 0;
        }

        let exited = outcome.exited.is_some() || session.status.is_terminal();
        drop(session);
        if exited {
            self.sessions.write().remove(symbol);
        }

        Some(outcome)
    }

    /// Records a fill reported by the executor for a grid-originated order,
    /// updating fund accounting and writing the trade event.
    pub fn record_fill(&self, symbol: &str, side: Side, price: f64, qty: i64) -> anyhow::Result<()> {
        let Some(session_arc) = self.sessions.read().get(symbol).cloned() else {
            return Ok(());
        };
        let mut session = session_arc.lock();
        let event = session.record_fill(side, price, qty);
        self.store.upsert_grid_session(&session)?;
        self.store.insert_grid_trade_event(&event)?;
        Ok(())
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn snapshot(&self, symbol: &str) -> Option<GridSessionSnapshot> {
        let session_arc = self.sessions.read().get(symbol).cloned()?;
        let session = session_arc.lock();
        Some(GridSessionSnapshot::from(&*session))
    }

    pub fn all_snapshots(&self) -> Vec<GridSessionSnapshot> {
        self.sessions
            .read()
            .values()
            .map(|s| GridSessionSnapshot::from(&*s.lock()))
            .collect()
    }
}

/// A read-only, serializable view of a `GridSession` for the API layer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct GridSessionSnapshot {
    pub session_id: String,
    pub symbol: String,
    pub status: String,
    pub center_price: f64,
    pub current_center_price: f64,
    pub config: GridConfig,
    pub stats: GridStats,
    pub last_exit_reason: Option<String>,
}

impl From<&GridSession> for GridSessionSnapshot {
    fn from(s: &GridSession) -> Self {
        Self {
            session_id: s.session_id.clone(),
            symbol: s.symbol.clone(),
            status: s.status.as_str().to_string(),
            center_price: s.center_price,
            current_center_price: s.current_center_price,
            config: s.config.clone(),
            stats: s.stats,
            last_exit_reason: s.last_exit_reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Tick;

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
    fn at_most_one_active_session_per_symbol() {
        let store = Arc::new(PersistenceStore::open_in_memory().unwrap());
        let registry = PositionRegistry::new(store.clone());
        registry.upsert("600519.SH", 1000, 10.0, Some(10.5)).unwrap();
        let engine = GridEngine::new(store);

        engine
            .start_session(&registry, "600519.SH", 10.5, 30, GridConfig::moderate_preset())
            .unwrap();
        let second = engine.start_session(
            &registry,
            "600519.SH",
            10.5,
            30,
            GridConfig::moderate_preset(),
        );
        assert!(second.is_err());
    }

    #[test]
    fn start_session_rejects_out_of_range_duration() {
        let store = Arc::new(PersistenceStore::open_in_memory().unwrap());
        let registry = PositionRegistry::new(store.clone());
        registry.upsert("600519.SH", 1000, 10.0, Some(10.5)).unwrap();
        let engine = GridEngine::new(store);
        let result = engine.start_session(&registry, "600519.SH", 10.5, 400, GridConfig::moderate_preset());
        assert!(result.is_err());
    }

    #[test]
    fn stopping_unknown_session_is_a_noop_success() {
        let store = Arc::new(PersistenceStore::open_in_memory().unwrap());
        let engine = GridEngine::new(store);
        assert!(engine.stop_session("does-not-exist").is_ok());
    }

    #[test]
    fn position_cleared_tick_removes_session_from_active_map() {
        let store = Arc::new(PersistenceStore::open_in_memory().unwrap());
        let registry = PositionRegistry::new(store.clone());
        registry.upsert("600519.SH", 1000, 10.0, Some(10.5)).unwrap();
        let engine = GridEngine::new(store);
        engine
            .start_session(&registry, "600519.SH", 10.5, 30, GridConfig::moderate_preset())
            .unwrap();

        engine.on_tick("600519.SH", &tick(10.5), Some(0), Some(0));
        assert!(!engine.has_active_session("600519.SH"));
    }
}
