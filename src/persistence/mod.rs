//! SQLite persistence layer.
//!
//! A single connection guarded by `parking_lot::Mutex`, WAL mode, prepared
//! statements cached per call — the same shape as the teacher's signal store.
//! Every other component reaches the database only through `PersistenceStore`;
//! nothing outside this module issues SQL.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, Row};
use tracing::{info, warn};

use crate::grid::{GridConfig, GridSession, GridStats, GridTradeEvent, SessionStatus};
use crate::models::{Position, RiskTemplate, Side, Trade};

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -32000;
PRAGMA temp_store = MEMORY;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS positions (
    symbol              TEXT PRIMARY KEY,
    volume              INTEGER NOT NULL,
    available           INTEGER NOT NULL,
    avg_cost            REAL NOT NULL,
    base_cost           REAL NOT NULL,
    current_price       REAL NOT NULL,
    highest_price       REAL NOT NULL,
    stop_loss_price     REAL NOT NULL,
    first_profit_triggered INTEGER NOT NULL,
    open_date           TEXT NOT NULL
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS trade_records (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol          TEXT NOT NULL,
    trade_time      TEXT NOT NULL,
    side            TEXT NOT NULL,
    price           REAL NOT NULL,
    volume          INTEGER NOT NULL,
    order_id        TEXT NOT NULL,
    commission      REAL NOT NULL,
    strategy_tag    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_trade_records_symbol_time
    ON trade_records(symbol, trade_time);

CREATE TABLE IF NOT EXISTS grid_sessions (
    session_id          TEXT PRIMARY KEY,
    symbol              TEXT NOT NULL,
    status              TEXT NOT NULL,
    center_price        REAL NOT NULL,
    current_center_price REAL NOT NULL,
    start_time          TEXT NOT NULL,
    end_time            TEXT NOT NULL,
    duration_days       INTEGER NOT NULL,
    price_interval      REAL NOT NULL,
    position_ratio      REAL NOT NULL,
    callback_ratio      REAL NOT NULL,
    max_investment      REAL NOT NULL,
    max_deviation       REAL NOT NULL,
    target_profit       REAL NOT NULL,
    stop_loss           REAL NOT NULL,
    risk_level          TEXT NOT NULL,
    buy_count           INTEGER NOT NULL,
    sell_count          INTEGER NOT NULL,
    current_investment  REAL NOT NULL,
    realized_pnl        REAL NOT NULL,
    total_buy_amount    REAL NOT NULL DEFAULT 0.0,
    total_sell_amount   REAL NOT NULL DEFAULT 0.0,
    last_exit_reason    TEXT
);
CREATE INDEX IF NOT EXISTS idx_grid_sessions_symbol ON grid_sessions(symbol);
CREATE UNIQUE INDEX IF NOT EXISTS idx_grid_sessions_active_symbol
    ON grid_sessions(symbol) WHERE status = 'active';

CREATE TABLE IF NOT EXISTS grid_trades (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    stock_code      TEXT NOT NULL,
    grid_level      INTEGER NOT NULL,
    buy_price       REAL,
    sell_price      REAL,
    volume          INTEGER NOT NULL,
    status          TEXT NOT NULL,
    create_time     TEXT NOT NULL,
    update_time     TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_grid_trades_stock ON grid_trades(stock_code);

CREATE TABLE IF NOT EXISTS grid_trade_events (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id      TEXT NOT NULL,
    side            TEXT NOT NULL,
    band_index      INTEGER NOT NULL,
    price           REAL NOT NULL,
    volume          INTEGER NOT NULL,
    timestamp       TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_grid_trade_events_session
    ON grid_trade_events(session_id, timestamp);

CREATE TABLE IF NOT EXISTS risk_templates (
    name            TEXT PRIMARY KEY,
    price_interval  REAL NOT NULL,
    position_ratio  REAL NOT NULL,
    callback_ratio  REAL NOT NULL,
    max_investment  REAL NOT NULL,
    max_deviation   REAL NOT NULL,
    target_profit   REAL NOT NULL,
    stop_loss       REAL NOT NULL,
    risk_level      TEXT NOT NULL,
    description     TEXT NOT NULL,
    is_default      INTEGER NOT NULL,
    usage_count     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS orders (
    order_id        TEXT PRIMARY KEY,
    symbol          TEXT NOT NULL,
    side            TEXT NOT NULL,
    qty             INTEGER NOT NULL,
    price           REAL NOT NULL,
    price_type      TEXT NOT NULL,
    status          TEXT NOT NULL,
    submitted_at    TEXT NOT NULL,
    strategy_tag    TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_orders_symbol ON orders(symbol);

CREATE TABLE IF NOT EXISTS stock_daily_data (
    symbol      TEXT NOT NULL,
    trade_date  TEXT NOT NULL,
    open        REAL NOT NULL,
    high        REAL NOT NULL,
    low         REAL NOT NULL,
    close       REAL NOT NULL,
    volume      INTEGER NOT NULL,
    amount      REAL NOT NULL,
    PRIMARY KEY (symbol, trade_date)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS stock_indicators (
    symbol      TEXT NOT NULL,
    trade_date  TEXT NOT NULL,
    indicator   TEXT NOT NULL,
    value       REAL NOT NULL,
    PRIMARY KEY (symbol, trade_date, indicator)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS metadata (
    key     TEXT PRIMARY KEY,
    value   TEXT NOT NULL
);
"#;

pub struct PersistenceStore {
    conn: Arc<Mutex<Connection>>,
}

impl PersistenceStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("failed to open database at {db_path}"))?;

        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize database schema")?;

        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap_or_default();
        if journal_mode.to_lowercase() != "wal" {
            warn!(journal_mode, "WAL mode not active");
        }

        let position_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM positions", [], |row| row.get(0))
            .unwrap_or(0);
        info!(position_count, db_path, "persistence store opened");

        conn.execute(
            "INSERT OR IGNORE INTO metadata (key, value) VALUES ('positions_version', '0')",
            [],
        )
        .ok();

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory store for tests that don't want to touch disk.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // ---- positions ----

    pub fn upsert_position(&self, p: &Position) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO positions
                (symbol, volume, available, avg_cost, base_cost, current_price,
                 highest_price, stop_loss_price, first_profit_triggered, open_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(symbol) DO UPDATE SET
                volume=excluded.volume,
                available=excluded.available,
                avg_cost=excluded.avg_cost,
                base_cost=excluded.base_cost,
                current_price=excluded.current_price,
                highest_price=excluded.highest_price,
                stop_loss_price=excluded.stop_loss_price,
                first_profit_triggered=excluded.first_profit_triggered",
        )?
        .execute(params![
            p.symbol,
            p.volume,
            p.available,
            p.avg_cost,
            p.base_cost,
            p.current_price,
            p.highest_price,
            p.stop_loss_price,
            p.first_profit_triggered as i64,
            p.open_date.to_rfc3339(),
        ])?;
        Ok(())
    }

    pub fn remove_position(&self, symbol: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached("DELETE FROM positions WHERE symbol = ?1")?
            .execute(params![symbol])?;
        Ok(())
    }

    pub fn load_positions(&self) -> Result<Vec<Position>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT symbol, volume, available, avg_cost, base_cost, current_price,
                    highest_price, stop_loss_price, first_profit_triggered, open_date
             FROM positions",
        )?;
        let rows = stmt
            .query_map([], Self::row_to_position)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn row_to_position(row: &Row) -> rusqlite::Result<Position> {
        let open_date: String = row.get(9)?;
        Ok(Position {
            symbol: row.get(0)?,
            volume: row.get(1)?,
            available: row.get(2)?,
            avg_cost: row.get(3)?,
            base_cost: row.get(4)?,
            current_price: row.get(5)?,
            highest_price: row.get(6)?,
            stop_loss_price: row.get(7)?,
            first_profit_triggered: row.get::<_, i64>(8)? != 0,
            open_date: parse_rfc3339(&open_date),
        })
    }

    // ---- trades ----

    pub fn insert_trade(&self, t: &Trade) -> Result<i64> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO trade_records
                (symbol, trade_time, side, price, volume, order_id, commission, strategy_tag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?
        .execute(params![
            t.symbol,
            t.trade_time.to_rfc3339(),
            t.side.as_str(),
            t.price,
            t.volume,
            t.order_id,
            t.commission,
            t.strategy_tag,
        ])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn recent_trades(&self, limit: i64) -> Result<Vec<Trade>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, symbol, trade_time, side, price, volume, order_id, commission, strategy_tag
             FROM trade_records ORDER BY trade_time DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], Self::row_to_trade)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn row_to_trade(row: &Row) -> rusqlite::Result<Trade> {
        let side: String = row.get(3)?;
        let trade_time: String = row.get(2)?;
        Ok(Trade {
            id: row.get(0)?,
            symbol: row.get(1)?,
            trade_time: parse_rfc3339(&trade_time),
            side: if side == "BUY" { Side::Buy } else { Side::Sell },
            price: row.get(4)?,
            volume: row.get(5)?,
            order_id: row.get(6)?,
            commission: row.get(7)?,
            strategy_tag: row.get(8)?,
        })
    }

    // ---- grid sessions ----

    pub fn upsert_grid_session(&self, s: &GridSession) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO grid_sessions
                (session_id, symbol, status, center_price, current_center_price,
                 start_time, end_time, duration_days,
                 price_interval, position_ratio, callback_ratio, max_investment,
                 max_deviation, target_profit, stop_loss, risk_level,
                 buy_count, sell_count, current_investment, realized_pnl,
                 total_buy_amount, total_sell_amount, last_exit_reason)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23)
             ON CONFLICT(session_id) DO UPDATE SET
                status=excluded.status,
                current_center_price=excluded.current_center_price,
                buy_count=excluded.buy_count,
                sell_count=excluded.sell_count,
                current_investment=excluded.current_investment,
                realized_pnl=excluded.realized_pnl,
                total_buy_amount=excluded.total_buy_amount,
                total_sell_amount=excluded.total_sell_amount,
                last_exit_reason=excluded.last_exit_reason",
        )?
        .execute(params![
            s.session_id,
            s.symbol,
            s.status.as_str(),
            s.center_price,
            s.current_center_price,
            s.start_time.to_rfc3339(),
            s.end_time.to_rfc3339(),
            s.duration_days,
            s.config.price_interval,
            s.config.position_ratio,
            s.config.callback_ratio,
            s.config.max_investment,
            s.config.max_deviation,
            s.config.target_profit,
            s.config.stop_loss,
            s.config.risk_level.as_str(),
            s.stats.buy_count,
            s.stats.sell_count,
            s.stats.current_investment,
            s.stats.realized_pnl,
            s.stats.total_buy_amount,
            s.stats.total_sell_amount,
            s.last_exit_reason,
        ])?;
        Ok(())
    }

    pub fn load_active_grid_sessions(&self) -> Result<Vec<GridSession>> {
        self.load_grid_sessions_where("status = 'active'")
    }

    pub fn load_all_grid_sessions(&self) -> Result<Vec<GridSession>> {
        self.load_grid_sessions_where("1=1")
    }

    fn load_grid_sessions_where(&self, predicate: &str) -> Result<Vec<GridSession>> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT session_id, symbol, status, center_price, current_center_price,
                    start_time, end_time, duration_days,
                    price_interval, position_ratio, callback_ratio, max_investment,
                    max_deviation, target_profit, stop_loss, risk_level,
                    buy_count, sell_count, current_investment, realized_pnl,
                    total_buy_amount, total_sell_amount, last_exit_reason
             FROM grid_sessions WHERE {predicate}"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map([], Self::row_to_grid_session)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    fn row_to_grid_session(row: &Row) -> rusqlite::Result<GridSession> {
        let status: String = row.get(2)?;
        let start_time: String = row.get(5)?;
        let end_time: String = row.get(6)?;
        let risk_level: String = row.get(15)?;
        Ok(GridSession::rehydrate(
            row.get(0)?,
            row.get(1)?,
            SessionStatus::from_str(&status),
            row.get(3)?,
            row.get(4)?,
            parse_rfc3339(&start_time),
            parse_rfc3339(&end_time),
            row.get(7)?,
            GridConfig {
                price_interval: row.get(8)?,
                position_ratio: row.get(9)?,
                callback_ratio: row.get(10)?,
                max_investment: row.get(11)?,
                max_deviation: row.get(12)?,
                target_profit: row.get(13)?,
                stop_loss: row.get(14)?,
                risk_level: crate::grid::RiskLevel::from_str(&risk_level),
            },
            GridStats {
                buy_count: row.get(16)?,
                sell_count: row.get(17)?,
                current_investment: row.get(18)?,
                realized_pnl: row.get(19)?,
                total_buy_amount: row.get(20)?,
                total_sell_amount: row.get(21)?,
            },
            row.get(22)?,
        ))
    }

    // ---- grid trade events ----

    pub fn insert_grid_trade_event(&self, e: &GridTradeEvent) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO grid_trade_events (session_id, side, band_index, price, volume, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![
            e.session_id,
            e.side.as_str(),
            e.band_index,
            e.price,
            e.volume,
            e.timestamp.to_rfc3339(),
        ])?;
        Ok(())
    }

    // ---- risk templates ----

    pub fn upsert_risk_template(&self, t: &RiskTemplate) -> Result<()> {
        let conn = self.conn.lock();
        if t.is_default {
            conn.execute("UPDATE risk_templates SET is_default = 0", [])?;
        }
        conn.prepare_cached(
            "INSERT INTO risk_templates
                (name, price_interval, position_ratio, callback_ratio, max_investment,
                 max_deviation, target_profit, stop_loss, risk_level, description,
                 is_default, usage_count)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)
             ON CONFLICT(name) DO UPDATE SET
                price_interval=excluded.price_interval,
                position_ratio=excluded.position_ratio,
                callback_ratio=excluded.callback_ratio,
                max_investment=excluded.max_investment,
                max_deviation=excluded.max_deviation,
                target_profit=excluded.target_profit,
                stop_loss=excluded.stop_loss,
                risk_level=excluded.risk_level,
                description=excluded.description,
                is_default=excluded.is_default",
        )?
        .execute(params![
            t.name,
            t.config.price_interval,
            t.config.position_ratio,
            t.config.callback_ratio,
            t.config.max_investment,
            t.config.max_deviation,
            t.config.target_profit,
            t.config.stop_loss,
            t.config.risk_level.as_str(),
            t.description,
            t.is_default as i64,
            t.usage_count,
        ])?;
        Ok(())
    }

    pub fn delete_risk_template(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached("DELETE FROM risk_templates WHERE name = ?1")?
            .execute(params![name])?;
        Ok(())
    }

    pub fn increment_template_usage(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "UPDATE risk_templates SET usage_count = usage_count + 1 WHERE name = ?1",
        )?
        .execute(params![name])?;
        Ok(())
    }

    pub fn load_risk_templates(&self) -> Result<Vec<RiskTemplate>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT name, price_interval, position_ratio, callback_ratio, max_investment,
                    max_deviation, target_profit, stop_loss, risk_level, description,
                    is_default, usage_count
             FROM risk_templates",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let risk_level: String = row.get(8)?;
                Ok(RiskTemplate {
                    name: row.get(0)?,
                    config: GridConfig {
                        price_interval: row.get(1)?,
                        position_ratio: row.get(2)?,
                        callback_ratio: row.get(3)?,
                        max_investment: row.get(4)?,
                        max_deviation: row.get(5)?,
                        target_profit: row.get(6)?,
                        stop_loss: row.get(7)?,
                        risk_level: crate::grid::RiskLevel::from_str(&risk_level),
                    },
                    description: row.get(9)?,
                    is_default: row.get::<_, i64>(10)? != 0,
                    usage_count: row.get(11)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    // ---- orders ----

    /// Records a freshly-placed order so a process restart can reconcile
    /// in-flight orders by `order_id` (fills may arrive out of order, per
    /// the concurrency model's ordering guarantees).
    #[allow(clippy::too_many_arguments)]
    pub fn record_order(
        &self,
        order_id: &str,
        symbol: &str,
        side: Side,
        qty: i64,
        price: f64,
        price_type: &str,
        status: &str,
        strategy_tag: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached(
            "INSERT INTO orders
                (order_id, symbol, side, qty, price, price_type, status, submitted_at, strategy_tag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(order_id) DO UPDATE SET status=excluded.status",
        )?
        .execute(params![
            order_id,
            symbol,
            side.as_str(),
            qty,
            price,
            price_type,
            status,
            Utc::now().to_rfc3339(),
            strategy_tag,
        ])?;
        Ok(())
    }

    pub fn update_order_status(&self, order_id: &str, status: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.prepare_cached("UPDATE orders SET status = ?1 WHERE order_id = ?2")?
            .execute(params![status, order_id])?;
        Ok(())
    }

    // ---- metadata / versioning ----

    pub fn get_positions_version(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let value: String = conn.query_row(
            "SELECT value FROM metadata WHERE key = 'positions_version'",
            [],
            |row| row.get(0),
        )?;
        Ok(value.parse().unwrap_or(0))
    }

    pub fn set_positions_version(&self, version: u64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO metadata (key, value) VALUES ('positions_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![version.to_string()],
        )?;
        Ok(())
    }

    pub fn optimize(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch("PRAGMA optimize; PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::RiskLevel;

    fn sample_position() -> Position {
        Position {
            symbol: "600519.SH".into(),
            volume: 1000,
            available: 1000,
            avg_cost: 10.0,
            base_cost: 10.0,
            current_price: 10.5,
            highest_price: 10.5,
            stop_loss_price: 9.3,
            first_profit_triggered: false,
            open_date: Utc::now(),
        }
    }

    #[test]
    fn upsert_and_load_position_round_trips() {
        let store = PersistenceStore::open_in_memory().unwrap();
        store.upsert_position(&sample_position()).unwrap();
        let loaded = store.load_positions().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].symbol, "600519.SH");
        assert_eq!(loaded[0].volume, 1000);
    }

    /// Exercises the real on-disk path (`PersistenceStore::new`), not just
    /// the in-memory fixture: WAL mode, schema creation, and a reopen of the
    /// same file all need to work against an actual filesystem.
    #[test]
    fn on_disk_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("equity_supervisor_test.db");
        let db_path = db_path.to_str().unwrap();

        {
            let store = PersistenceStore::new(db_path).unwrap();
            store.upsert_position(&sample_position()).unwrap();
            store.set_positions_version(3).unwrap();
        }

        let reopened = PersistenceStore::new(db_path).unwrap();
        let loaded = reopened.load_positions().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].symbol, "600519.SH");
        assert_eq!(reopened.get_positions_version().unwrap(), 3);
    }

    #[test]
    fn remove_position_clears_row() {
        let store = PersistenceStore::open_in_memory().unwrap();
        store.upsert_position(&sample_position()).unwrap();
        store.remove_position("600519.SH").unwrap();
        assert!(store.load_positions().unwrap().is_empty());
    }

    #[test]
    fn positions_version_defaults_to_zero_then_persists() {
        let store = PersistenceStore::open_in_memory().unwrap();
        assert_eq!(store.get_positions_version().unwrap(), 0);
        store.set_positions_version(7).unwrap();
        assert_eq!(store.get_positions_version().unwrap(), 7);
    }

    #[test]
    fn record_order_then_update_status_round_trips() {
        let store = PersistenceStore::open_in_memory().unwrap();
        store
            .record_order("SIM-1", "600519.SH", Side::Buy, 100, 10.0, "LIMIT", "SUBMITTED", "GRID_BUY")
            .unwrap();
        store.update_order_status("SIM-1", "FILLED").unwrap();
        let status: String = store
            .conn
            .lock()
            .query_row("SELECT status FROM orders WHERE order_id = 'SIM-1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(status, "FILLED");
    }

    #[test]
    fn risk_template_default_flag_is_exclusive() {
        let store = PersistenceStore::open_in_memory().unwrap();
        let cfg = GridConfig {
            price_interval: 0.02,
            position_ratio: 0.2,
            callback_ratio: 0.005,
            max_investment: 10_000.0,
            max_deviation: 0.1,
            target_profit: 0.1,
            stop_loss: -0.1,
            risk_level: RiskLevel::Moderate,
        };
        store
            .upsert_risk_template(&RiskTemplate {
                name: "a".into(),
                config: cfg.clone(),
                description: "a".into(),
                is_default: true,
                usage_count: 0,
            })
            .unwrap();
        store
            .upsert_risk_template(&RiskTemplate {
                name: "b".into(),
                config: cfg,
                description: "b".into(),
                is_default: true,
                usage_count: 0,
            })
            .unwrap();
        let templates = store.load_risk_templates().unwrap();
        let defaults: Vec<_> = templates.iter().filter(|t| t.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].name, "b");
    }
}
