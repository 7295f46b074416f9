//! MonitorOrchestrator: the top-level scheduler. Owns the is-monitoring and
//! auto-trading-enabled flags and a trade-calendar predicate, and drives the
//! data-refresh, risk, and maintenance loops on their own cadences.
//!
//! Per the concurrency model, this module dispatches to other components
//! rather than performing broker or data-source I/O itself; the dispatching
//! here (direct `await` calls into `MarketDataHub`/`TradeExecutor`) stands in
//! for a dedicated per-source/per-session worker pool, which is a simplification
//! noted in the design ledger.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Datelike, NaiveTime, TimeZone, Timelike, Utc};
use parking_lot::Mutex as PLMutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::config::ConfigHandle;
use crate::execution::{OrderEvent, TradeExecutor};
use crate::grid::GridEngine;
use crate::market_data::MarketDataHub;
use crate::models::{AccountSnapshot, IntentReason, PriceType, TradeIntent};
use crate::position::PositionRegistry;
use crate::risk::RiskEngine;

/// China A-share continuous trading session, Beijing time, Monday-Friday.
fn is_trade_time(now: chrono::DateTime<Utc>) -> bool {
    let beijing = chrono::FixedOffset::east_opt(8 * 3600).unwrap();
    let local = beijing.from_utc_datetime(&now.naive_utc());
    if matches!(local.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun) {
        return false;
    }
    let t = local.time();
    let morning_open = NaiveTime::from_hms_opt(9, 30, 0).unwrap();
    let morning_close = NaiveTime::from_hms_opt(11, 30, 0).unwrap();
    let afternoon_open = NaiveTime::from_hms_opt(13, 0, 0).unwrap();
    let afternoon_close = NaiveTime::from_hms_opt(15, 0, 0).unwrap();
    (t >= morning_open && t <= morning_close) || (t >= afternoon_open && t <= afternoon_close)
}

/// Broadcast to every connected SSE client roughly once per refresh cycle.
/// Populated by the orchestrator's loops, read only by `api::sse`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SsePayload {
    pub account_info: Option<AccountSnapshot>,
    pub monitoring: MonitoringFlags,
    pub positions_update: PositionsUpdate,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MonitoringFlags {
    pub is_monitoring: bool,
    pub auto_trading_enabled: bool,
    pub allow_buy: bool,
    pub allow_sell: bool,
    pub simulation_mode: bool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PositionsUpdate {
    pub changed: bool,
    pub version: u64,
}

pub struct MonitorOrchestrator {
    monitoring: AtomicBool,
    auto_trading_enabled: AtomicBool,
    hub: Arc<MarketDataHub>,
    positions: Arc<PositionRegistry>,
    grid: Arc<GridEngine>,
    risk: PLMutex<RiskEngine>,
    executor: Arc<dyn TradeExecutor>,
    store: Arc<crate::persistence::PersistenceStore>,
    config: ConfigHandle,
    events: broadcast::Sender<SsePayload>,
    pending_intents: PLMutex<HashMap<String, TradeIntent>>,
    last_account: PLMutex<Option<AccountSnapshot>>,
    last_broadcast_version: std::sync::atomic::AtomicU64,
}

impl MonitorOrchestrator {
    pub fn new(
        hub: Arc<MarketDataHub>,
        positions: Arc<PositionRegistry>,
        grid: Arc<GridEngine>,
        executor: Arc<dyn TradeExecutor>,
        store: Arc<crate::persistence::PersistenceStore>,
        config: ConfigHandle,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            monitoring: AtomicBool::new(false),
            auto_trading_enabled: AtomicBool::new(config.load().global_allow_buy_sell),
            hub,
            positions,
            grid,
            risk: PLMutex::new(RiskEngine::new()),
            executor,
            store,
            config,
            events,
            pending_intents: PLMutex::new(HashMap::new()),
            last_account: PLMutex::new(None),
            last_broadcast_version: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SsePayload> {
        self.events.subscribe()
    }

    fn broadcast_snapshot(&self) {
        let config = self.config.load();
        let version = self.positions.version();
        let changed = self
            .last_broadcast_version
            .swap(version, Ordering::AcqRel)
            != version;
        let payload = SsePayload {
            account_info: self.last_account.lock().clone(),
            monitoring: MonitoringFlags {
                is_monitoring: self.is_monitoring(),
                auto_trading_enabled: self.auto_trading_enabled(),
                allow_buy: config.allow_buy,
                allow_sell: config.allow_sell,
                simulation_mode: config.simulation_mode,
            },
            positions_update: PositionsUpdate { changed, version },
        };
        self.events.send(payload).ok();
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring.load(Ordering::Acquire)
    }

    pub fn start_monitoring(&self) {
        self.monitoring.store(true, Ordering::Release);
        info!("monitoring started");
    }

    pub fn stop_monitoring(&self) {
        self.monitoring.store(false, Ordering::Release);
        info!("monitoring stopped");
    }

    pub fn auto_trading_enabled(&self) -> bool {
        self.auto_trading_enabled.load(Ordering::Acquire)
    }

    pub fn set_auto_trading_enabled(&self, enabled: bool) {
        self.auto_trading_enabled.store(enabled, Ordering::Release);
    }

    /// Spawns the three background loops. Returns their join handles so the
    /// caller (main) can await graceful shutdown.
    pub fn spawn(self: &Arc<Self>, order_events: mpsc::UnboundedReceiver<OrderEvent>) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();
        handles.push(tokio::spawn(Self::data_refresh_loop(self.clone())));
        handles.push(tokio::spawn(Self::risk_loop(self.clone())));
        handles.push(tokio::spawn(Self::maintenance_loop(self.clone())));
        handles.push(tokio::spawn(Self::order_event_loop(self.clone(), order_events)));
        handles
    }

    fn gated(&self) -> bool {
        self.is_monitoring() && self.auto_trading_enabled() && is_trade_time(Utc::now())
    }

    /// `RefreshPrices` always runs; grid `OnTick` dispatch is gated.
    async fn data_refresh_loop(self: Arc<Self>) {
        loop {
            let config = self.config.load();
            let interval = if is_trade_time(Utc::now()) {
                config.refresh_interval_ms
            } else {
                config.idle_refresh_interval_ms
            };
            drop(config);

            if self.is_monitoring() {
                self.refresh_tick().await;
            }

            tokio::time::sleep(std::time::Duration::from_millis(interval)).await;
        }
    }

    async fn refresh_tick(&self) {
        let symbols: Vec<String> = self
            .positions
            .all()
            .into_iter()
            .map(|p| p.symbol)
            .chain(self.grid.session_ids())
            .collect();
        let mut ticks: HashMap<String, crate::models::Tick> = HashMap::new();
        for symbol in symbols {
            if ticks.contains_key(&symbol) {
                continue;
            }
            if let Some(tick) = self.hub.get_tick(&symbol).await {
                ticks.insert(symbol, tick);
            }
        }

        if let Err(e) = self.positions.refresh_prices(|symbol| ticks.get(symbol).cloned()) {
            warn!(error = %e, "failed refreshing position prices");
        }
        self.broadcast_snapshot();

        if !self.gated() {
            return;
        }
        for session_symbol in self.grid.session_ids() {
            let Some(tick) = ticks.get(&session_symbol) else { continue };
            let position = self.positions.get(&session_symbol);
            let volume = position.as_ref().map(|p| p.volume);
            let available = position.as_ref().map(|p| p.available);
            if let Some(outcome) = self.grid.on_tick(&session_symbol, tick, volume, available) {
                for intent in outcome.intents {
                    self.dispatch_intent(intent);
                }
            }
        }
    }

    /// For every position, invoke RiskEngine and forward intents to the
    /// executor. Gated on trading hours and the kill switch.
    async fn risk_loop(self: Arc<Self>) {
        loop {
            let interval_ms = self.config.load().refresh_interval_ms.max(1_000);
            if self.gated() {
                let config = self.config.load();
                let positions = self.positions.all();
                let portfolio_market_value: f64 = positions.iter().map(|p| p.market_value()).sum();
                for position in &positions {
                    let tick = self.hub.get_tick(&position.symbol).await;
                    let intents =
                        self.risk
                            .lock()
                            .evaluate(position, tick.as_ref(), &config, portfolio_market_value);
                    for intent in intents {
                        self.dispatch_intent(intent);
                    }
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(interval_ms)).await;
        }
    }

    /// Log rotation, stale-session scan, and MarketDataHub health sweep.
    async fn maintenance_loop(self: Arc<Self>) {
        loop {
            let interval = self.config.load().maintenance_interval_secs;
            tokio::time::sleep(std::time::Duration::from_secs(interval)).await;
            self.hub.health_sweep();
            if let Err(e) = self.store.optimize() {
                warn!(error = %e, "database maintenance optimize failed");
            }
            if let Ok(snapshot) = self.executor.query_account().await {
                *self.last_account.lock() = Some(snapshot);
            }
            info!(
                active_sessions = self.grid.session_ids().len(),
                "maintenance sweep complete"
            );
        }
    }

    /// Drains fills/order-status/account updates emitted by the
    /// `TradeExecutor` and applies them to the registry, grid stats, and SSE.
    async fn order_event_loop(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<OrderEvent>) {
        while let Some(event) = rx.recv().await {
            match event {
                OrderEvent::Fill(deal) => {
                    let reason = self
                        .pending_intents
                        .lock()
                        .get(&deal.order_id)
                        .map(|i| i.reason);

                    if let Err(e) = self.positions.register_fill(&deal) {
                        error!(error = %e, symbol = %deal.symbol, "failed to register fill");
                        continue;
                    }
                    if matches!(reason, Some(IntentReason::GridBuy) | Some(IntentReason::GridSell)) {
                        if let Err(e) = self.grid.record_fill(&deal.symbol, deal.side, deal.price, deal.volume) {
                            warn!(error = %e, symbol = %deal.symbol, "failed to record grid fill");
                        }
                    }
                    let trade = crate::models::Trade {
                        id: 0,
                        symbol: deal.symbol.clone(),
                        trade_time: deal.trade_time,
                        side: deal.side,
                        price: deal.price,
                        volume: deal.volume,
                        order_id: deal.order_id.clone(),
                        commission: deal.commission,
                        strategy_tag: reason.map(|r| r.as_str().to_string()).unwrap_or_else(|| "MANUAL".to_string()),
                    };
                    if let Err(e) = self.store.insert_trade(&trade) {
                        warn!(error = %e, "failed to persist trade record");
                    }
                    self.broadcast_snapshot();
                }
                OrderEvent::Order { order_id, status } => {
                    if let Err(e) = self.store.update_order_status(&order_id, status.as_str()) {
                        warn!(error = %e, order_id, "failed to persist order status");
                    }
                    if status.is_terminal() {
                        self.pending_intents.lock().remove(&order_id);
                    }
                }
                OrderEvent::Account(snapshot) => {
                    *self.last_account.lock() = Some(snapshot);
                    self.broadcast_snapshot();
                }
                OrderEvent::Error(err) => {
                    warn!(error = %err, "executor reported an error");
                }
            }
        }
    }

    fn dispatch_intent(self: &Arc<Self>, intent: TradeIntent) {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            let price_type = PriceType::Limit;
            match orchestrator
                .executor
                .place_order(&intent.symbol, intent.side, intent.qty, intent.price, price_type)
                .await
            {
                Ok(order_id) => {
                    if let Err(e) = orchestrator.store.record_order(
                        &order_id,
                        &intent.symbol,
                        intent.side,
                        intent.qty,
                        intent.price,
                        "LIMIT",
                        crate::models::OrderStatus::Submitted.as_str(),
                        intent.reason.as_str(),
                    ) {
                        warn!(error = %e, order_id, "failed to persist order record");
                    }
                    orchestrator.pending_intents.lock().insert(order_id, intent);
                }
                Err(e) => {
                    warn!(symbol = %intent.symbol, reason = intent.reason.as_str(), error = %e, "order placement failed");
                }
            }
        });
    }

    /// One-shot manual buy path for `/api/actions/execute_buy`.
    pub fn execute_manual_buy(self: &Arc<Self>, symbol: String, qty: i64, price: f64) {
        self.dispatch_intent(TradeIntent {
            symbol,
            side: crate::models::Side::Buy,
            qty,
            price,
            reason: IntentReason::Replenish,
        });
    }

    pub fn is_trade_time_now(&self) -> bool {
        is_trade_time(Utc::now())
    }

    /// The most recent account snapshot reported by the executor, if any has
    /// arrived yet (via the maintenance sweep or an `OrderEvent::Account`).
    pub fn last_account(&self) -> Option<AccountSnapshot> {
        self.last_account.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_time_recognizes_morning_session() {
        // 2024-01-02 is a Tuesday; 10:00 Beijing = 02:00 UTC.
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap();
        assert!(is_trade_time(t));
    }

    #[test]
    fn trade_time_excludes_lunch_break() {
        // 12:15 Beijing = 04:15 UTC.
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 4, 15, 0).unwrap();
        assert!(!is_trade_time(t));
    }

    #[test]
    fn trade_time_excludes_weekends() {
        // 2024-01-06 is a Saturday.
        let t = Utc.with_ymd_and_hms(2024, 1, 6, 2, 0, 0).unwrap();
        assert!(!is_trade_time(t));
    }
}
