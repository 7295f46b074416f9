//! TradeExecutor: capability abstraction over the broker SDK.
//!
//! Operations are async with callbacks landing on an inbound event channel
//! (`OrderEvent`) rather than running broker-callback-thread logic directly —
//! see `orchestrator` for the consumer worker.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::info;

use crate::models::{AccountSnapshot, Deal, OrderStatus, PriceType, Side, Tick};

#[derive(Debug, Clone)]
pub enum OrderEvent {
    Order { order_id: String, status: OrderStatus },
    Fill(Deal),
    Account(AccountSnapshot),
    Error(String),
}

#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        qty: i64,
        price: f64,
        price_type: PriceType,
    ) -> anyhow::Result<String>;

    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<()>;

    async fn query_account(&self) -> anyhow::Result<AccountSnapshot>;

    /// Broker SDKs in this domain typically expose a quote capability
    /// alongside order management; `MarketDataHub`'s `BrokerDataSource`
    /// delegates here.
    async fn query_tick(&self, symbol: &str) -> anyhow::Result<Tick>;
}

/// Fills immediately at the requested price (or the last known tick if
/// market), never rejects unless pre-validation fails. Used for paper
/// trading and tests.
pub struct SimulationExecutor {
    events: mpsc::UnboundedSender<OrderEvent>,
    next_order_id: std::sync::atomic::AtomicU64,
}

impl SimulationExecutor {
    pub fn new(events: mpsc::UnboundedSender<OrderEvent>) -> Self {
        Self {
            events,
            next_order_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    fn allocate_order_id(&self) -> String {
        let n = self
            .next_order_id
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        format!("SIM-{n}")
    }
}

#[async_trait]
impl TradeExecutor for SimulationExecutor {
    async fn place_order(
        &self,
        symbol: &str,
        side: Side,
        qty: i64,
        price: f64,
        _price_type: PriceType,
    ) -> anyhow::Result<String> {
        if qty <= 0 {
            anyhow::bail!("qty must be positive");
        }
        let order_id = self.allocate_order_id();
        info!(order_id, symbol, qty, price, side = side.as_str(), "simulated order placed");

        let _ = self.events.send(OrderEvent::Order {
            order_id: order_id.clone(),
            status: OrderStatus::Accepted,
        });
        let _ = self.events.send(OrderEvent::Fill(Deal {
            order_id: order_id.clone(),
            symbol: symbol.to_string(),
            side,
            price,
            volume: qty,
            commission: 0.0,
            trade_time: Utc::now(),
        }));
        let _ = self.events.send(OrderEvent::Order {
            order_id: order_id.clone(),
            status: OrderStatus::Filled,
        });
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> anyhow::Result<()> {
        // A simulated order fills before the caller can cancel it.
        let _ = self.events.send(OrderEvent::Order {
            order_id: order_id.to_string(),
            status: OrderStatus::Rejected,
        });
        Ok(())
    }

    async fn query_account(&self) -> anyhow::Result<AccountSnapshot> {
        Ok(AccountSnapshot {
            available: 1_000_000.0,
            total_asset: 1_000_000.0,
            market_value: 0.0,
        })
    }

    async fn query_tick(&self, _symbol: &str) -> anyhow::Result<Tick> {
        anyhow::bail!("SimulationExecutor does not provide market data; use SimulatedDataSource")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_buy_fills_immediately_at_requested_price() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let executor = SimulationExecutor::new(tx);
        let order_id = executor
            .place_order("600519.SH", Side::Buy, 100, 10.0, PriceType::Limit)
            .await
            .unwrap();
        assert!(order_id.starts_with("SIM-"));

        let mut saw_fill = false;
        while let Ok(event) = rx.try_recv() {
            if let OrderEvent::Fill(deal) = event {
                assert_eq!(deal.price, 10.0);
                assert_eq!(deal.volume, 100);
                saw_fill = true;
            }
        }
        assert!(saw_fill);
    }

    #[tokio::test]
    async fn rejects_non_positive_quantity() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let executor = SimulationExecutor::new(tx);
        let result = executor
            .place_order("600519.SH", Side::Buy, 0, 10.0, PriceType::Limit)
            .await;
        assert!(result.is_err());
    }
}
