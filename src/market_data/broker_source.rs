//! `BrokerDataSource`: wraps the primary `TradeExecutor`'s quote capability.
//! Always priority 0 — consulted first, and exclusively in live mode.

use std::sync::Arc;

use async_trait::async_trait;

use crate::execution::TradeExecutor;
use crate::market_data::DataSource;
use crate::models::Tick;

pub struct BrokerDataSource {
    executor: Arc<dyn TradeExecutor>,
}

impl BrokerDataSource {
    pub fn new(executor: Arc<dyn TradeExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl DataSource for BrokerDataSource {
    fn name(&self) -> &'static str {
        "broker"
    }

    async fn get_tick(&self, symbol: &str) -> anyhow::Result<Tick> {
        self.executor.query_tick(symbol).await
    }
}
