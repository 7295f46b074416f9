//! `PublicFeedDataSource`: an HTTP-polling fallback source, consulted only in
//! simulation operating mode.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::market_data::DataSource;
use crate::models::Tick;

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    last: f64,
    open: f64,
    high: f64,
    low: f64,
    prev_close: f64,
    volume: i64,
    amount: f64,
}

pub struct PublicFeedDataSource {
    client: Client,
    base_url: String,
}

impl PublicFeedDataSource {
    pub fn new(base_url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(3))
                .build()
                .expect("reqwest client builds with sane defaults"),
            base_url,
        }
    }
}

#[async_trait]
impl DataSource for PublicFeedDataSource {
    fn name(&self) -> &'static str {
        "public_feed"
    }

    async fn get_tick(&self, symbol: &str) -> anyhow::Result<Tick> {
        let url = format!("{}/quote/{symbol}", self.base_url);
        debug!(url, "polling public feed");
        let resp: QuoteResponse = self.client.get(&url).send().await?.error_for_status()?.json().await?;
        Ok(Tick {
            last: resp.last,
            open: resp.open,
            high: resp.high,
            low: resp.low,
            prev_close: resp.prev_close,
            volume: resp.volume,
            amount: resp.amount,
            ts: Utc::now(),
        })
    }
}
