//! MarketDataHub: aggregates one or more `DataSource` capabilities with
//! health-based failover.

pub mod broker_source;
pub mod public_feed;

pub use broker_source::BrokerDataSource;
pub use public_feed::PublicFeedDataSource;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::models::Tick;

const UNHEALTHY_THRESHOLD: u32 = 5;
const HEALTH_RESET_AFTER: Duration = Duration::from_secs(5 * 60);
const HEALTH_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// A pluggable source of ticks. SDKs behind implementations are assumed
/// non-thread-safe, so each source is called from its own dedicated worker
/// (see `orchestrator`); the hub itself never calls a source concurrently
/// with itself.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &'static str;
    async fn get_tick(&self, symbol: &str) -> anyhow::Result<Tick>;
}

struct SourceHealth {
    source: Arc<dyn DataSource>,
    consecutive_errors: u32,
    last_success: Option<Instant>,
    last_error: Option<Instant>,
}

impl SourceHealth {
    fn is_healthy(&self) -> bool {
        self.consecutive_errors < UNHEALTHY_THRESHOLD
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Live,
    Simulation,
}

pub struct MarketDataHub {
    sources: Mutex<Vec<SourceHealth>>,
    mode: OperatingMode,
}

impl MarketDataHub {
    pub fn new(sources: Vec<Arc<dyn DataSource>>, mode: OperatingMode) -> Self {
        let sources = sources
            .into_iter()
            .map(|source| SourceHealth {
                source,
                consecutive_errors: 0,
                last_success: None,
                last_error: None,
            })
            .collect();
        Self {
            sources: Mutex::new(sources),
            mode,
        }
    }

    /// One-time validation that `symbol` is obtainable from at least one
    /// configured source.
    pub async fn subscribe(&self, symbols: &[String]) -> anyhow::Result<()> {
        let candidates: Vec<Arc<dyn DataSource>> = {
            let sources = self.sources.lock();
            sources.iter().map(|s| s.source.clone()).collect()
        };
        for symbol in symbols {
            let mut ok = false;
            for source in &candidates {
                if source.get_tick(symbol).await.is_ok() {
                    ok = true;
                    break;
                }
            }
            if !ok {
                anyhow::bail!("symbol {symbol} is not obtainable from any configured source");
            }
        }
        Ok(())
    }

    /// Never raises: returns `None` ("ErrNoData") when every eligible source
    /// fails. Callers treat this as "skip this tick".
    ///
    /// In `Live` mode only `sources[0]` is ever consulted, healthy or not —
    /// live failover is a deliberate slippage risk the design forbids, not an
    /// oversight. `Simulation` mode retains ordinary health-based failover
    /// across every source.
    pub async fn get_tick(&self, symbol: &str) -> Option<Tick> {
        let candidates: Vec<(usize, Arc<dyn DataSource>)> = {
            let sources = self.sources.lock();
            match self.mode {
                OperatingMode::Live => sources
                    .first()
                    .map(|s| vec![(0, s.source.clone())])
                    .unwrap_or_default(),
                OperatingMode::Simulation => {
                    let mut healthy: Vec<(usize, Arc<dyn DataSource>)> = sources
                        .iter()
                        .enumerate()
                        .filter(|(_, s)| s.is_healthy())
                        .map(|(i, s)| (i, s.source.clone()))
                        .collect();
                    if healthy.is_empty() && !sources.is_empty() {
                        // Every source unhealthy: still try the first in priority
                        // order rather than returning ErrNoData without attempting
                        // anything.
                        healthy.push((0, sources[0].source.clone()));
                    }
                    healthy
                }
            }
        };

        for (idx, source) in candidates {
            match source.get_tick(symbol).await {
                Ok(tick) if !tick.is_stale() => {
                    self.record_success(idx);
                    return Some(tick);
                }
                Ok(_) => {
                    self.record_error(idx);
                }
                Err(e) => {
                    warn!(source = source.name(), symbol, error = %e, "data source error");
                    self.record_error(idx);
                }
            }
        }
        None
    }

    fn record_success(&self, idx: usize) {
        let mut sources = self.sources.lock();
        if let Some(s) = sources.get_mut(idx) {
            s.consecutive_errors = 0;
            s.last_success = Some(Instant::now());
        }
    }

    fn record_error(&self, idx: usize) {
        let mut sources = self.sources.lock();
        if let Some(s) = sources.get_mut(idx) {
            s.consecutive_errors += 1;
            s.last_error = Some(Instant::now());
        }
    }

    /// Background health sweep: resets a source's error counter if more than
    /// `HEALTH_RESET_AFTER` has elapsed since its last successful call.
    /// Intended to be called every `HEALTH_SWEEP_INTERVAL` by the
    /// orchestrator's maintenance loop.
    pub fn health_sweep(&self) {
        let mut sources = self.sources.lock();
        let now = Instant::now();
        for s in sources.iter_mut() {
            if s.consecutive_errors >= UNHEALTHY_THRESHOLD {
                if let Some(last_success) = s.last_success {
                    if now.duration_since(last_success) > HEALTH_RESET_AFTER {
                        info!(source = s.source.name(), "health sweep resetting error counter");
                        s.consecutive_errors = 0;
                    }
                }
            }
        }
    }

    pub fn sweep_interval() -> Duration {
        HEALTH_SWEEP_INTERVAL
    }
}

/// Deterministically replays a fixed fixture of ticks, used in tests instead
/// of hitting a broker or public feed.
pub struct SimulatedDataSource {
    ticks: Mutex<VecDeque<Tick>>,
}

impl SimulatedDataSource {
    pub fn new(ticks: Vec<Tick>) -> Self {
        Self {
            ticks: Mutex::new(ticks.into()),
        }
    }
}

#[async_trait]
impl DataSource for SimulatedDataSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn get_tick(&self, _symbol: &str) -> anyhow::Result<Tick> {
        let mut ticks = self.ticks.lock();
        ticks
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("simulated data source exhausted"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

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

    struct AlwaysFails;
    #[async_trait]
    impl DataSource for AlwaysFails {
        fn name(&self) -> &'static str {
            "always_fails"
        }
        async fn get_tick(&self, _symbol: &str) -> anyhow::Result<Tick> {
            anyhow::bail!("boom")
        }
    }

    #[tokio::test]
    async fn falls_back_to_next_source_in_simulation_mode() {
        let primary = Arc::new(AlwaysFails) as Arc<dyn DataSource>;
        let fallback = Arc::new(SimulatedDataSource::new(vec![tick(10.0)])) as Arc<dyn DataSource>;
        let hub = MarketDataHub::new(vec![primary, fallback], OperatingMode::Simulation);
        let result = hub.get_tick("600519.SH").await;
        assert!(result.is_some());
        assert_eq!(result.unwrap().last, 10.0);
    }

    #[tokio::test]
    async fn live_mode_only_consults_primary_source() {
        let primary = Arc::new(AlwaysFails) as Arc<dyn DataSource>;
        let fallback = Arc::new(SimulatedDataSource::new(vec![tick(10.0)])) as Arc<dyn DataSource>;
        let hub = MarketDataHub::new(vec![primary, fallback], OperatingMode::Live);
        let result = hub.get_tick("600519.SH").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn get_tick_never_raises_and_returns_none_when_exhausted() {
        let source = Arc::new(SimulatedDataSource::new(vec![])) as Arc<dyn DataSource>;
        let hub = MarketDataHub::new(vec![source], OperatingMode::Simulation);
        assert!(hub.get_tick("600519.SH").await.is_none());
    }

    #[tokio::test]
    async fn live_mode_does_not_fail_over_even_after_primary_marked_unhealthy() {
        // Once the primary accumulates enough errors to be marked unhealthy,
        // live mode must still try only sources[0] - never silently promote
        // the fallback, unlike simulation mode's health-based failover.
        let primary = Arc::new(AlwaysFails) as Arc<dyn DataSource>;
        let fallback = Arc::new(SimulatedDataSource::new(vec![
            tick(10.0), tick(10.0), tick(10.0), tick(10.0), tick(10.0), tick(10.0),
        ])) as Arc<dyn DataSource>;
        let hub = MarketDataHub::new(vec![primary, fallback], OperatingMode::Live);

        for _ in 0..UNHEALTHY_THRESHOLD {
            assert!(hub.get_tick("600519.SH").await.is_none());
        }
        assert!(!hub.sources.lock()[0].is_healthy());

        // The primary is now unhealthy, but live mode still must not fail
        // over to the (perfectly healthy) fallback source.
        assert!(hub.get_tick("600519.SH").await.is_none());
    }

    #[tokio::test]
    async fn marks_source_unhealthy_after_five_consecutive_errors() {
        let primary = Arc::new(AlwaysFails) as Arc<dyn DataSource>;
        let fallback = Arc::new(SimulatedDataSource::new(vec![
            tick(10.0), tick(10.0), tick(10.0), tick(10.0), tick(10.0), tick(10.0),
        ])) as Arc<dyn DataSource>;
        let hub = MarketDataHub::new(vec![primary, fallback], OperatingMode::Simulation);
        for _ in 0..UNHEALTHY_THRESHOLD {
            hub.get_tick("600519.SH").await;
        }
        let healthy = hub.sources.lock()[0].is_healthy();
        assert!(!healthy);
    }
}
