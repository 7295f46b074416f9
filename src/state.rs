//! Shared application state handed to every axum handler via `State`.

use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::ConfigHandle;
use crate::grid::GridEngine;
use crate::middleware::RateLimitLayer;
use crate::orchestrator::MonitorOrchestrator;
use crate::persistence::PersistenceStore;
use crate::position::PositionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub positions: Arc<PositionRegistry>,
    pub grid: Arc<GridEngine>,
    pub orchestrator: Arc<MonitorOrchestrator>,
    pub config: ConfigHandle,
    pub store: Arc<PersistenceStore>,
    pub rate_limiter: RateLimitLayer,
}

impl FromRef<AppState> for RateLimitLayer {
    fn from_ref(state: &AppState) -> Self {
        state.rate_limiter.clone()
    }
}
