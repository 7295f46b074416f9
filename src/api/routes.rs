//! REST handlers for the equity supervisor API. Every handler returns
//! `ApiResponse<T>` on success; `AppError` converts into the matching
//! `{status: "error", message}` envelope via its own `IntoResponse`.

use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::grid::{GridConfig, GridSessionSnapshot};
use crate::models::{validate_symbol, AccountSnapshot, RiskTemplate, Trade};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status: "success",
            message: None,
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn ok_empty() -> Self {
        Self {
            status: "success",
            message: None,
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

// -- /api/config --------------------------------------------------------

pub async fn get_config(State(state): State<AppState>) -> ApiResponse<crate::config::ConfigSnapshot> {
    ApiResponse::ok((*state.config.load()).clone())
}

pub async fn save_config(
    State(state): State<AppState>,
    Json(patch): Json<serde_json::Value>,
) -> AppResult<ApiResponse<crate::config::ConfigSnapshot>> {
    let current = state.config.load();
    let merged = current
        .merge_validated(&patch)
        .map_err(|errs| AppError::Validation(errs.join("; ")))?;
    state
        .orchestrator
        .set_auto_trading_enabled(merged.global_allow_buy_sell);
    state.config.swap(merged.clone());
    Ok(ApiResponse::ok(merged))
}

// -- /api/status ----------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub is_monitoring: bool,
    pub auto_trading_enabled: bool,
    pub is_trade_time: bool,
    pub simulation_mode: bool,
    pub account_info: Option<AccountSnapshot>,
}

pub async fn get_status(State(state): State<AppState>) -> ApiResponse<StatusResponse> {
    ApiResponse::ok(StatusResponse {
        is_monitoring: state.orchestrator.is_monitoring(),
        auto_trading_enabled: state.orchestrator.auto_trading_enabled(),
        is_trade_time: state.orchestrator.is_trade_time_now(),
        simulation_mode: state.config.load().simulation_mode,
        account_info: state.orchestrator.last_account(),
    })
}

// -- /api/positions ---------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct VersionQuery {
    pub version: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum PositionsResponse {
    NoChange { no_change: bool },
    Full { positions: Vec<crate::models::Position> },
}

pub async fn get_positions(
    State(state): State<AppState>,
    Query(query): Query<VersionQuery>,
) -> ApiResponse<PositionsResponse> {
    let current_version = state.positions.version();
    if query.version == Some(current_version) {
        return ApiResponse::ok(PositionsResponse::NoChange { no_change: true });
    }
    ApiResponse::ok(PositionsResponse::Full {
        positions: state.positions.all(),
    })
}

// -- /api/trade-records -----------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct TradeRecordsQuery {
    pub limit: Option<i64>,
}

pub async fn get_trade_records(
    State(state): State<AppState>,
    Query(query): Query<TradeRecordsQuery>,
) -> AppResult<ApiResponse<Vec<Trade>>> {
    let limit = query.limit.unwrap_or(100);
    let trades = state.store.recent_trades(limit)?;
    Ok(ApiResponse::ok(trades))
}

// -- /api/logs ----------------------------------------------------------

pub async fn get_logs() -> ApiResponse<Vec<String>> {
    // The teacher's logging stack writes to stdout via `tracing-subscriber`;
    // there is no separate in-memory ring buffer to tail here.
    ApiResponse::ok(Vec::new())
}

pub async fn clear_logs() -> ApiResponse<()> {
    ApiResponse::ok_empty()
}

// -- /api/monitor/{start,stop} ------------------------------------------

pub async fn start_monitor(State(state): State<AppState>) -> ApiResponse<()> {
    state.orchestrator.start_monitoring();
    ApiResponse::ok_empty()
}

pub async fn stop_monitor(State(state): State<AppState>) -> ApiResponse<()> {
    state.orchestrator.stop_monitoring();
    ApiResponse::ok_empty()
}

// -- /api/actions/execute_buy ---------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ExecuteBuyRequest {
    pub strategy: String,
    pub quantity: i64,
    pub stocks: Vec<ExecuteBuyStock>,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteBuyStock {
    pub symbol: String,
    pub price: f64,
}

pub async fn execute_buy(
    State(state): State<AppState>,
    Json(req): Json<ExecuteBuyRequest>,
) -> AppResult<ApiResponse<()>> {
    if req.quantity <= 0 || req.quantity % 100 != 0 {
        return Err(AppError::Validation(
            "quantity must be a positive multiple of 100".to_string(),
        ));
    }
    for stock in &req.stocks {
        validate_symbol(&stock.symbol).map_err(AppError::Validation)?;
    }
    info!(strategy = %req.strategy, count = req.stocks.len(), "executing one-shot buy");
    for stock in req.stocks {
        state
            .orchestrator
            .execute_manual_buy(stock.symbol, req.quantity, stock.price);
    }
    Ok(ApiResponse::ok_empty())
}

// -- /api/holdings/init -----------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct HoldingInit {
    pub symbol: String,
    pub volume: i64,
    pub avg_cost: f64,
    pub current_price: Option<f64>,
}

pub async fn init_holdings(
    State(state): State<AppState>,
    Json(holdings): Json<Vec<HoldingInit>>,
) -> AppResult<ApiResponse<()>> {
    for h in &holdings {
        validate_symbol(&h.symbol).map_err(AppError::Validation)?;
    }
    for h in holdings {
        state
            .positions
            .upsert(&h.symbol, h.volume, h.avg_cost, h.current_price)?;
    }
    Ok(ApiResponse::ok_empty())
}

// -- /api/grid/* --------------------------------------------------------

pub async fn default_grid_config() -> ApiResponse<GridConfig> {
    ApiResponse::ok(GridConfig::moderate_preset())
}

#[derive(Debug, Deserialize)]
pub struct StartGridRequest {
    pub stock_code: String,
    pub center_price: f64,
    pub duration_days: i64,
    pub config: GridConfig,
}

#[derive(Debug, Serialize)]
pub struct StartGridResponse {
    pub session_id: String,
}

pub async fn start_grid(
    State(state): State<AppState>,
    Json(req): Json<StartGridRequest>,
) -> AppResult<ApiResponse<StartGridResponse>> {
    let session_id = state.grid.start_session(
        &state.positions,
        &req.stock_code,
        req.center_price,
        req.duration_days,
        req.config,
    )?;
    Ok(ApiResponse::ok(StartGridResponse { session_id }))
}

pub async fn stop_grid(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<ApiResponse<()>> {
    state.grid.stop_session(&session_id)?;
    Ok(ApiResponse::ok_empty())
}

pub async fn list_grid_sessions(State(state): State<AppState>) -> ApiResponse<Vec<GridSessionSnapshot>> {
    ApiResponse::ok(state.grid.all_snapshots())
}

#[derive(Debug, Serialize)]
pub struct GridSessionBySymbol {
    pub has_session: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<GridConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<crate::grid::GridStats>,
}

pub async fn grid_session_for_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> ApiResponse<GridSessionBySymbol> {
    match state.grid.snapshot(&symbol) {
        Some(s) => ApiResponse::ok(GridSessionBySymbol {
            has_session: true,
            session_id: Some(s.session_id),
            config: Some(s.config),
            stats: Some(s.stats),
        }),
        None => ApiResponse::ok(GridSessionBySymbol {
            has_session: false,
            session_id: None,
            config: None,
            stats: None,
        }),
    }
}

#[derive(Debug, Serialize)]
pub struct RiskPresets {
    pub aggressive: GridConfig,
    pub moderate: GridConfig,
    pub conservative: GridConfig,
}

pub async fn risk_template_presets() -> ApiResponse<RiskPresets> {
    ApiResponse::ok(RiskPresets {
        aggressive: GridConfig::aggressive_preset(),
        moderate: GridConfig::moderate_preset(),
        conservative: GridConfig::conservative_preset(),
    })
}

// -- /api/grid/template[s] CRUD -------------------------------------------

pub async fn list_templates(State(state): State<AppState>) -> AppResult<ApiResponse<Vec<RiskTemplate>>> {
    Ok(ApiResponse::ok(state.store.load_risk_templates()?))
}

pub async fn upsert_template(
    State(state): State<AppState>,
    Json(template): Json<RiskTemplate>,
) -> AppResult<ApiResponse<()>> {
    template
        .config
        .validate()
        .map_err(|errs| AppError::Validation(errs.join("; ")))?;
    state.store.upsert_risk_template(&template)?;
    Ok(ApiResponse::ok_empty())
}

pub async fn delete_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<ApiResponse<()>> {
    state.store.delete_risk_template(&name)?;
    Ok(ApiResponse::ok_empty())
}

pub async fn use_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> AppResult<ApiResponse<()>> {
    state.store.increment_template_usage(&name)?;
    Ok(ApiResponse::ok_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_buy_rejects_non_lot_quantity() {
        let req = ExecuteBuyRequest {
            strategy: "manual".into(),
            quantity: 150,
            stocks: vec![ExecuteBuyStock {
                symbol: "600519.SH".into(),
                price: 10.0,
            }],
        };
        assert!(req.quantity % 100 != 0);
    }
}
