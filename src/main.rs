//! Equity Supervisor
//!
//! Process bootstrap: loads configuration, opens the persistence store,
//! recovers in-flight grid sessions, wires the domain singletons, starts the
//! orchestrator's background loops, and serves the HTTP + SSE API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::{get, post, put};
use axum::{middleware as axum_mw, Router};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use equity_supervisor::api::routes;
use equity_supervisor::api::sse::sse_handler;
use equity_supervisor::config::{ConfigHandle, ConfigSnapshot};
use equity_supervisor::execution::{OrderEvent, SimulationExecutor, TradeExecutor};
use equity_supervisor::grid::GridEngine;
use equity_supervisor::market_data::{MarketDataHub, OperatingMode, PublicFeedDataSource};
use equity_supervisor::middleware::{rate_limit::rate_limit_middleware, request_logging, RateLimitConfig, RateLimitLayer};
use equity_supervisor::orchestrator::MonitorOrchestrator;
use equity_supervisor::persistence::PersistenceStore;
use equity_supervisor::position::PositionRegistry;
use equity_supervisor::state::AppState;

/// Overrides applied on top of environment-sourced configuration.
#[derive(Parser, Debug)]
#[command(name = "equity-supervisor", version, about = "Single-account equity trading supervisor")]
struct Cli {
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    #[arg(long, env = "DATABASE_PATH")]
    database_path: Option<String>,

    #[arg(long, env = "SIMULATION_MODE")]
    simulation: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = ConfigSnapshot::from_env().context("loading configuration")?;
    if let Some(port) = cli.port {
        config.http_port = port;
    }
    if let Some(db_path) = cli.database_path.clone() {
        config.database_path = db_path;
    }
    if cli.simulation {
        config.simulation_mode = true;
    }

    let store = Arc::new(PersistenceStore::new(&config.database_path).context("opening database")?);
    let positions = Arc::new(PositionRegistry::new(store.clone()));
    let grid = Arc::new(GridEngine::new(store.clone()));
    let recovered = grid.recover().context("recovering active grid sessions")?;
    info!(recovered, "grid sessions recovered from persistence");

    let (order_tx, order_rx) = mpsc::unbounded_channel::<OrderEvent>();
    let executor: Arc<dyn TradeExecutor> = Arc::new(SimulationExecutor::new(order_tx));

    let mode = if config.simulation_mode {
        OperatingMode::Simulation
    } else {
        OperatingMode::Live
    };
    let broker_source = Arc::new(equity_supervisor::market_data::BrokerDataSource::new(executor.clone()))
        as Arc<dyn equity_supervisor::market_data::DataSource>;
    let public_feed = Arc::new(PublicFeedDataSource::new(format!(
        "http://{}:{}",
        config.total_accounts, config.connect_port
    ))) as Arc<dyn equity_supervisor::market_data::DataSource>;
    let hub = Arc::new(MarketDataHub::new(vec![broker_source, public_feed], mode));

    let config_handle = ConfigHandle::new(config.clone());

    let orchestrator = Arc::new(MonitorOrchestrator::new(
        hub,
        positions.clone(),
        grid.clone(),
        executor,
        store.clone(),
        config_handle.clone(),
    ));
    let background_tasks = orchestrator.spawn(order_rx);

    let state = AppState {
        positions,
        grid,
        orchestrator,
        config: config_handle,
        store,
        rate_limiter: RateLimitLayer::new(RateLimitConfig::default()),
    };

    let command_routes = Router::new()
        .route("/actions/execute_buy", post(routes::execute_buy))
        .route("/holdings/init", post(routes::init_holdings))
        .route("/grid/start", post(routes::start_grid))
        .route("/grid/stop/:session_id", post(routes::stop_grid))
        .route_layer(axum_mw::from_fn_with_state(state.clone(), rate_limit_middleware));

    let api_routes = Router::new()
        .route("/config", get(routes::get_config).post(routes::save_config))
        .route("/status", get(routes::get_status))
        .route("/positions", get(routes::get_positions))
        .route("/trade-records", get(routes::get_trade_records))
        .route("/logs", get(routes::get_logs))
        .route("/logs/clear", post(routes::clear_logs))
        .route("/monitor/start", post(routes::start_monitor))
        .route("/monitor/stop", post(routes::stop_monitor))
        .route("/grid/config", get(routes::default_grid_config))
        .route("/grid/sessions", get(routes::list_grid_sessions))
        .route("/grid/session/:symbol", get(routes::grid_session_for_symbol))
        .route("/grid/risk-templates", get(routes::risk_template_presets))
        .route("/grid/templates", get(routes::list_templates).post(routes::upsert_template))
        .route(
            "/grid/template/:name",
            put(routes::upsert_template)
                .delete(routes::delete_template)
                .post(routes::use_template),
        )
        .route("/sse", get(sse_handler))
        .merge(command_routes);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(axum_mw::from_fn(request_logging))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let listener = TcpListener::bind(addr).await.context("binding HTTP listener")?;
    info!(%addr, "equity supervisor listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("serving HTTP")?;

    for handle in background_tasks {
        handle.abort();
    }
    Ok(())
}
