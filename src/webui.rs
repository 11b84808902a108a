use crate::config::{MAX_REQUEST_PORTFOLIOS, OptimizerConfig};
use crate::error::FrontierError;
use crate::{data, portfolio};
use anyhow::Result;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[derive(Clone)]
struct WebState {
    defaults: OptimizerConfig,
    /// One generator per process, seeded at start-up; requests take turns.
    rng: Arc<Mutex<StdRng>>,
}

#[derive(Clone, Debug, Serialize)]
struct ApiError {
    error: String,
}

#[derive(Debug, Deserialize)]
struct PortfolioQuery {
    tickers: Option<String>,
    period: Option<String>,
    num_portfolios: Option<usize>,
    risk_free_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct TickerQuery {
    ticker: Option<String>,
}

type ApiResult<T> = std::result::Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub async fn run_webui_server(port: u16, defaults: OptimizerConfig) -> Result<()> {
    let state = WebState {
        rng: Arc::new(Mutex::new(StdRng::seed_from_u64(defaults.seed))),
        defaults,
    };

    let app = router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!("WebUI listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: WebState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/portfolio", get(portfolio_opt))
        .route("/api/history", get(history))
        .route("/api/stock", get(stock))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

/// Comma-separated symbols, trimmed, upper-cased, sorted and de-duplicated.
fn parse_tickers(raw: &str) -> Vec<String> {
    let mut symbols: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();
    symbols.sort();
    symbols.dedup();
    symbols
}

fn request_config(
    defaults: &OptimizerConfig,
    query: &PortfolioQuery,
) -> std::result::Result<OptimizerConfig, FrontierError> {
    let mut cfg = defaults.clone();
    if let Some(period) = query.period.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        cfg.period = period.to_string();
    }
    if let Some(n) = query.num_portfolios {
        if n > MAX_REQUEST_PORTFOLIOS {
            return Err(FrontierError::InvalidConfig(format!(
                "num_portfolios must be at most {}",
                MAX_REQUEST_PORTFOLIOS
            )));
        }
        cfg.num_portfolios = n;
    }
    if let Some(rf) = query.risk_free_rate {
        cfg.risk_free_rate = rf;
    }
    cfg.validate()?;
    Ok(cfg)
}

async fn portfolio_opt(
    State(state): State<WebState>,
    Query(query): Query<PortfolioQuery>,
) -> ApiResult<portfolio::FrontierReport> {
    let symbols = parse_tickers(query.tickers.as_deref().unwrap_or_default());
    if symbols.is_empty() {
        return Err(api_err(StatusCode::BAD_REQUEST, "tickers is required"));
    }
    let cfg = request_config(&state.defaults, &query).map_err(frontier_err)?;

    let outcome = match data::fetch_price_matrix(&symbols, &cfg.period).await {
        Ok(prices) => {
            let mut rng = state.rng.lock().await;
            tokio::task::block_in_place(|| portfolio::optimize_frontier(&prices, &cfg, &mut *rng))
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(report) => Ok(Json(report)),
        Err(e) => {
            warn!("Portfolio request failed for {:?}: {}", symbols, e);
            Err(frontier_err(e))
        }
    }
}

fn required_ticker(query: &TickerQuery) -> std::result::Result<String, (StatusCode, Json<ApiError>)> {
    query
        .ticker
        .as_deref()
        .map(|t| t.trim().to_uppercase())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| api_err(StatusCode::BAD_REQUEST, "ticker is required"))
}

async fn history(Query(query): Query<TickerQuery>) -> ApiResult<data::HistorySeries> {
    let ticker = required_ticker(&query)?;
    let series = data::get_history(&ticker)
        .await
        .map_err(|e| frontier_err(data::into_frontier_error(e)))?;
    Ok(Json(series))
}

async fn stock(Query(query): Query<TickerQuery>) -> ApiResult<data::StockSnapshot> {
    let ticker = required_ticker(&query)?;
    let snapshot = data::get_stock_snapshot(&ticker)
        .await
        .map_err(|e| frontier_err(data::into_frontier_error(e)))?;
    Ok(Json(snapshot))
}

fn error_status(err: &FrontierError) -> StatusCode {
    match err {
        FrontierError::InsufficientData(_) => StatusCode::UNPROCESSABLE_ENTITY,
        FrontierError::InvalidConfig(_) => StatusCode::BAD_REQUEST,
        FrontierError::InvalidTicker(_) => StatusCode::NOT_FOUND,
        FrontierError::Provider(_) => StatusCode::BAD_GATEWAY,
        FrontierError::InvalidWeight { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn api_err(status: StatusCode, message: &str) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: message.to_string(),
        }),
    )
}

fn frontier_err(err: FrontierError) -> (StatusCode, Json<ApiError>) {
    api_err(error_status(&err), &err.to_string())
}
