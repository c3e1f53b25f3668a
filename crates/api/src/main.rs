use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use std::collections::BTreeMap;
use vriddhi_core::config::{PlanDefaults, Settings};
use vriddhi_core::domain::plan::{InvestmentPlan, PlanRequest, Portfolio};
use vriddhi_core::domain::selection::SelectionResult;
use vriddhi_core::domain::stock::{Horizon, InvestmentStyle, RiskTier, Stock};
use vriddhi_core::engine::allocator::ShareAllocation;
use vriddhi_core::engine::projection::{project, Projection};
use vriddhi_core::engine::selector::{select, SelectionParams};
use vriddhi_core::error::{PlanError, PlanStage};
use vriddhi_core::universe::query::{self, StockFilter, StockPage};
use vriddhi_core::universe::source::{refresh, FileUniverseSource, UniverseSource};
use vriddhi_core::universe::summary::{market_summary, MarketSummary, SectorSummary};
use vriddhi_core::universe::UniverseStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let store = UniverseStore::default();
    match settings.require_universe_path() {
        Ok(path) => {
            let source: Arc<dyn UniverseSource> = Arc::new(FileUniverseSource::new(path));
            if let Err(e) = refresh(&store, source.as_ref()).await {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "initial universe load failed; starting API in degraded mode");
            }
            spawn_refresh(store.clone(), source, settings.universe_refresh);
        }
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "universe path missing; starting API in degraded mode");
        }
    }

    let state = AppState {
        store,
        defaults: PlanDefaults::from_env(),
    };

    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/universe", get(get_universe))
        .route("/v1/sectors", get(list_sectors))
        .route("/v1/stocks", get(list_stocks))
        .route("/v1/stocks/search", get(search_stocks))
        .route("/v1/stocks/top-performers", get(top_performers))
        .route("/v1/stocks/by-style/:style", get(stocks_by_style))
        .route("/v1/stocks/by-risk/:risk", get(stocks_by_risk))
        .route("/v1/stocks/:ticker", get(get_stock))
        .route("/v1/stocks/:ticker/forecast", get(get_forecast))
        .route("/v1/plans", post(create_plan))
        .route(
            "/v1/quick-analysis/:monthly_investment/:horizon_months",
            get(quick_analysis),
        )
        .route("/v1/selection", post(select_stocks))
        .route("/v1/portfolio/optimize", post(optimize_portfolio))
        .route("/v1/portfolio/whole-shares", post(whole_shares))
        .route(
            "/v1/projection/:monthly_investment/:horizon_months",
            get(sip_projection),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn spawn_refresh(
    store: UniverseStore,
    source: Arc<dyn UniverseSource>,
    every: std::time::Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick fires immediately; startup already loaded.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = refresh(&store, source.as_ref()).await {
                sentry_anyhow::capture_anyhow(&e);
                tracing::warn!(error = %e, "universe refresh failed; keeping current snapshot");
            }
        }
    });
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Clone)]
struct AppState {
    store: UniverseStore,
    defaults: PlanDefaults,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error_code: &'static str,
    message: String,
    stage: Option<PlanStage>,
    status_code: u16,
}

impl ApiError {
    fn not_found(message: String) -> Self {
        Self {
            error_code: "NOT_FOUND",
            message,
            stage: None,
            status_code: StatusCode::NOT_FOUND.as_u16(),
        }
    }
}

impl From<PlanError> for ApiError {
    fn from(e: PlanError) -> Self {
        let status = match (&e, e.stage()) {
            (PlanError::UnknownTicker { .. }, _) => StatusCode::NOT_FOUND,
            (_, PlanStage::Validation) => StatusCode::BAD_REQUEST,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self {
            error_code: e.code(),
            message: e.to_string(),
            stage: Some(e.stage()),
            status_code: status.as_u16(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

async fn get_universe(State(state): State<AppState>) -> Json<MarketSummary> {
    Json(market_summary(&state.store.snapshot()))
}

async fn get_stock(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<Stock>, ApiError> {
    let ticker = ticker.trim().to_ascii_uppercase();
    let snapshot = state.store.snapshot();
    snapshot
        .get(&ticker)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("unknown ticker {ticker}")))
}

#[derive(Debug, Serialize)]
struct StockForecast {
    ticker: String,
    as_of_date: Option<chrono::NaiveDate>,
    forecasts: BTreeMap<Horizon, f64>,
}

async fn get_forecast(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
) -> Result<Json<StockForecast>, ApiError> {
    let ticker = ticker.trim().to_ascii_uppercase();
    let snapshot = state.store.snapshot();
    let stock = snapshot
        .get(&ticker)
        .ok_or_else(|| ApiError::not_found(format!("unknown ticker {ticker}")))?;
    Ok(Json(StockForecast {
        ticker: stock.ticker.clone(),
        as_of_date: snapshot.as_of_date(),
        forecasts: stock.forecasts.clone(),
    }))
}

async fn list_sectors(State(state): State<AppState>) -> Json<Vec<SectorSummary>> {
    Json(market_summary(&state.store.snapshot()).sector_summaries)
}

/// Listing filters. List-valued fields are comma separated; CAGR bounds are fractions.
#[derive(Debug, Default, Deserialize)]
struct StockQuery {
    sectors: Option<String>,
    styles: Option<String>,
    risk: Option<String>,
    min_cagr: Option<f64>,
    max_cagr: Option<f64>,
    min_pe: Option<f64>,
    max_pe: Option<f64>,
    min_pb: Option<f64>,
    max_pb: Option<f64>,
    offset: Option<usize>,
    limit: Option<usize>,
}

fn split_list(raw: Option<&str>) -> impl Iterator<Item = &str> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn parse_style(raw: &str) -> Result<InvestmentStyle, PlanError> {
    InvestmentStyle::parse(raw)
        .ok_or_else(|| PlanError::validation("style", format!("unknown investment style {raw}")))
}

fn parse_risk(raw: &str) -> Result<RiskTier, PlanError> {
    RiskTier::parse(raw)
        .ok_or_else(|| PlanError::validation("risk", format!("unknown risk level {raw}")))
}

impl StockQuery {
    fn into_filter(self) -> Result<StockFilter, PlanError> {
        let defaults = StockFilter::default();
        Ok(StockFilter {
            sectors: split_list(self.sectors.as_deref()).map(str::to_string).collect(),
            styles: split_list(self.styles.as_deref())
                .map(parse_style)
                .collect::<Result<Vec<_>, _>>()?,
            risk_tiers: split_list(self.risk.as_deref())
                .map(parse_risk)
                .collect::<Result<Vec<_>, _>>()?,
            min_cagr: self.min_cagr,
            max_cagr: self.max_cagr,
            min_pe: self.min_pe,
            max_pe: self.max_pe,
            min_pb: self.min_pb,
            max_pb: self.max_pb,
            offset: self.offset.unwrap_or(defaults.offset),
            limit: self.limit.unwrap_or(defaults.limit),
        })
    }
}

async fn list_stocks(
    State(state): State<AppState>,
    Query(q): Query<StockQuery>,
) -> Result<Json<StockPage>, ApiError> {
    let filter = q.into_filter()?;
    Ok(Json(query::list_stocks(&state.store.snapshot(), &filter)))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

async fn search_stocks(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<Json<Vec<Stock>>, ApiError> {
    if q.q.trim().len() < query::MIN_SEARCH_LEN {
        return Err(PlanError::validation(
            "q",
            format!("search term needs at least {} characters", query::MIN_SEARCH_LEN),
        )
        .into());
    }
    let limit = q.limit.unwrap_or(20).clamp(1, 100);
    Ok(Json(query::search_stocks(&state.store.snapshot(), &q.q, limit)))
}

#[derive(Debug, Default, Deserialize)]
struct TopQuery {
    limit: Option<usize>,
    sector: Option<String>,
}

async fn top_performers(
    State(state): State<AppState>,
    Query(q): Query<TopQuery>,
) -> Json<Vec<Stock>> {
    let limit = q.limit.unwrap_or(10).clamp(1, 50);
    Json(query::top_performers(
        &state.store.snapshot(),
        limit,
        q.sector.as_deref(),
    ))
}

#[derive(Debug, Default, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(query::DEFAULT_PAGE).clamp(1, 100)
    }
}

async fn stocks_by_style(
    State(state): State<AppState>,
    Path(style): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<Stock>>, ApiError> {
    let filter = StockFilter {
        styles: vec![parse_style(&style)?],
        limit: q.limit(),
        ..StockFilter::default()
    };
    Ok(Json(query::list_stocks(&state.store.snapshot(), &filter).stocks))
}

async fn stocks_by_risk(
    State(state): State<AppState>,
    Path(risk): Path<String>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Vec<Stock>>, ApiError> {
    let filter = StockFilter {
        risk_tiers: vec![parse_risk(&risk)?],
        limit: q.limit(),
        ..StockFilter::default()
    };
    Ok(Json(query::list_stocks(&state.store.snapshot(), &filter).stocks))
}

/// Request body for `POST /v1/plans`. Unset knobs take the configured defaults.
#[derive(Debug, Clone, Deserialize)]
struct PlanBody {
    monthly_investment: f64,
    horizon_months: u32,
    expected_cagr: Option<f64>,
    ratio_threshold: Option<f64>,
    min_stocks: Option<usize>,
    max_stocks: Option<usize>,
    max_weight: Option<f64>,
    risk_aversion: Option<f64>,
    inflation_rate: Option<f64>,
}

impl PlanBody {
    fn into_request(self, defaults: &PlanDefaults) -> Result<PlanRequest, PlanError> {
        let mut req =
            PlanRequest::with_defaults(self.monthly_investment, self.horizon_months, defaults)?;
        if let Some(v) = self.expected_cagr {
            req.expected_cagr = v;
        }
        if let Some(v) = self.ratio_threshold {
            req.ratio_threshold = v;
        }
        if let Some(v) = self.min_stocks {
            req.min_stocks = v;
        }
        if let Some(v) = self.max_stocks {
            req.max_stocks = v;
        }
        if let Some(v) = self.max_weight {
            req.max_weight = Some(v);
        }
        if let Some(v) = self.risk_aversion {
            req.risk_aversion = v;
        }
        if let Some(v) = self.inflation_rate {
            req.inflation_rate = v;
        }
        Ok(req)
    }
}

#[derive(Debug, Serialize)]
struct ApiPlan {
    plan_id: Uuid,
    generated_at: DateTime<Utc>,
    plan: InvestmentPlan,
}

async fn create_plan(
    State(state): State<AppState>,
    Json(body): Json<PlanBody>,
) -> Result<Json<ApiPlan>, ApiError> {
    let request = body.into_request(&state.defaults)?;
    plan_response(&state, &request)
}

/// Full plan with every knob at its configured default.
async fn quick_analysis(
    State(state): State<AppState>,
    Path((monthly_investment, horizon_months)): Path<(f64, u32)>,
) -> Result<Json<ApiPlan>, ApiError> {
    let request = PlanRequest::with_defaults(monthly_investment, horizon_months, &state.defaults)?;
    plan_response(&state, &request)
}

fn plan_response(state: &AppState, request: &PlanRequest) -> Result<Json<ApiPlan>, ApiError> {
    let snapshot = state.store.snapshot();

    let plan = vriddhi_core::engine::build_plan(&snapshot, request).map_err(|e| {
        tracing::warn!(code = e.code(), stage = %e.stage(), error = %e, "plan rejected");
        ApiError::from(e)
    })?;

    Ok(Json(ApiPlan {
        plan_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        plan,
    }))
}

async fn select_stocks(
    State(state): State<AppState>,
    Json(body): Json<PlanBody>,
) -> Result<Json<SelectionResult>, ApiError> {
    let request = body.into_request(&state.defaults)?;
    request.validate()?;
    let selection = select(&state.store.snapshot(), &SelectionParams::from(&request))?;
    Ok(Json(selection))
}

/// Request body for the portfolio routes: explicit tickers instead of a selection pass.
#[derive(Debug, Clone, Deserialize)]
struct PortfolioBody {
    tickers: Vec<String>,
    monthly_investment: f64,
    horizon_months: u32,
    expected_cagr: Option<f64>,
    max_weight: Option<f64>,
    risk_aversion: Option<f64>,
}

impl PortfolioBody {
    fn into_parts(self, defaults: &PlanDefaults) -> Result<(Vec<String>, PlanRequest), PlanError> {
        let mut req =
            PlanRequest::with_defaults(self.monthly_investment, self.horizon_months, defaults)?;
        if let Some(v) = self.expected_cagr {
            req.expected_cagr = v;
        }
        if let Some(v) = self.max_weight {
            req.max_weight = Some(v);
        }
        if let Some(v) = self.risk_aversion {
            req.risk_aversion = v;
        }
        Ok((self.tickers, req))
    }
}

fn portfolio_for(state: &AppState, body: PortfolioBody) -> Result<Portfolio, ApiError> {
    let (tickers, request) = body.into_parts(&state.defaults)?;
    vriddhi_core::engine::build_portfolio(&state.store.snapshot(), &tickers, &request).map_err(
        |e| {
            tracing::warn!(code = e.code(), error = %e, "portfolio rejected");
            ApiError::from(e)
        },
    )
}

async fn optimize_portfolio(
    State(state): State<AppState>,
    Json(body): Json<PortfolioBody>,
) -> Result<Json<Portfolio>, ApiError> {
    portfolio_for(&state, body).map(Json)
}

#[derive(Debug, Serialize)]
struct WholeShares {
    whole_shares: ShareAllocation,
    original_monthly_investment: f64,
    required_monthly_investment: f64,
    /// `required − original`; never positive since spend stays within budget.
    investment_difference: f64,
}

async fn whole_shares(
    State(state): State<AppState>,
    Json(body): Json<PortfolioBody>,
) -> Result<Json<WholeShares>, ApiError> {
    let portfolio = portfolio_for(&state, body)?;
    let original = portfolio.monthly_investment;
    let required = portfolio.whole_shares.total_spent;
    Ok(Json(WholeShares {
        whole_shares: portfolio.whole_shares,
        original_monthly_investment: original,
        required_monthly_investment: required,
        investment_difference: required - original,
    }))
}

#[derive(Debug, Default, Deserialize)]
struct ProjectionQuery {
    expected_cagr: Option<f64>,
}

/// SIP projection at a stated CAGR, without selection.
async fn sip_projection(
    State(state): State<AppState>,
    Path((monthly_investment, horizon_months)): Path<(f64, u32)>,
    Query(q): Query<ProjectionQuery>,
) -> Result<Json<Projection>, ApiError> {
    let mut request = PlanRequest::with_defaults(monthly_investment, horizon_months, &state.defaults)?;
    if let Some(v) = q.expected_cagr {
        request.expected_cagr = v;
    }
    request.validate()?;
    Ok(Json(project(
        request.monthly_investment,
        request.horizon.months(),
        request.expected_cagr,
    )))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
