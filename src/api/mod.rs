pub mod disposals;
pub mod fragments;
pub mod health;
pub mod import;
pub mod liability;
pub mod lots;
pub mod term;

use crate::config::Config;
use crate::domain::{Decimal, TaxMethod, TimeMs, UserId};
use crate::error::AppError;
use crate::service::LedgerService;
use axum::http::HeaderMap;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

/// Header carrying the already-authenticated caller.
pub const USER_HEADER: &str = "x-user-id";

#[derive(Clone)]
pub struct AppState {
    pub service: LedgerService,
    pub config: Config,
}

impl AppState {
    pub fn new(service: LedgerService, config: Config) -> Self {
        Self { service, config }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/lots", get(lots::get_lots).post(lots::create_lot))
        .route(
            "/v1/disposals",
            get(disposals::get_disposals).post(disposals::create_disposal),
        )
        .route("/v1/disposals/preview", post(disposals::preview_disposal))
        .route("/v1/fragments", get(fragments::get_fragments))
        .route("/v1/liability", get(liability::get_liability))
        .route("/v1/term", get(term::get_term))
        .route("/v1/import", post(import::import_csv))
        .layer(cors)
        .with_state(state)
}

pub(crate) fn user_from_headers(headers: &HeaderMap) -> Result<UserId, AppError> {
    let raw = headers
        .get(USER_HEADER)
        .ok_or_else(|| AppError::BadRequest(format!("Missing {} header", USER_HEADER)))?
        .to_str()
        .map_err(|_| AppError::BadRequest(format!("Invalid {} header", USER_HEADER)))?
        .trim();
    if raw.is_empty() {
        return Err(AppError::BadRequest(format!("Empty {} header", USER_HEADER)));
    }
    Ok(UserId::new(raw))
}

pub(crate) fn parse_decimal_field(name: &str, raw: &str) -> Result<Decimal, AppError> {
    Decimal::from_str_canonical(raw).map_err(|_| AppError::BadRequest(format!("Invalid {}", name)))
}

pub(crate) fn parse_method(raw: Option<&str>, default: TaxMethod) -> Result<TaxMethod, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s
            .parse::<TaxMethod>()
            .map_err(|e| AppError::BadRequest(e.to_string())),
        None => Ok(default),
    }
}

/// Epoch milliseconds that map to a calendar instant.
pub(crate) fn parse_time_field(name: &str, ms: i64) -> Result<TimeMs, AppError> {
    let time = TimeMs::new(ms);
    if time.to_datetime().is_none() {
        return Err(AppError::BadRequest(format!("{} out of range: {}", name, ms)));
    }
    Ok(time)
}

pub(crate) fn parse_as_of(as_of_ms: Option<i64>) -> Result<TimeMs, AppError> {
    match as_of_ms {
        Some(ms) => parse_time_field("asOfMs", ms),
        None => Ok(TimeMs::now()),
    }
}

pub(crate) fn parse_time_range(
    from_ms: Option<i64>,
    to_ms: Option<i64>,
) -> Result<(Option<TimeMs>, Option<TimeMs>), AppError> {
    let from = from_ms
        .map(|ms| parse_time_field("fromMs", ms))
        .transpose()?;
    let to = to_ms.map(|ms| parse_time_field("toMs", ms)).transpose()?;
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::BadRequest("fromMs must be <= toMs".to_string()));
        }
    }
    Ok((from, to))
}
