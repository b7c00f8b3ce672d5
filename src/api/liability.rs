use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{parse_time_range, user_from_headers, AppState};
use crate::domain::{Decimal, TimeMs};
use crate::engine::{BucketLiability, EstimateOptions, TaxLiability, TaxRate, TaxRates};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiabilityQuery {
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub short_term_rate: Option<String>,
    pub long_term_rate: Option<String>,
    pub include_loss_offset: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiabilityResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_ms: Option<TimeMs>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_ms: Option<TimeMs>,
    pub include_loss_offset: bool,
    pub short_term: BucketLiability,
    pub long_term: BucketLiability,
    pub total: Decimal,
}

fn rate_or(raw: Option<&str>, default: TaxRate) -> Result<TaxRate, AppError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Ok(s.parse::<TaxRate>()?),
        None => Ok(default),
    }
}

pub async fn get_liability(
    Query(params): Query<LiabilityQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<LiabilityResponse>, AppError> {
    let user = user_from_headers(&headers)?;
    let (from, to) = parse_time_range(params.from_ms, params.to_ms)?;

    let defaults = state.config.default_rates;
    let rates = TaxRates::new(
        rate_or(params.short_term_rate.as_deref(), defaults.short_term)?,
        rate_or(params.long_term_rate.as_deref(), defaults.long_term)?,
    );
    let options = EstimateOptions {
        include_loss_offset: params
            .include_loss_offset
            .unwrap_or(state.config.include_loss_offset),
    };

    let liability: TaxLiability = state
        .service
        .estimate_liability(&user, from, to, &rates, options)
        .await?;

    Ok(Json(LiabilityResponse {
        from_ms: from,
        to_ms: to,
        include_loss_offset: options.include_loss_offset,
        short_term: liability.short_term,
        long_term: liability.long_term,
        total: liability.total(),
    }))
}
