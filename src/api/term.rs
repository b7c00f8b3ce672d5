use axum::extract::Query;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::{parse_as_of, parse_time_field, user_from_headers};
use crate::engine::{term_status, TermStatus};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TermQuery {
    pub acquired_at_ms: i64,
    pub as_of_ms: Option<i64>,
}

/// Holding-period badge for a single acquisition date.
pub async fn get_term(
    Query(params): Query<TermQuery>,
    headers: HeaderMap,
) -> Result<Json<TermStatus>, AppError> {
    user_from_headers(&headers)?;
    let acquired_at = parse_time_field("acquiredAtMs", params.acquired_at_ms)?;
    let as_of = parse_as_of(params.as_of_ms)?;
    Ok(Json(term_status(acquired_at, as_of)))
}
