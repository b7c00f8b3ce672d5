use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{parse_time_range, user_from_headers, AppState};
use crate::domain::{Decimal, RealizedGainFragment};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentsQuery {
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentsResponse {
    pub count: usize,
    pub total_gain: Decimal,
    pub fragments: Vec<RealizedGainFragment>,
}

/// Audit trail of realized gains, in disposal order.
pub async fn get_fragments(
    Query(params): Query<FragmentsQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<FragmentsResponse>, AppError> {
    let user = user_from_headers(&headers)?;
    let (from, to) = parse_time_range(params.from_ms, params.to_ms)?;

    let fragments = state.service.fragments(&user, from, to).await?;
    let total_gain = Decimal::checked_sum(fragments.iter().map(|f| f.gain))
        .ok_or_else(|| AppError::BadRequest("total gain out of range".to_string()))?;
    Ok(Json(FragmentsResponse {
        count: fragments.len(),
        total_gain,
        fragments,
    }))
}
