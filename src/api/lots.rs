use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;

use crate::api::{parse_as_of, parse_decimal_field, parse_time_field, user_from_headers, AppState};
use crate::domain::{Lot, LotId};
use crate::error::AppError;
use crate::service::OpenLotsView;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLotRequest {
    pub id: Option<String>,
    pub quantity: String,
    pub cost_basis_per_unit: String,
    pub acquired_at_ms: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LotsQuery {
    pub as_of_ms: Option<i64>,
}

pub async fn create_lot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateLotRequest>,
) -> Result<(StatusCode, Json<Lot>), AppError> {
    let user = user_from_headers(&headers)?;

    let id = body
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(LotId::new)
        .unwrap_or_else(LotId::generate);
    let quantity = parse_decimal_field("quantity", &body.quantity)?;
    let cost_basis_per_unit = parse_decimal_field("costBasisPerUnit", &body.cost_basis_per_unit)?;

    let lot = Lot::new(
        id,
        user,
        quantity,
        cost_basis_per_unit,
        parse_time_field("acquiredAtMs", body.acquired_at_ms)?,
    );
    let lot = state.service.add_lot(lot).await?;
    Ok((StatusCode::CREATED, Json(lot)))
}

pub async fn get_lots(
    Query(params): Query<LotsQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<OpenLotsView>, AppError> {
    let user = user_from_headers(&headers)?;
    let as_of = parse_as_of(params.as_of_ms)?;
    let view = state.service.open_lots(&user, as_of).await?;
    Ok(Json(view))
}
