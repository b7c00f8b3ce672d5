use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::api::{parse_method, user_from_headers, AppState};
use crate::error::AppError;
use crate::service::ImportSummary;

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    pub method: Option<String>,
}

/// Replay a CSV export (`kind,timestamp,quantity,price[,id]`) into the ledger.
pub async fn import_csv(
    Query(params): Query<ImportQuery>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ImportSummary>, AppError> {
    let user = user_from_headers(&headers)?;
    let method = parse_method(params.method.as_deref(), state.config.default_tax_method)?;
    let summary = state.service.import_csv(&user, &body, method).await?;
    Ok(Json(summary))
}
