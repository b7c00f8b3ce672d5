use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::{
    parse_decimal_field, parse_method, parse_time_field, user_from_headers, AppState,
};
use crate::domain::{Decimal, Disposal, DisposalId, RealizedGainFragment, TaxMethod, Term, UserId};
use crate::engine::MatchPlan;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisposalBody {
    pub id: Option<String>,
    pub quantity: String,
    pub proceeds_per_unit: String,
    pub disposed_at_ms: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisposeRequest {
    pub method: Option<String>,
    pub disposal: DisposalBody,
}

/// Fragments of one method with their per-term totals.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub disposal_id: DisposalId,
    pub method: TaxMethod,
    pub quantity_matched: Decimal,
    pub total_gain: Decimal,
    pub short_term_gain: Decimal,
    pub long_term_gain: Decimal,
    pub fragments: Vec<RealizedGainFragment>,
}

impl MatchResult {
    fn from_plan(disposal_id: DisposalId, plan: MatchPlan) -> Self {
        MatchResult {
            disposal_id,
            method: plan.method,
            quantity_matched: plan.quantity_matched(),
            total_gain: plan.total_gain(),
            short_term_gain: plan.gain_for_term(Term::Short),
            long_term_gain: plan.gain_for_term(Term::Long),
            fragments: plan.fragments,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub plans: Vec<MatchResult>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisposalsResponse {
    pub disposals: Vec<Disposal>,
}

fn build_disposal(user: UserId, body: &DisposalBody) -> Result<Disposal, AppError> {
    let id = body
        .id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(DisposalId::new)
        .unwrap_or_else(DisposalId::generate);
    Ok(Disposal::new(
        id,
        user,
        parse_decimal_field("quantity", &body.quantity)?,
        parse_decimal_field("proceedsPerUnit", &body.proceeds_per_unit)?,
        parse_time_field("disposedAtMs", body.disposed_at_ms)?,
    ))
}

pub async fn create_disposal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DisposeRequest>,
) -> Result<(StatusCode, Json<MatchResult>), AppError> {
    let user = user_from_headers(&headers)?;
    let method = parse_method(body.method.as_deref(), state.config.default_tax_method)?;
    let disposal = build_disposal(user, &body.disposal)?;
    let disposal_id = disposal.id.clone();

    let fragments = state.service.dispose(disposal, method).await?;
    let plan = MatchPlan { method, fragments };
    Ok((
        StatusCode::CREATED,
        Json(MatchResult::from_plan(disposal_id, plan)),
    ))
}

/// Nothing is committed. Without a method every method is planned.
pub async fn preview_disposal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DisposeRequest>,
) -> Result<Json<PreviewResponse>, AppError> {
    let user = user_from_headers(&headers)?;
    let method = match body.method.as_deref() {
        Some(raw) if !raw.trim().is_empty() => {
            Some(parse_method(Some(raw), state.config.default_tax_method)?)
        }
        _ => None,
    };
    let disposal = build_disposal(user, &body.disposal)?;

    let plans = state.service.preview(&disposal, method).await?;
    Ok(Json(PreviewResponse {
        plans: plans
            .into_iter()
            .map(|plan| MatchResult::from_plan(disposal.id.clone(), plan))
            .collect(),
    }))
}

pub async fn get_disposals(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DisposalsResponse>, AppError> {
    let user = user_from_headers(&headers)?;
    let disposals = state.service.disposals(&user).await?;
    Ok(Json(DisposalsResponse { disposals }))
}
