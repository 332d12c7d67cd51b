use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::validation::ValidatedJson;
use uuid::Uuid;
use validator::Validate;

use crate::config::Feature;
use crate::middleware::OwnerId;
use crate::models::{CreateLineItem, Estimate, LineItem, UpdateLineItem};
use crate::services::pricing;
use crate::startup::AppState;

/// A line mutation result: the line plus the estimate after rollup.
#[derive(Debug, Serialize)]
pub struct LineResponse {
    pub line: LineItem,
    pub estimate: Estimate,
}

#[derive(Debug, Serialize)]
pub struct BulkLinesResponse {
    pub lines: Vec<LineItem>,
    pub estimate: Estimate,
}

#[derive(Debug, Deserialize, Validate)]
pub struct BulkLines {
    #[validate(length(min = 1, max = 1000, message = "must contain 1-1000 lines"), nested)]
    pub lines: Vec<CreateLineItem>,
}

pub async fn create_line(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(estimate_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<CreateLineItem>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let (mut lines, estimate) =
        pricing::add_lines(state.store.as_ref(), owner.as_str(), estimate_id, vec![input]).await?;
    let line = lines
        .pop()
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Line insert returned nothing")))?;
    Ok((StatusCode::CREATED, Json(LineResponse { line, estimate })))
}

pub async fn create_lines_bulk(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(estimate_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<BulkLines>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let (lines, estimate) =
        pricing::add_lines(state.store.as_ref(), owner.as_str(), estimate_id, input.lines).await?;

    tracing::info!(estimate_id = %estimate_id, count = lines.len(), "Lines imported");
    Ok((
        StatusCode::CREATED,
        Json(BulkLinesResponse { lines, estimate }),
    ))
}

pub async fn update_line(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(line_item_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdateLineItem>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let (line, estimate) = state
        .store
        .update_line(owner.as_str(), line_item_id, &input)
        .await?;
    Ok(Json(LineResponse { line, estimate }))
}

/// Returns the estimate after rollup.
pub async fn delete_line(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(line_item_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let estimate = state
        .store
        .delete_line(owner.as_str(), line_item_id)
        .await?;
    Ok(Json(estimate))
}

pub async fn sync_line_price(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(line_item_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::CostLibrary)?;
    let result =
        pricing::sync_line_price(state.store.as_ref(), owner.as_str(), line_item_id).await?;
    Ok(Json(result))
}

pub async fn sync_estimate_prices(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(estimate_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::CostLibrary)?;
    let report =
        pricing::sync_estimate_prices(state.store.as_ref(), owner.as_str(), estimate_id).await?;
    Ok(Json(report))
}
