use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;
use service_core::validation::ValidatedJson;
use uuid::Uuid;

use crate::config::Feature;
use crate::middleware::OwnerId;
use crate::models::{CreateEstimate, Estimate, EstimateTree, UpdateEstimate};
use crate::services::duplication::{self, DuplicateEstimate};
use crate::services::invoicing;
use crate::startup::AppState;

pub async fn list_estimates(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let estimates = state
        .store
        .list_estimates(owner.as_str(), project_id)
        .await?;
    Ok(Json(estimates))
}

pub async fn create_estimate(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<CreateEstimate>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let estimate = Estimate::new(project_id, input);
    state.store.insert_estimate(owner.as_str(), &estimate).await?;

    tracing::info!(
        estimate_id = %estimate.estimate_id,
        project_id = %project_id,
        "Estimate created"
    );
    Ok((StatusCode::CREATED, Json(estimate)))
}

/// Estimate with chapters and lines.
pub async fn get_estimate(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(estimate_id): Path<Uuid>,
) -> Result<Json<EstimateTree>, AppError> {
    state.features.require(Feature::Estimates)?;
    let tree = state
        .store
        .get_estimate_tree(owner.as_str(), estimate_id)
        .await?
        .ok_or_else(|| AppError::not_found("Estimate"))?;
    Ok(Json(tree))
}

pub async fn update_estimate(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(estimate_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdateEstimate>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let estimate = state
        .store
        .update_estimate(owner.as_str(), estimate_id, &input)
        .await?;
    Ok(Json(estimate))
}

pub async fn delete_estimate(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(estimate_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    if !state.store.delete_estimate(owner.as_str(), estimate_id).await? {
        return Err(AppError::not_found("Estimate"));
    }
    tracing::info!(estimate_id = %estimate_id, "Estimate deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn recalculate_estimate(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(estimate_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let estimate = state
        .store
        .recalculate_estimate(owner.as_str(), estimate_id)
        .await?;
    Ok(Json(estimate))
}

pub async fn duplicate_estimate(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(estimate_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<DuplicateEstimate>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let copy =
        duplication::duplicate(state.store.as_ref(), owner.as_str(), estimate_id, input).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

pub async fn new_version(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(estimate_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let copy = duplication::new_version(state.store.as_ref(), owner.as_str(), estimate_id).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

pub async fn invoice_estimate(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(estimate_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Invoices)?;
    let invoice =
        invoicing::invoice_from_estimate(state.store.as_ref(), owner.as_str(), estimate_id)
            .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}
