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
use crate::models::{CreateMilestone, Milestone, UpdateMilestone};
use crate::startup::AppState;

pub async fn list_milestones(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Milestones)?;
    let milestones = state
        .store
        .list_milestones(owner.as_str(), project_id)
        .await?;
    Ok(Json(milestones))
}

pub async fn create_milestone(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<CreateMilestone>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Milestones)?;
    let milestone = Milestone::new(project_id, input);
    state
        .store
        .insert_milestone(owner.as_str(), &milestone)
        .await?;
    Ok((StatusCode::CREATED, Json(milestone)))
}

pub async fn update_milestone(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(milestone_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdateMilestone>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Milestones)?;
    let milestone = state
        .store
        .update_milestone(owner.as_str(), milestone_id, input)
        .await?
        .ok_or_else(|| AppError::not_found("Milestone"))?;
    Ok(Json(milestone))
}

pub async fn delete_milestone(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(milestone_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Milestones)?;
    if !state
        .store
        .delete_milestone(owner.as_str(), milestone_id)
        .await?
    {
        return Err(AppError::not_found("Milestone"));
    }
    Ok(StatusCode::NO_CONTENT)
}
