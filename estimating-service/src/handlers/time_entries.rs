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
use crate::models::{CreateTimeEntry, TimeEntry, UpdateTimeEntry};
use crate::startup::AppState;

pub async fn list_time_entries(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::TimeTracking)?;
    let entries = state
        .store
        .list_time_entries(owner.as_str(), project_id)
        .await?;
    Ok(Json(entries))
}

pub async fn create_time_entry(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<CreateTimeEntry>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::TimeTracking)?;
    let entry = TimeEntry::new(project_id, input);
    state.store.insert_time_entry(owner.as_str(), &entry).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn update_time_entry(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(time_entry_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdateTimeEntry>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::TimeTracking)?;
    let entry = state
        .store
        .update_time_entry(owner.as_str(), time_entry_id, input)
        .await?
        .ok_or_else(|| AppError::not_found("Time entry"))?;
    Ok(Json(entry))
}

pub async fn delete_time_entry(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(time_entry_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::TimeTracking)?;
    if !state
        .store
        .delete_time_entry(owner.as_str(), time_entry_id)
        .await?
    {
        return Err(AppError::not_found("Time entry"));
    }
    Ok(StatusCode::NO_CONTENT)
}
