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
use crate::models::{CreateProject, Project, UpdateProject};
use crate::startup::AppState;

pub async fn list_projects(
    State(state): State<AppState>,
    owner: OwnerId,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let projects = state.store.list_projects(owner.as_str()).await?;
    Ok(Json(projects))
}

pub async fn create_project(
    State(state): State<AppState>,
    owner: OwnerId,
    ValidatedJson(input): ValidatedJson<CreateProject>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let project = Project::new(owner.as_str(), input);
    state.store.insert_project(&project).await?;

    tracing::info!(project_id = %project.project_id, "Project created");
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn get_project(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let project = state
        .store
        .get_project(owner.as_str(), project_id)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;
    Ok(Json(project))
}

pub async fn update_project(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdateProject>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let project = state
        .store
        .update_project(owner.as_str(), project_id, input)
        .await?
        .ok_or_else(|| AppError::not_found("Project"))?;
    Ok(Json(project))
}

/// Removes the project with its estimates, invoices and other children.
pub async fn delete_project(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    if !state.store.delete_project(owner.as_str(), project_id).await? {
        return Err(AppError::not_found("Project"));
    }
    tracing::info!(project_id = %project_id, "Project deleted");
    Ok(StatusCode::NO_CONTENT)
}
