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
use crate::models::{Chapter, CreateChapter, UpdateChapter};
use crate::startup::AppState;

pub async fn create_chapter(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(estimate_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<CreateChapter>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let tree = state
        .store
        .get_estimate_tree(owner.as_str(), estimate_id)
        .await?
        .ok_or_else(|| AppError::not_found("Estimate"))?;

    let next_sort_order = tree
        .chapters
        .iter()
        .map(|c| c.sort_order)
        .max()
        .map_or(0, |max| max + 1);

    let chapter = Chapter::new(estimate_id, input, next_sort_order);
    state.store.insert_chapter(owner.as_str(), &chapter).await?;
    Ok((StatusCode::CREATED, Json(chapter)))
}

pub async fn update_chapter(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(chapter_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdateChapter>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let chapter = state
        .store
        .update_chapter(owner.as_str(), chapter_id, input)
        .await?
        .ok_or_else(|| AppError::not_found("Chapter"))?;
    Ok(Json(chapter))
}

/// Deletes the chapter together with its lines; returns the rolled-up estimate.
pub async fn delete_chapter(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(chapter_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Estimates)?;
    let estimate = state
        .store
        .delete_chapter(owner.as_str(), chapter_id)
        .await?
        .ok_or_else(|| AppError::not_found("Chapter"))?;
    Ok(Json(estimate))
}
