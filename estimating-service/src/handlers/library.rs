use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use service_core::validation::ValidatedJson;
use uuid::Uuid;

use crate::config::Feature;
use crate::middleware::OwnerId;
use crate::models::{
    CostLibrary, CreateLibrary, CreateLibraryItem, LibraryItem, UpdateLibraryItem,
};
use crate::startup::AppState;

#[derive(Debug, Deserialize)]
pub struct ItemSearchParams {
    /// Case-insensitive match on code or description.
    pub q: Option<String>,
}

pub async fn list_libraries(
    State(state): State<AppState>,
    owner: OwnerId,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::CostLibrary)?;
    let libraries = state.store.list_libraries(owner.as_str()).await?;
    Ok(Json(libraries))
}

pub async fn create_library(
    State(state): State<AppState>,
    owner: OwnerId,
    ValidatedJson(input): ValidatedJson<CreateLibrary>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::CostLibrary)?;
    let library = CostLibrary::new(owner.as_str(), input);
    state.store.insert_library(&library).await?;

    tracing::info!(library_id = %library.library_id, "Cost library created");
    Ok((StatusCode::CREATED, Json(library)))
}

pub async fn get_library(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(library_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::CostLibrary)?;
    let library = state
        .store
        .get_library(owner.as_str(), library_id)
        .await?
        .ok_or_else(|| AppError::not_found("Cost library"))?;
    Ok(Json(library))
}

/// Deletes the library and its items; linked lines keep their costs but
/// lose the library link.
pub async fn delete_library(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(library_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::CostLibrary)?;
    if !state.store.delete_library(owner.as_str(), library_id).await? {
        return Err(AppError::not_found("Cost library"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_items(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(library_id): Path<Uuid>,
    Query(params): Query<ItemSearchParams>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::CostLibrary)?;
    let search = params
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty());
    let items = state
        .store
        .list_library_items(owner.as_str(), library_id, search)
        .await?;
    Ok(Json(items))
}

pub async fn create_item(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(library_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<CreateLibraryItem>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::CostLibrary)?;
    let item = LibraryItem::new(library_id, input)?;
    state
        .store
        .insert_library_item(owner.as_str(), &item)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn get_item(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(library_item_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::CostLibrary)?;
    let item = state
        .store
        .get_library_item(owner.as_str(), library_item_id)
        .await?
        .ok_or_else(|| AppError::not_found("Library item"))?;
    Ok(Json(item))
}

/// Changes the catalogue price only; existing lines follow via price sync.
pub async fn update_item(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(library_item_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdateLibraryItem>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::CostLibrary)?;
    let item = state
        .store
        .update_library_item(owner.as_str(), library_item_id, input)
        .await?
        .ok_or_else(|| AppError::not_found("Library item"))?;
    Ok(Json(item))
}

pub async fn delete_item(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(library_item_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::CostLibrary)?;
    if !state
        .store
        .delete_library_item(owner.as_str(), library_item_id)
        .await?
    {
        return Err(AppError::not_found("Library item"));
    }
    Ok(StatusCode::NO_CONTENT)
}
