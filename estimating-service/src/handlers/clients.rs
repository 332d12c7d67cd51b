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
use crate::models::{Client, CreateClient, UpdateClient};
use crate::startup::AppState;

pub async fn list_clients(
    State(state): State<AppState>,
    owner: OwnerId,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Clients)?;
    let clients = state.store.list_clients(owner.as_str()).await?;
    Ok(Json(clients))
}

pub async fn create_client(
    State(state): State<AppState>,
    owner: OwnerId,
    ValidatedJson(input): ValidatedJson<CreateClient>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Clients)?;
    let client = Client::new(owner.as_str(), input);
    state.store.insert_client(&client).await?;

    tracing::info!(client_id = %client.client_id, "Client created");
    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn get_client(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(client_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Clients)?;
    let client = state
        .store
        .get_client(owner.as_str(), client_id)
        .await?
        .ok_or_else(|| AppError::not_found("Client"))?;
    Ok(Json(client))
}

pub async fn update_client(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(client_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdateClient>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Clients)?;
    let client = state
        .store
        .update_client(owner.as_str(), client_id, input)
        .await?
        .ok_or_else(|| AppError::not_found("Client"))?;
    Ok(Json(client))
}

pub async fn delete_client(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(client_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Clients)?;
    if !state.store.delete_client(owner.as_str(), client_id).await? {
        return Err(AppError::not_found("Client"));
    }
    tracing::info!(client_id = %client_id, "Client deleted");
    Ok(StatusCode::NO_CONTENT)
}
