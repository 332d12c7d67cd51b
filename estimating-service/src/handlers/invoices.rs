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
use crate::models::{CreateInvoice, UpdateInvoice};
use crate::services::invoicing;
use crate::startup::AppState;

pub async fn list_invoices(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Invoices)?;
    let invoices = state.store.list_invoices(owner.as_str(), project_id).await?;
    Ok(Json(invoices))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<CreateInvoice>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Invoices)?;
    let invoice =
        invoicing::create_invoice(state.store.as_ref(), owner.as_str(), project_id, input).await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Invoices)?;
    let invoice = state
        .store
        .get_invoice(owner.as_str(), invoice_id)
        .await?
        .ok_or_else(|| AppError::not_found("Invoice"))?;
    Ok(Json(invoice))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(invoice_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdateInvoice>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Invoices)?;
    let invoice = state
        .store
        .update_invoice(owner.as_str(), invoice_id, input)
        .await?
        .ok_or_else(|| AppError::not_found("Invoice"))?;
    Ok(Json(invoice))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::Invoices)?;
    if !state.store.delete_invoice(owner.as_str(), invoice_id).await? {
        return Err(AppError::not_found("Invoice"));
    }
    Ok(StatusCode::NO_CONTENT)
}
