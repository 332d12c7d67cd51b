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
use crate::models::{CreatePurchaseOrder, PurchaseOrder, UpdatePurchaseOrder};
use crate::startup::AppState;

pub async fn list_purchase_orders(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::PurchaseOrders)?;
    let orders = state
        .store
        .list_purchase_orders(owner.as_str(), project_id)
        .await?;
    Ok(Json(orders))
}

pub async fn create_purchase_order(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(project_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<CreatePurchaseOrder>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::PurchaseOrders)?;
    let order = PurchaseOrder::new(project_id, input);
    state
        .store
        .insert_purchase_order(owner.as_str(), &order)
        .await?;

    tracing::info!(
        purchase_order_id = %order.purchase_order_id,
        order_number = %order.order_number,
        "Purchase order created"
    );
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn update_purchase_order(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(purchase_order_id): Path<Uuid>,
    ValidatedJson(input): ValidatedJson<UpdatePurchaseOrder>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::PurchaseOrders)?;
    let order = state
        .store
        .update_purchase_order(owner.as_str(), purchase_order_id, input)
        .await?
        .ok_or_else(|| AppError::not_found("Purchase order"))?;
    Ok(Json(order))
}

pub async fn delete_purchase_order(
    State(state): State<AppState>,
    owner: OwnerId,
    Path(purchase_order_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.features.require(Feature::PurchaseOrders)?;
    if !state
        .store
        .delete_purchase_order(owner.as_str(), purchase_order_id)
        .await?
    {
        return Err(AppError::not_found("Purchase order"));
    }
    Ok(StatusCode::NO_CONTENT)
}
