//! Purchase order model for estimating-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::bounded_amount;

/// Purchase order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseOrderStatus {
    Draft,
    Ordered,
    Delivered,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Draft => "draft",
            PurchaseOrderStatus::Ordered => "ordered",
            PurchaseOrderStatus::Delivered => "delivered",
            PurchaseOrderStatus::Cancelled => "cancelled",
        }
    }
}

/// Order placed with a supplier for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PurchaseOrder {
    pub purchase_order_id: Uuid,
    pub project_id: Uuid,
    pub order_number: String,
    pub supplier: String,
    pub description: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub expected_date: Option<NaiveDate>,
    pub status: String,
    pub amount: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl PurchaseOrder {
    pub fn new(project_id: Uuid, input: CreatePurchaseOrder) -> Self {
        let now = Utc::now();
        Self {
            purchase_order_id: Uuid::new_v4(),
            project_id,
            order_number: input.order_number,
            supplier: input.supplier,
            description: input.description,
            order_date: input.order_date,
            expected_date: input.expected_date,
            status: PurchaseOrderStatus::Draft.as_str().to_string(),
            amount: input.amount.unwrap_or_default(),
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn apply_update(&mut self, input: UpdatePurchaseOrder) {
        if let Some(number) = input.order_number {
            self.order_number = number;
        }
        if let Some(supplier) = input.supplier {
            self.supplier = supplier;
        }
        if input.description.is_some() {
            self.description = input.description;
        }
        if input.order_date.is_some() {
            self.order_date = input.order_date;
        }
        if input.expected_date.is_some() {
            self.expected_date = input.expected_date;
        }
        if let Some(status) = input.status {
            self.status = status.as_str().to_string();
        }
        if let Some(amount) = input.amount {
            self.amount = amount;
        }
        self.updated_utc = Utc::now();
    }
}

/// Input for creating a purchase order.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePurchaseOrder {
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub order_number: String,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub supplier: String,
    pub description: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub expected_date: Option<NaiveDate>,
    #[validate(custom(function = "bounded_amount"))]
    pub amount: Option<Decimal>,
}

/// Input for updating a purchase order.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePurchaseOrder {
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub order_number: Option<String>,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub supplier: Option<String>,
    pub description: Option<String>,
    pub order_date: Option<NaiveDate>,
    pub expected_date: Option<NaiveDate>,
    pub status: Option<PurchaseOrderStatus>,
    #[validate(custom(function = "bounded_amount"))]
    pub amount: Option<Decimal>,
}
