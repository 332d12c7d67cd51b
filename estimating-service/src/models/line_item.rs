//! Line item model for estimating-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::{amount_overflow, bounded_amount, nullable};

/// The five per-unit pricing inputs shared by line items and library items.
///
/// Everything else on a line (labor cost, unit price, total price) is
/// derived from these plus the quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LineCosts {
    pub labor_hours: Decimal,
    pub labor_rate: Decimal,
    pub material_cost: Decimal,
    pub equipment_cost: Decimal,
    pub subcontr_cost: Decimal,
}

impl LineCosts {
    /// `None` when the product does not fit a decimal.
    pub fn labor_cost(&self) -> Option<Decimal> {
        self.labor_hours.checked_mul(self.labor_rate)
    }

    pub fn unit_price(&self) -> Option<Decimal> {
        self.labor_cost()?
            .checked_add(self.material_cost)?
            .checked_add(self.equipment_cost)?
            .checked_add(self.subcontr_cost)
    }
}

/// Line item on an estimate.
///
/// Cost components are stored per unit; `total_price` is the only
/// per-line amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LineItem {
    pub line_item_id: Uuid,
    pub estimate_id: Uuid,
    pub chapter_id: Option<Uuid>,
    pub library_item_id: Option<Uuid>,
    pub code: Option<String>,
    pub description: String,
    pub quantity: Decimal,
    pub unit: String,
    pub labor_hours: Decimal,
    pub labor_rate: Decimal,
    pub labor_cost: Decimal,
    pub material_cost: Decimal,
    pub equipment_cost: Decimal,
    pub subcontr_cost: Decimal,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl LineItem {
    pub fn costs(&self) -> LineCosts {
        LineCosts {
            labor_hours: self.labor_hours,
            labor_rate: self.labor_rate,
            material_cost: self.material_cost,
            equipment_cost: self.equipment_cost,
            subcontr_cost: self.subcontr_cost,
        }
    }

    /// Overwrite the per-unit inputs and re-derive the dependent amounts.
    pub fn set_costs(&mut self, costs: LineCosts) -> Result<(), AppError> {
        self.labor_hours = costs.labor_hours;
        self.labor_rate = costs.labor_rate;
        self.material_cost = costs.material_cost;
        self.equipment_cost = costs.equipment_cost;
        self.subcontr_cost = costs.subcontr_cost;
        self.rederive()
    }

    /// Recompute labor cost, unit price and total price. Nothing is written
    /// when any of them overflows.
    pub fn rederive(&mut self) -> Result<(), AppError> {
        let costs = self.costs();
        let labor_cost = costs.labor_cost().ok_or_else(amount_overflow)?;
        let unit_price = costs.unit_price().ok_or_else(amount_overflow)?;
        let total_price = unit_price
            .checked_mul(self.quantity)
            .ok_or_else(amount_overflow)?;
        self.labor_cost = labor_cost;
        self.unit_price = unit_price;
        self.total_price = total_price;
        Ok(())
    }

    pub fn apply_update(&mut self, input: &UpdateLineItem) -> Result<(), AppError> {
        if let Some(chapter_id) = input.chapter_id {
            self.chapter_id = chapter_id;
        }
        if input.code.is_some() {
            self.code = input.code.clone();
        }
        if let Some(description) = &input.description {
            self.description = description.clone();
        }
        if let Some(quantity) = input.quantity {
            self.quantity = quantity;
        }
        if let Some(unit) = &input.unit {
            self.unit = unit.clone();
        }
        if let Some(v) = input.labor_hours {
            self.labor_hours = v;
        }
        if let Some(v) = input.labor_rate {
            self.labor_rate = v;
        }
        if let Some(v) = input.material_cost {
            self.material_cost = v;
        }
        if let Some(v) = input.equipment_cost {
            self.equipment_cost = v;
        }
        if let Some(v) = input.subcontr_cost {
            self.subcontr_cost = v;
        }
        if let Some(sort_order) = input.sort_order {
            self.sort_order = sort_order;
        }
        self.rederive()?;
        self.updated_utc = Utc::now();
        Ok(())
    }
}

/// Input for creating a line item.
///
/// When `library_item_id` is set, omitted code, description, unit and cost
/// fields are copied from the library item.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateLineItem {
    pub chapter_id: Option<Uuid>,
    pub library_item_id: Option<Uuid>,
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 500, message = "must be 1-500 characters"))]
    pub description: Option<String>,
    #[validate(custom(function = "bounded_amount"))]
    pub quantity: Decimal,
    #[validate(length(max = 20))]
    pub unit: Option<String>,
    #[validate(custom(function = "bounded_amount"))]
    pub labor_hours: Option<Decimal>,
    #[validate(custom(function = "bounded_amount"))]
    pub labor_rate: Option<Decimal>,
    #[validate(custom(function = "bounded_amount"))]
    pub material_cost: Option<Decimal>,
    #[validate(custom(function = "bounded_amount"))]
    pub equipment_cost: Option<Decimal>,
    #[validate(custom(function = "bounded_amount"))]
    pub subcontr_cost: Option<Decimal>,
    pub sort_order: Option<i32>,
}

/// Input for updating a line item. Derived amounts are never accepted.
///
/// `chapter_id: null` moves the line back to unassigned; leaving the field
/// out keeps its chapter.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateLineItem {
    #[serde(default, deserialize_with = "nullable")]
    pub chapter_id: Option<Option<Uuid>>,
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 500, message = "must be 1-500 characters"))]
    pub description: Option<String>,
    #[validate(custom(function = "bounded_amount"))]
    pub quantity: Option<Decimal>,
    #[validate(length(max = 20))]
    pub unit: Option<String>,
    #[validate(custom(function = "bounded_amount"))]
    pub labor_hours: Option<Decimal>,
    #[validate(custom(function = "bounded_amount"))]
    pub labor_rate: Option<Decimal>,
    #[validate(custom(function = "bounded_amount"))]
    pub material_cost: Option<Decimal>,
    #[validate(custom(function = "bounded_amount"))]
    pub equipment_cost: Option<Decimal>,
    #[validate(custom(function = "bounded_amount"))]
    pub subcontr_cost: Option<Decimal>,
    pub sort_order: Option<i32>,
}

/// A fully resolved line ready to be inserted; produced from
/// [`CreateLineItem`] after library defaults have been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LineDraft {
    pub chapter_id: Option<Uuid>,
    pub library_item_id: Option<Uuid>,
    pub code: Option<String>,
    pub description: String,
    pub quantity: Decimal,
    pub unit: String,
    pub costs: LineCosts,
    pub sort_order: i32,
}

impl LineDraft {
    pub fn into_line(self, estimate_id: Uuid) -> Result<LineItem, AppError> {
        let now = Utc::now();
        let mut line = LineItem {
            line_item_id: Uuid::new_v4(),
            estimate_id,
            chapter_id: self.chapter_id,
            library_item_id: self.library_item_id,
            code: self.code,
            description: self.description,
            quantity: self.quantity,
            unit: self.unit,
            labor_hours: Decimal::ZERO,
            labor_rate: Decimal::ZERO,
            labor_cost: Decimal::ZERO,
            material_cost: Decimal::ZERO,
            equipment_cost: Decimal::ZERO,
            subcontr_cost: Decimal::ZERO,
            unit_price: Decimal::ZERO,
            total_price: Decimal::ZERO,
            sort_order: self.sort_order,
            created_utc: now,
            updated_utc: now,
        };
        line.set_costs(self.costs)?;
        Ok(line)
    }
}
