//! Cost library models for estimating-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::{amount_overflow, bounded_amount, LineCosts};

/// Reference system a cost library follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LibraryStandard {
    NlSfb,
    Stabu,
    Raw,
    Custom,
}

impl LibraryStandard {
    pub fn as_str(&self) -> &'static str {
        match self {
            LibraryStandard::NlSfb => "nl_sfb",
            LibraryStandard::Stabu => "stabu",
            LibraryStandard::Raw => "raw",
            LibraryStandard::Custom => "custom",
        }
    }
}

/// A named catalogue of reusable cost entries.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CostLibrary {
    pub library_id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub standard: String,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a cost library.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLibrary {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: String,
    pub standard: Option<LibraryStandard>,
    pub description: Option<String>,
}

impl CostLibrary {
    pub fn new(owner_id: &str, input: CreateLibrary) -> Self {
        Self {
            library_id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            name: input.name,
            standard: input
                .standard
                .unwrap_or(LibraryStandard::Custom)
                .as_str()
                .to_string(),
            description: input.description,
            created_utc: Utc::now(),
        }
    }
}

/// A catalogued cost entry. Lines copy these values; they never reference
/// them live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LibraryItem {
    pub library_item_id: Uuid,
    pub library_id: Uuid,
    pub code: String,
    pub description: String,
    pub unit: String,
    pub category: Option<String>,
    pub labor_hours: Decimal,
    pub labor_rate: Decimal,
    pub material_cost: Decimal,
    pub equipment_cost: Decimal,
    pub subcontr_cost: Decimal,
    pub unit_price: Decimal,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl LibraryItem {
    pub fn new(library_id: Uuid, input: CreateLibraryItem) -> Result<Self, AppError> {
        let now = Utc::now();
        let mut item = Self {
            library_item_id: Uuid::new_v4(),
            library_id,
            code: input.code,
            description: input.description,
            unit: input.unit,
            category: input.category,
            labor_hours: input.labor_hours.unwrap_or_default(),
            labor_rate: input.labor_rate.unwrap_or_default(),
            material_cost: input.material_cost.unwrap_or_default(),
            equipment_cost: input.equipment_cost.unwrap_or_default(),
            subcontr_cost: input.subcontr_cost.unwrap_or_default(),
            unit_price: Decimal::ZERO,
            created_utc: now,
            updated_utc: now,
        };
        item.unit_price = item.costs().unit_price().ok_or_else(amount_overflow)?;
        Ok(item)
    }

    pub fn costs(&self) -> LineCosts {
        LineCosts {
            labor_hours: self.labor_hours,
            labor_rate: self.labor_rate,
            material_cost: self.material_cost,
            equipment_cost: self.equipment_cost,
            subcontr_cost: self.subcontr_cost,
        }
    }

    pub fn apply_update(&mut self, input: UpdateLibraryItem) -> Result<(), AppError> {
        if let Some(code) = input.code {
            self.code = code;
        }
        if let Some(description) = input.description {
            self.description = description;
        }
        if let Some(unit) = input.unit {
            self.unit = unit;
        }
        if input.category.is_some() {
            self.category = input.category;
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
        self.unit_price = self.costs().unit_price().ok_or_else(amount_overflow)?;
        self.updated_utc = Utc::now();
        Ok(())
    }
}

/// Input for creating a library item.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLibraryItem {
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 500, message = "must be 1-500 characters"))]
    pub description: String,
    #[validate(length(min = 1, max = 20, message = "must be 1-20 characters"))]
    pub unit: String,
    pub category: Option<String>,
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
}

/// Input for updating a library item.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateLibraryItem {
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 500, message = "must be 1-500 characters"))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 20, message = "must be 1-20 characters"))]
    pub unit: Option<String>,
    pub category: Option<String>,
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
}
