//! Chapter model for estimating-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Grouping of line items within an estimate ("Sloopwerk", "Metselwerk", ...).
///
/// `subtotal` caches the sum of the child lines' total prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Chapter {
    pub chapter_id: Uuid,
    pub estimate_id: Uuid,
    pub code: Option<String>,
    pub name: String,
    pub sort_order: i32,
    pub subtotal: Decimal,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a chapter.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateChapter {
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: String,
    pub sort_order: Option<i32>,
}

/// Input for updating a chapter.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateChapter {
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: Option<String>,
    pub sort_order: Option<i32>,
}

impl Chapter {
    pub fn new(estimate_id: Uuid, input: CreateChapter, default_sort_order: i32) -> Self {
        Self {
            chapter_id: Uuid::new_v4(),
            estimate_id,
            code: input.code,
            name: input.name,
            sort_order: input.sort_order.unwrap_or(default_sort_order),
            subtotal: Decimal::ZERO,
            created_utc: Utc::now(),
        }
    }

    pub fn apply_update(&mut self, input: UpdateChapter) {
        if input.code.is_some() {
            self.code = input.code;
        }
        if let Some(name) = input.name {
            self.name = name;
        }
        if let Some(sort_order) = input.sort_order {
            self.sort_order = sort_order;
        }
    }
}
