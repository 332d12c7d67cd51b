//! Estimate model for estimating-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::{percentage, Chapter, LineItem};

/// Dutch standard VAT rate, applied when an estimate does not specify one.
pub fn default_vat_percent() -> Decimal {
    Decimal::new(21, 0)
}

/// Estimate status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateStatus {
    Draft,
    Sent,
    Accepted,
    Rejected,
}

impl EstimateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstimateStatus::Draft => "draft",
            EstimateStatus::Sent => "sent",
            EstimateStatus::Accepted => "accepted",
            EstimateStatus::Rejected => "rejected",
        }
    }
}

/// Markup percentages, applied in this order and compounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Markup {
    pub general_costs_percent: Decimal,
    pub profit_percent: Decimal,
    pub risk_percent: Decimal,
    pub vat_percent: Decimal,
}

/// Aggregate amounts cached on an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EstimateTotals {
    pub total_labor: Decimal,
    pub total_material: Decimal,
    pub total_equipment: Decimal,
    pub total_subcontr: Decimal,
    pub subtotal: Decimal,
    pub general_costs_amount: Decimal,
    pub profit_amount: Decimal,
    pub risk_amount: Decimal,
    pub total_excl_vat: Decimal,
    pub vat_amount: Decimal,
    pub total_incl_vat: Decimal,
}

/// Estimate (begroting) for a project.
///
/// The total fields are a cache of the rollup over the estimate's lines;
/// `row_version` increments on every write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Estimate {
    pub estimate_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub version: i32,
    pub status: String,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
    pub general_costs_percent: Decimal,
    pub profit_percent: Decimal,
    pub risk_percent: Decimal,
    pub vat_percent: Decimal,
    pub total_labor: Decimal,
    pub total_material: Decimal,
    pub total_equipment: Decimal,
    pub total_subcontr: Decimal,
    pub subtotal: Decimal,
    pub general_costs_amount: Decimal,
    pub profit_amount: Decimal,
    pub risk_amount: Decimal,
    pub total_excl_vat: Decimal,
    pub vat_amount: Decimal,
    pub total_incl_vat: Decimal,
    pub row_version: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Estimate {
    pub fn new(project_id: Uuid, input: CreateEstimate) -> Self {
        let now = Utc::now();
        Self {
            estimate_id: Uuid::new_v4(),
            project_id,
            name: input.name,
            description: input.description,
            version: 1,
            status: EstimateStatus::Draft.as_str().to_string(),
            valid_until: input.valid_until,
            notes: input.notes,
            general_costs_percent: input.general_costs_percent.unwrap_or_default(),
            profit_percent: input.profit_percent.unwrap_or_default(),
            risk_percent: input.risk_percent.unwrap_or_default(),
            vat_percent: input.vat_percent.unwrap_or_else(default_vat_percent),
            total_labor: Decimal::ZERO,
            total_material: Decimal::ZERO,
            total_equipment: Decimal::ZERO,
            total_subcontr: Decimal::ZERO,
            subtotal: Decimal::ZERO,
            general_costs_amount: Decimal::ZERO,
            profit_amount: Decimal::ZERO,
            risk_amount: Decimal::ZERO,
            total_excl_vat: Decimal::ZERO,
            vat_amount: Decimal::ZERO,
            total_incl_vat: Decimal::ZERO,
            row_version: 0,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn markup(&self) -> Markup {
        Markup {
            general_costs_percent: self.general_costs_percent,
            profit_percent: self.profit_percent,
            risk_percent: self.risk_percent,
            vat_percent: self.vat_percent,
        }
    }

    pub fn totals(&self) -> EstimateTotals {
        EstimateTotals {
            total_labor: self.total_labor,
            total_material: self.total_material,
            total_equipment: self.total_equipment,
            total_subcontr: self.total_subcontr,
            subtotal: self.subtotal,
            general_costs_amount: self.general_costs_amount,
            profit_amount: self.profit_amount,
            risk_amount: self.risk_amount,
            total_excl_vat: self.total_excl_vat,
            vat_amount: self.vat_amount,
            total_incl_vat: self.total_incl_vat,
        }
    }

    pub fn set_totals(&mut self, totals: EstimateTotals) {
        self.total_labor = totals.total_labor;
        self.total_material = totals.total_material;
        self.total_equipment = totals.total_equipment;
        self.total_subcontr = totals.total_subcontr;
        self.subtotal = totals.subtotal;
        self.general_costs_amount = totals.general_costs_amount;
        self.profit_amount = totals.profit_amount;
        self.risk_amount = totals.risk_amount;
        self.total_excl_vat = totals.total_excl_vat;
        self.vat_amount = totals.vat_amount;
        self.total_incl_vat = totals.total_incl_vat;
    }

    /// Apply descriptive and markup changes. Totals are left to the rollup.
    pub fn apply_update(&mut self, input: &UpdateEstimate) {
        if let Some(name) = &input.name {
            self.name = name.clone();
        }
        if input.description.is_some() {
            self.description = input.description.clone();
        }
        if let Some(status) = input.status {
            self.status = status.as_str().to_string();
        }
        if input.valid_until.is_some() {
            self.valid_until = input.valid_until;
        }
        if input.notes.is_some() {
            self.notes = input.notes.clone();
        }
        if let Some(v) = input.general_costs_percent {
            self.general_costs_percent = v;
        }
        if let Some(v) = input.profit_percent {
            self.profit_percent = v;
        }
        if let Some(v) = input.risk_percent {
            self.risk_percent = v;
        }
        if let Some(v) = input.vat_percent {
            self.vat_percent = v;
        }
        self.updated_utc = Utc::now();
    }
}

/// Input for creating an estimate.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateEstimate {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
    #[validate(custom(function = "percentage"))]
    pub general_costs_percent: Option<Decimal>,
    #[validate(custom(function = "percentage"))]
    pub profit_percent: Option<Decimal>,
    #[validate(custom(function = "percentage"))]
    pub risk_percent: Option<Decimal>,
    #[validate(custom(function = "percentage"))]
    pub vat_percent: Option<Decimal>,
}

/// Input for updating an estimate.
///
/// `expected_version` enables optimistic concurrency: the update is
/// refused when the stored `row_version` differs.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateEstimate {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<EstimateStatus>,
    pub valid_until: Option<NaiveDate>,
    pub notes: Option<String>,
    #[validate(custom(function = "percentage"))]
    pub general_costs_percent: Option<Decimal>,
    #[validate(custom(function = "percentage"))]
    pub profit_percent: Option<Decimal>,
    #[validate(custom(function = "percentage"))]
    pub risk_percent: Option<Decimal>,
    #[validate(custom(function = "percentage"))]
    pub vat_percent: Option<Decimal>,
    pub expected_version: Option<i32>,
}

/// An estimate with all of its chapters and lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimateTree {
    pub estimate: Estimate,
    pub chapters: Vec<Chapter>,
    pub lines: Vec<LineItem>,
}

impl EstimateTree {
    /// Lines belonging to `chapter_id` (or unassigned lines for `None`),
    /// in display order.
    pub fn lines_in(&self, chapter_id: Option<Uuid>) -> Vec<&LineItem> {
        let mut lines: Vec<&LineItem> = self
            .lines
            .iter()
            .filter(|l| l.chapter_id == chapter_id)
            .collect();
        lines.sort_by_key(|l| (l.sort_order, l.created_utc));
        lines
    }

    /// Chapters in display order.
    pub fn sorted_chapters(&self) -> Vec<&Chapter> {
        let mut chapters: Vec<&Chapter> = self.chapters.iter().collect();
        chapters.sort_by_key(|c| (c.sort_order, c.created_utc));
        chapters
    }
}
