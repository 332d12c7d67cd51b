//! Invoice model for estimating-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::{amount_overflow, bounded_amount, default_vat_percent, percentage};

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }
}

/// Invoice raised against a project, optionally derived from an estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub project_id: Uuid,
    pub estimate_id: Option<Uuid>,
    pub invoice_number: String,
    pub status: String,
    pub description: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub amount_excl_vat: Decimal,
    pub vat_percent: Decimal,
    pub vat_amount: Decimal,
    pub amount_incl_vat: Decimal,
    pub paid_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Invoice {
    pub fn new(
        project_id: Uuid,
        invoice_number: String,
        input: CreateInvoice,
    ) -> Result<Self, AppError> {
        let now = Utc::now();
        let mut invoice = Self {
            invoice_id: Uuid::new_v4(),
            project_id,
            estimate_id: input.estimate_id,
            invoice_number,
            status: InvoiceStatus::Draft.as_str().to_string(),
            description: input.description,
            issue_date: input.issue_date,
            due_date: input.due_date,
            amount_excl_vat: input.amount_excl_vat,
            vat_percent: input.vat_percent.unwrap_or_else(default_vat_percent),
            vat_amount: Decimal::ZERO,
            amount_incl_vat: Decimal::ZERO,
            paid_date: None,
            created_utc: now,
            updated_utc: now,
        };
        invoice.rederive()?;
        Ok(invoice)
    }

    fn rederive(&mut self) -> Result<(), AppError> {
        let vat_amount = self
            .amount_excl_vat
            .checked_mul(self.vat_percent)
            .ok_or_else(amount_overflow)?
            / Decimal::ONE_HUNDRED;
        self.amount_incl_vat = self
            .amount_excl_vat
            .checked_add(vat_amount)
            .ok_or_else(amount_overflow)?;
        self.vat_amount = vat_amount;
        Ok(())
    }

    pub fn apply_update(&mut self, input: UpdateInvoice) -> Result<(), AppError> {
        if let Some(number) = input.invoice_number {
            self.invoice_number = number;
        }
        if let Some(status) = input.status {
            self.status = status.as_str().to_string();
            if status == InvoiceStatus::Paid && self.paid_date.is_none() {
                self.paid_date = Some(Utc::now().date_naive());
            }
        }
        if input.description.is_some() {
            self.description = input.description;
        }
        if input.issue_date.is_some() {
            self.issue_date = input.issue_date;
        }
        if input.due_date.is_some() {
            self.due_date = input.due_date;
        }
        if let Some(amount) = input.amount_excl_vat {
            self.amount_excl_vat = amount;
        }
        if let Some(pct) = input.vat_percent {
            self.vat_percent = pct;
        }
        if input.paid_date.is_some() {
            self.paid_date = input.paid_date;
        }
        self.rederive()?;
        self.updated_utc = Utc::now();
        Ok(())
    }
}

/// Invoice number for the next invoice of a project, `{year}-{seq:04}`.
pub fn next_invoice_number(year: i32, existing: usize) -> String {
    format!("{}-{:04}", year, existing + 1)
}

/// Input for creating an invoice. A number is generated when omitted.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct CreateInvoice {
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub invoice_number: Option<String>,
    pub estimate_id: Option<Uuid>,
    pub description: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[validate(custom(function = "bounded_amount"))]
    pub amount_excl_vat: Decimal,
    #[validate(custom(function = "percentage"))]
    pub vat_percent: Option<Decimal>,
}

/// Input for updating an invoice.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateInvoice {
    #[validate(length(min = 1, max = 50, message = "must be 1-50 characters"))]
    pub invoice_number: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub description: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    #[validate(custom(function = "bounded_amount"))]
    pub amount_excl_vat: Option<Decimal>,
    #[validate(custom(function = "percentage"))]
    pub vat_percent: Option<Decimal>,
    pub paid_date: Option<NaiveDate>,
}
