//! Time entry model for estimating-service.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::bounded_amount;

/// Hours booked on a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TimeEntry {
    pub time_entry_id: Uuid,
    pub project_id: Uuid,
    pub entry_date: NaiveDate,
    pub employee_name: String,
    pub description: Option<String>,
    pub hours: Decimal,
    pub hourly_rate: Decimal,
    pub cost: Decimal,
    pub created_utc: DateTime<Utc>,
}

impl TimeEntry {
    pub fn new(project_id: Uuid, input: CreateTimeEntry) -> Self {
        let hourly_rate = input.hourly_rate.unwrap_or_default();
        Self {
            time_entry_id: Uuid::new_v4(),
            project_id,
            entry_date: input.entry_date,
            employee_name: input.employee_name,
            description: input.description,
            hours: input.hours,
            hourly_rate,
            cost: input.hours * hourly_rate,
            created_utc: Utc::now(),
        }
    }

    pub fn apply_update(&mut self, input: UpdateTimeEntry) {
        if let Some(date) = input.entry_date {
            self.entry_date = date;
        }
        if let Some(name) = input.employee_name {
            self.employee_name = name;
        }
        if input.description.is_some() {
            self.description = input.description;
        }
        if let Some(hours) = input.hours {
            self.hours = hours;
        }
        if let Some(rate) = input.hourly_rate {
            self.hourly_rate = rate;
        }
        self.cost = self.hours * self.hourly_rate;
    }
}

/// Input for booking time.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTimeEntry {
    pub entry_date: NaiveDate,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub employee_name: String,
    pub description: Option<String>,
    #[validate(custom(function = "bounded_amount"))]
    pub hours: Decimal,
    #[validate(custom(function = "bounded_amount"))]
    pub hourly_rate: Option<Decimal>,
}

/// Input for correcting a time entry.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateTimeEntry {
    pub entry_date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub employee_name: Option<String>,
    pub description: Option<String>,
    #[validate(custom(function = "bounded_amount"))]
    pub hours: Option<Decimal>,
    #[validate(custom(function = "bounded_amount"))]
    pub hourly_rate: Option<Decimal>,
}
