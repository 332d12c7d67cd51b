//! Milestone model for estimating-service.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Planning milestone within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Milestone {
    pub milestone_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub completed_utc: Option<DateTime<Utc>>,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

impl Milestone {
    pub fn new(project_id: Uuid, input: CreateMilestone) -> Self {
        Self {
            milestone_id: Uuid::new_v4(),
            project_id,
            name: input.name,
            description: input.description,
            due_date: input.due_date,
            completed: false,
            completed_utc: None,
            sort_order: input.sort_order.unwrap_or(0),
            created_utc: Utc::now(),
        }
    }

    pub fn apply_update(&mut self, input: UpdateMilestone) {
        if let Some(name) = input.name {
            self.name = name;
        }
        if input.description.is_some() {
            self.description = input.description;
        }
        if input.due_date.is_some() {
            self.due_date = input.due_date;
        }
        if let Some(sort_order) = input.sort_order {
            self.sort_order = sort_order;
        }
        match input.completed {
            Some(true) if !self.completed => {
                self.completed = true;
                self.completed_utc = Some(Utc::now());
            }
            Some(false) => {
                self.completed = false;
                self.completed_utc = None;
            }
            _ => {}
        }
    }
}

/// Input for creating a milestone.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMilestone {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub sort_order: Option<i32>,
}

/// Input for updating a milestone.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateMilestone {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub completed: Option<bool>,
    pub sort_order: Option<i32>,
}
