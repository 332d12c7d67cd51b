//! Project model for estimating-service.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use super::nullable;

/// Project status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    OnHold,
    Completed,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::OnHold => "on_hold",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Archived => "archived",
        }
    }
}

/// A construction project; the root of estimates, invoices and planning data.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub project_id: Uuid,
    pub owner_id: String,
    pub client_id: Option<Uuid>,
    pub project_number: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub status: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a project.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProject {
    pub client_id: Option<Uuid>,
    #[validate(length(max = 50))]
    pub project_number: Option<String>,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

/// Input for updating a project. `client_id: null` detaches the client.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProject {
    #[serde(default, deserialize_with = "nullable")]
    pub client_id: Option<Option<Uuid>>,
    #[validate(length(max = 50))]
    pub project_number: Option<String>,
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub status: Option<ProjectStatus>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Project {
    pub fn new(owner_id: &str, input: CreateProject) -> Self {
        let now = Utc::now();
        Self {
            project_id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            client_id: input.client_id,
            project_number: input.project_number,
            name: input.name,
            description: input.description,
            address: input.address,
            city: input.city,
            status: ProjectStatus::Active.as_str().to_string(),
            start_date: input.start_date,
            end_date: input.end_date,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn apply_update(&mut self, input: UpdateProject) {
        if let Some(client_id) = input.client_id {
            self.client_id = client_id;
        }
        if input.project_number.is_some() {
            self.project_number = input.project_number;
        }
        if let Some(name) = input.name {
            self.name = name;
        }
        if input.description.is_some() {
            self.description = input.description;
        }
        if input.address.is_some() {
            self.address = input.address;
        }
        if input.city.is_some() {
            self.city = input.city;
        }
        if let Some(status) = input.status {
            self.status = status.as_str().to_string();
        }
        if input.start_date.is_some() {
            self.start_date = input.start_date;
        }
        if input.end_date.is_some() {
            self.end_date = input.end_date;
        }
        self.updated_utc = Utc::now();
    }
}
