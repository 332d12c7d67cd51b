//! Client (customer) model for estimating-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// A construction client; the party a project is built for.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Client {
    pub client_id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    /// Dutch Chamber of Commerce (KvK) registration number.
    pub kvk_number: Option<String>,
    pub vat_number: Option<String>,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a client.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateClient {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 200))]
    pub contact_person: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    pub address: Option<String>,
    #[validate(length(max = 20))]
    pub postal_code: Option<String>,
    pub city: Option<String>,
    #[validate(length(max = 20))]
    pub kvk_number: Option<String>,
    #[validate(length(max = 30))]
    pub vat_number: Option<String>,
    pub notes: Option<String>,
}

/// Input for updating a client. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateClient {
    #[validate(length(min = 1, max = 200, message = "must be 1-200 characters"))]
    pub name: Option<String>,
    pub contact_person: Option<String>,
    #[validate(email(message = "must be a valid email address"))]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub kvk_number: Option<String>,
    pub vat_number: Option<String>,
    pub notes: Option<String>,
}

impl Client {
    pub fn new(owner_id: &str, input: CreateClient) -> Self {
        let now = Utc::now();
        Self {
            client_id: Uuid::new_v4(),
            owner_id: owner_id.to_string(),
            name: input.name,
            contact_person: input.contact_person,
            email: input.email,
            phone: input.phone,
            address: input.address,
            postal_code: input.postal_code,
            city: input.city,
            kvk_number: input.kvk_number,
            vat_number: input.vat_number,
            notes: input.notes,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn apply_update(&mut self, input: UpdateClient) {
        if let Some(name) = input.name {
            self.name = name;
        }
        if input.contact_person.is_some() {
            self.contact_person = input.contact_person;
        }
        if input.email.is_some() {
            self.email = input.email;
        }
        if input.phone.is_some() {
            self.phone = input.phone;
        }
        if input.address.is_some() {
            self.address = input.address;
        }
        if input.postal_code.is_some() {
            self.postal_code = input.postal_code;
        }
        if input.city.is_some() {
            self.city = input.city;
        }
        if input.kvk_number.is_some() {
            self.kvk_number = input.kvk_number;
        }
        if input.vat_number.is_some() {
            self.vat_number = input.vat_number;
        }
        if input.notes.is_some() {
            self.notes = input.notes;
        }
        self.updated_utc = Utc::now();
    }
}
