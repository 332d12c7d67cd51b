pub mod chapters;
pub mod clients;
pub mod edition;
pub mod estimates;
pub mod exports;
pub mod health;
pub mod invoices;
pub mod library;
pub mod lines;
pub mod milestones;
pub mod projects;
pub mod purchase_orders;
pub mod time_entries;

pub use health::{health_check, metrics_endpoint, readiness_check};
