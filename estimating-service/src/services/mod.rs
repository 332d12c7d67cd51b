//! Services module for estimating-service.

pub mod database;
pub mod duplication;
pub mod export;
pub mod invoicing;
pub mod memory;
pub mod metrics;
pub mod pricing;
pub mod rollup;
pub mod store;

pub use database::Database;
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use store::EstimatingStore;
