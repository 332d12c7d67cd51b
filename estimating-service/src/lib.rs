//! estimating-service: construction cost estimating for OpenCalc.
//!
//! Projects and clients, cost libraries, estimates with chapters and line
//! items, markup rollup, price sync, versioning and XLSX/IFC/CUF exports.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
