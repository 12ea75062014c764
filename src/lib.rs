//! Wardwatch core library
//!
//! Simulated ICU monitoring: a vitals simulator, a rule-based alert engine,
//! a clinical summarizer and an account service. The binary can host all of
//! them in one process or any single one on its own.

pub mod api;
pub mod auth;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod models;
pub mod search;
pub mod state;
pub mod tasks;
pub mod telemetry;
pub mod websocket;

pub use error::ServiceError;
pub use state::AppState;
