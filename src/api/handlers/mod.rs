//! Request handlers, one module per component.

pub mod accounts;
pub mod alerts;
pub mod health;
pub mod patients;
pub mod summaries;
