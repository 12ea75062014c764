//! Data shapes shared across the Wardwatch services.

pub mod account;
pub mod alert;
pub mod events;
pub mod patient;
pub mod summary;
pub mod vitals;

pub use alert::{Alert, AlertCategory};
pub use patient::{ConditionClass, PatientProfile, SimulationState, Trend, VitalParameters};
pub use summary::{ClinicalSummary, ModelInfo};
pub use vitals::{BloodPressure, SeverityTier, VitalKind, VitalsSample};
