use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::vitals::{SeverityTier, VitalsSample};

/// Fixed simulation profile chosen at admission. Never transitions at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionClass {
    Stable,
    Moderate,
    Critical,
}

/// Qualitative trend tag carried alongside the baseline parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Stable,
    Fluctuating,
    Declining,
    Unstable,
}

/// Baseline and spread for a single vital.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalParameters {
    pub base: f64,
    pub variance: f64,
}

impl VitalParameters {
    pub const fn new(base: f64, variance: f64) -> Self {
        Self { base, variance }
    }
}

/// Per-patient generator state, drawn once at initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub heart_rate: VitalParameters,
    pub spo2: VitalParameters,
    pub systolic: VitalParameters,
    pub diastolic: VitalParameters,
    pub temperature: VitalParameters,
    pub respiratory_rate: VitalParameters,
    pub trend: Trend,
}

/// Static roster entry used to seed the simulator.
#[derive(Debug, Clone, Copy)]
pub struct RosterEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub bed: &'static str,
    pub age: u32,
    pub gender: &'static str,
    pub condition: ConditionClass,
}

pub const DEFAULT_ROSTER: &[RosterEntry] = &[
    RosterEntry { id: "P001", name: "John Smith", bed: "ICU-101", age: 65, gender: "Male", condition: ConditionClass::Stable },
    RosterEntry { id: "P002", name: "Sarah Johnson", bed: "ICU-102", age: 45, gender: "Female", condition: ConditionClass::Moderate },
    RosterEntry { id: "P003", name: "Michael Brown", bed: "ICU-103", age: 72, gender: "Male", condition: ConditionClass::Critical },
    RosterEntry { id: "P004", name: "Emily Davis", bed: "ICU-104", age: 38, gender: "Female", condition: ConditionClass::Stable },
    RosterEntry { id: "P005", name: "Robert Wilson", bed: "ICU-105", age: 58, gender: "Male", condition: ConditionClass::Moderate },
    RosterEntry { id: "P006", name: "Jennifer Martinez", bed: "ICU-106", age: 51, gender: "Female", condition: ConditionClass::Stable },
    RosterEntry { id: "P007", name: "David Lee", bed: "ICU-107", age: 69, gender: "Male", condition: ConditionClass::Stable },
    RosterEntry { id: "P008", name: "Lisa Anderson", bed: "ICU-108", age: 43, gender: "Female", condition: ConditionClass::Critical },
    RosterEntry { id: "P009", name: "James Taylor", bed: "ICU-109", age: 55, gender: "Male", condition: ConditionClass::Moderate },
    RosterEntry { id: "P010", name: "Maria Garcia", bed: "ICU-110", age: 62, gender: "Female", condition: ConditionClass::Stable },
];

pub const DIAGNOSES: &[&str] = &[
    "Acute Respiratory Distress Syndrome (ARDS)",
    "Sepsis",
    "Pneumonia",
    "Acute Myocardial Infarction",
    "Congestive Heart Failure",
    "Diabetic Ketoacidosis",
    "Stroke",
    "Acute Kidney Injury",
    "Post-operative monitoring",
    "Multi-organ failure",
];

pub const PHYSICIANS: &[&str] = &[
    "Dr. James Wilson",
    "Dr. Sarah Chen",
    "Dr. Michael Roberts",
    "Dr. Emily Thompson",
    "Dr. David Kim",
    "Dr. Jennifer Adams",
];

/// Name lookup against the fixed roster.
pub fn roster_name(patient_id: &str) -> Option<&'static str> {
    DEFAULT_ROSTER
        .iter()
        .find(|entry| entry.id == patient_id)
        .map(|entry| entry.name)
}

/// A monitored patient together with the latest generated sample.
///
/// Held behind an `Arc` by the simulator; every regeneration produces a new
/// value rather than mutating this one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientProfile {
    pub id: String,
    pub name: String,
    pub bed_number: String,
    pub age: u32,
    pub gender: String,
    pub admission_date: DateTime<Utc>,
    pub diagnosis: Option<String>,
    pub attending_physician: Option<String>,
    pub condition: ConditionClass,
    pub state: SimulationState,
    pub vitals: VitalsSample,
    pub severity: SeverityTier,
}

impl PatientProfile {
    /// Copy of this profile carrying a fresh sample.
    pub fn with_sample(&self, vitals: VitalsSample, severity: SeverityTier) -> Self {
        Self {
            vitals,
            severity,
            ..self.clone()
        }
    }
}
