use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Generated clinical text for one patient, cached until the next cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalSummary {
    pub patient_id: String,
    pub patient_name: String,
    pub text: String,
    pub vitals_count: usize,
    pub alerts_count: usize,
    pub processing_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub model_name: String,
    pub model_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub full_name: String,
    pub loaded: bool,
    pub max_input_length: usize,
    pub max_output_length: usize,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
}
