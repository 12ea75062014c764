use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::vitals::{SeverityTier, VitalKind};

/// The ten clinical alert kinds the evaluator can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertCategory {
    #[serde(rename = "Tachycardia Alert")]
    Tachycardia,
    #[serde(rename = "Bradycardia Alert")]
    Bradycardia,
    #[serde(rename = "Hypoxia Alert")]
    Hypoxia,
    #[serde(rename = "Hypertensive Crisis")]
    HypertensiveCrisis,
    #[serde(rename = "Hypotension Alert")]
    Hypotension,
    #[serde(rename = "Fever Alert")]
    Fever,
    #[serde(rename = "Hypothermia Alert")]
    Hypothermia,
    #[serde(rename = "Tachypnea Alert")]
    Tachypnea,
    #[serde(rename = "Bradypnea Alert")]
    Bradypnea,
    #[serde(rename = "Sensor Disconnection")]
    SensorDisconnect,
}

impl AlertCategory {
    pub fn label(&self) -> &'static str {
        match self {
            AlertCategory::Tachycardia => "Tachycardia Alert",
            AlertCategory::Bradycardia => "Bradycardia Alert",
            AlertCategory::Hypoxia => "Hypoxia Alert",
            AlertCategory::HypertensiveCrisis => "Hypertensive Crisis",
            AlertCategory::Hypotension => "Hypotension Alert",
            AlertCategory::Fever => "Fever Alert",
            AlertCategory::Hypothermia => "Hypothermia Alert",
            AlertCategory::Tachypnea => "Tachypnea Alert",
            AlertCategory::Bradypnea => "Bradypnea Alert",
            AlertCategory::SensorDisconnect => "Sensor Disconnection",
        }
    }
}

impl fmt::Display for AlertCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub patient_id: String,
    #[serde(rename = "type")]
    pub category: AlertCategory,
    pub severity: SeverityTier,
    pub vital_type: VitalKind,
    pub vital_value: f64,
    pub threshold: f64,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
}
