//! Documents written to (and read back from) the search sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::alert::Alert;
use super::patient::PatientProfile;
use super::summary::ClinicalSummary;
use super::vitals::SeverityTier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalsEvent {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub patient_id: String,
    pub patient_name: Option<String>,
    pub bed_number: Option<String>,
    pub heart_rate: Option<i32>,
    pub spo2: Option<i32>,
    pub systolic_bp: Option<i32>,
    pub diastolic_bp: Option<i32>,
    pub temperature: Option<f64>,
    pub respiratory_rate: Option<i32>,
    pub alert_severity: Option<SeverityTier>,
    #[serde(default)]
    pub service: String,
}

impl VitalsEvent {
    pub fn from_patient(patient: &PatientProfile, service: &str) -> Self {
        let vitals = &patient.vitals;
        Self {
            timestamp: vitals.timestamp,
            patient_id: patient.id.clone(),
            patient_name: Some(patient.name.clone()),
            bed_number: Some(patient.bed_number.clone()),
            heart_rate: Some(vitals.heart_rate),
            spo2: Some(vitals.spo2),
            systolic_bp: Some(vitals.blood_pressure.systolic),
            diastolic_bp: Some(vitals.blood_pressure.diastolic),
            temperature: Some(vitals.temperature),
            respiratory_rate: Some(vitals.respiratory_rate),
            alert_severity: Some(patient.severity),
            service: service.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub alert_id: String,
    pub patient_id: String,
    pub alert_type: String,
    pub message: String,
    pub severity: SeverityTier,
    pub vital_type: String,
    pub vital_value: f64,
    pub threshold: f64,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub service: String,
}

impl AlertEvent {
    pub fn from_alert(alert: &Alert, service: &str) -> Self {
        Self {
            timestamp: alert.timestamp,
            alert_id: alert.id.clone(),
            patient_id: alert.patient_id.clone(),
            alert_type: alert.category.label().to_string(),
            message: alert.message.clone(),
            severity: alert.severity,
            vital_type: alert.vital_type.as_str().to_string(),
            vital_value: alert.vital_value,
            threshold: alert.threshold,
            acknowledged: alert.acknowledged,
            service: service.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryEvent {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    pub patient_id: String,
    pub patient_name: String,
    pub summary_text: String,
    pub vitals_count: usize,
    pub alerts_count: usize,
    pub model_name: String,
    pub model_version: String,
    pub processing_time_ms: u64,
    #[serde(default)]
    pub service: String,
}

impl SummaryEvent {
    pub fn from_summary(summary: &ClinicalSummary, service: &str) -> Self {
        Self {
            timestamp: summary.timestamp,
            patient_id: summary.patient_id.clone(),
            patient_name: summary.patient_name.clone(),
            summary_text: summary.text.clone(),
            vitals_count: summary.vitals_count,
            alerts_count: summary.alerts_count,
            model_name: summary.model_name.clone(),
            model_version: summary.model_version.clone(),
            processing_time_ms: summary.processing_time_ms,
            service: service.to_string(),
        }
    }

    pub fn into_summary(self) -> ClinicalSummary {
        ClinicalSummary {
            patient_id: self.patient_id,
            patient_name: self.patient_name,
            text: self.summary_text,
            vitals_count: self.vitals_count,
            alerts_count: self.alerts_count,
            processing_time_ms: self.processing_time_ms,
            timestamp: self.timestamp,
            model_name: self.model_name,
            model_version: self.model_version,
        }
    }
}
