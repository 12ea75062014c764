//! Boundary normalisation for incoming vitals.
//!
//! Everything that reaches the alert evaluator goes through [`VitalsReading`].
//! Payloads from the outside world (the remote vitals service, `/api/analyze`)
//! arrive as [`RawVitals`], which accepts either key convention and fills gaps
//! with fixed defaults.

use serde::{Deserialize, Serialize};

use crate::models::VitalsSample;

pub const DEFAULT_HEART_RATE: f64 = 0.0;
pub const DEFAULT_SPO2: f64 = 100.0;
pub const DEFAULT_SYSTOLIC: f64 = 120.0;
pub const DEFAULT_DIASTOLIC: f64 = 80.0;
pub const DEFAULT_TEMPERATURE: f64 = 37.0;
pub const DEFAULT_RESPIRATORY_RATE: f64 = 16.0;

/// Canonical evaluator input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VitalsReading {
    pub heart_rate: f64,
    pub spo2: f64,
    pub systolic: f64,
    pub diastolic: f64,
    pub temperature: f64,
    pub respiratory_rate: f64,
}

impl From<&VitalsSample> for VitalsReading {
    fn from(sample: &VitalsSample) -> Self {
        Self {
            heart_rate: f64::from(sample.heart_rate),
            spo2: f64::from(sample.spo2),
            systolic: f64::from(sample.blood_pressure.systolic),
            diastolic: f64::from(sample.blood_pressure.diastolic),
            temperature: sample.temperature,
            respiratory_rate: f64::from(sample.respiratory_rate),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawBloodPressure {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
}

/// Loosely-shaped vitals as received over the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawVitals {
    #[serde(alias = "heartRate")]
    pub heart_rate: Option<f64>,
    #[serde(alias = "spO2", alias = "SpO2")]
    pub spo2: Option<f64>,
    #[serde(alias = "bloodPressure")]
    pub blood_pressure: Option<RawBloodPressure>,
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub temperature: Option<f64>,
    #[serde(alias = "respiratory", alias = "respiratoryRate")]
    pub respiratory_rate: Option<f64>,
}

impl RawVitals {
    /// Nested blood pressure wins over the flat keys.
    pub fn normalize(self) -> VitalsReading {
        let bp = self.blood_pressure.unwrap_or_default();
        VitalsReading {
            heart_rate: self.heart_rate.unwrap_or(DEFAULT_HEART_RATE),
            spo2: self.spo2.unwrap_or(DEFAULT_SPO2),
            systolic: bp.systolic.or(self.systolic).unwrap_or(DEFAULT_SYSTOLIC),
            diastolic: bp.diastolic.or(self.diastolic).unwrap_or(DEFAULT_DIASTOLIC),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            respiratory_rate: self.respiratory_rate.unwrap_or(DEFAULT_RESPIRATORY_RATE),
        }
    }
}

impl From<RawVitals> for VitalsReading {
    fn from(raw: RawVitals) -> Self {
        raw.normalize()
    }
}
