//! Live per-patient vitals streams.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{PatientProfile, SeverityTier};

pub mod server;

pub use server::websocket_route;

/// One pushed sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsFrame {
    pub heart_rate: i32,
    #[serde(rename = "spO2")]
    pub spo2: i32,
    pub systolic: i32,
    pub diastolic: i32,
    pub temperature: f64,
    pub respiratory: i32,
    pub alert_severity: SeverityTier,
    pub timestamp: DateTime<Utc>,
}

impl From<&PatientProfile> for VitalsFrame {
    fn from(patient: &PatientProfile) -> Self {
        let vitals = &patient.vitals;
        Self {
            heart_rate: vitals.heart_rate,
            spo2: vitals.spo2,
            systolic: vitals.blood_pressure.systolic,
            diastolic: vitals.blood_pressure.diastolic,
            temperature: vitals.temperature,
            respiratory: vitals.respiratory_rate,
            alert_severity: patient.severity,
            timestamp: vitals.timestamp,
        }
    }
}

/// Open stream sessions, keyed by patient.
#[derive(Default)]
pub struct SubscriberRegistry {
    sessions: DashMap<String, HashSet<Uuid>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, patient_id: &str, session: Uuid) {
        self.sessions
            .entry(patient_id.to_string())
            .or_default()
            .insert(session);
    }

    pub fn deregister(&self, patient_id: &str, session: Uuid) {
        if let Some(mut sessions) = self.sessions.get_mut(patient_id) {
            sessions.remove(&session);
        }
        self.sessions.remove_if(patient_id, |_, sessions| sessions.is_empty());
    }

    pub fn count(&self, patient_id: &str) -> usize {
        self.sessions.get(patient_id).map_or(0, |s| s.len())
    }

    pub fn total(&self) -> usize {
        self.sessions.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VitalsSimulator;

    #[test]
    fn registry_tracks_sessions_per_patient() {
        let registry = SubscriberRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        registry.register("P001", a);
        registry.register("P001", b);
        registry.register("P002", a);
        assert_eq!(registry.count("P001"), 2);
        assert_eq!(registry.total(), 3);

        registry.deregister("P001", a);
        registry.deregister("P001", b);
        assert_eq!(registry.count("P001"), 0);
        assert_eq!(registry.total(), 1);
    }

    #[test]
    fn frame_uses_camel_case_keys() {
        let simulator = VitalsSimulator::new(Some(4));
        let patient = simulator.get_patient("P001").unwrap();
        let json = serde_json::to_value(VitalsFrame::from(&*patient)).unwrap();
        for key in ["heartRate", "spO2", "systolic", "diastolic", "temperature", "respiratory", "alertSeverity", "timestamp"] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
