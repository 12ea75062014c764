//! Where the summarizer reads recent clinical history from.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use crate::core::alerts::AlertEngine;
use crate::core::severity::classify;
use crate::core::vitals::VitalsSimulator;
use crate::models::events::{AlertEvent, VitalsEvent};
use crate::models::{ClinicalSummary, VitalsSample};
use crate::search::SearchClient;

/// Read side of the monitoring history. Implementations swallow their own
/// failures and report empty results instead.
#[async_trait]
pub trait ClinicalHistory: Send + Sync {
    /// Vitals newer than `minutes`, newest first, at most `limit`.
    async fn recent_vitals(&self, patient_id: &str, minutes: u32, limit: usize) -> Vec<VitalsEvent>;

    /// Alerts newer than `minutes`, newest first, at most `limit`.
    async fn recent_alerts(&self, patient_id: &str, minutes: u32, limit: usize) -> Vec<AlertEvent>;

    /// Patients with recent activity.
    async fn patient_ids(&self) -> Vec<String>;

    async fn latest_summary(&self, patient_id: &str) -> Option<ClinicalSummary>;

    async fn save_summary(&self, summary: &ClinicalSummary);
}

/// History served straight from the in-process simulator and alert engine.
///
/// Summaries go to the search sink when one is attached.
pub struct LocalHistory {
    simulator: Arc<VitalsSimulator>,
    alerts: Arc<AlertEngine>,
    sink: Option<Arc<SearchClient>>,
}

impl LocalHistory {
    pub fn new(
        simulator: Arc<VitalsSimulator>,
        alerts: Arc<AlertEngine>,
        sink: Option<Arc<SearchClient>>,
    ) -> Self {
        Self {
            simulator,
            alerts,
            sink,
        }
    }

    fn to_event(&self, patient_id: &str, sample: VitalsSample) -> VitalsEvent {
        let patient = self.simulator.get_patient(patient_id);
        VitalsEvent {
            timestamp: sample.timestamp,
            patient_id: patient_id.to_string(),
            patient_name: patient.as_ref().map(|p| p.name.clone()),
            bed_number: patient.as_ref().map(|p| p.bed_number.clone()),
            heart_rate: Some(sample.heart_rate),
            spo2: Some(sample.spo2),
            systolic_bp: Some(sample.blood_pressure.systolic),
            diastolic_bp: Some(sample.blood_pressure.diastolic),
            temperature: Some(sample.temperature),
            respiratory_rate: Some(sample.respiratory_rate),
            alert_severity: Some(classify(&sample)),
            service: "vitals-generator".to_string(),
        }
    }
}

#[async_trait]
impl ClinicalHistory for LocalHistory {
    async fn recent_vitals(&self, patient_id: &str, minutes: u32, limit: usize) -> Vec<VitalsEvent> {
        let Some(series) = self.simulator.history_minutes(patient_id, minutes) else {
            return Vec::new();
        };
        series
            .into_iter()
            .rev()
            .take(limit)
            .map(|sample| self.to_event(patient_id, sample))
            .collect()
    }

    async fn recent_alerts(&self, patient_id: &str, minutes: u32, limit: usize) -> Vec<AlertEvent> {
        let since = Utc::now() - Duration::minutes(i64::from(minutes));
        let mut alerts = self.alerts.get_for_patient(patient_id);
        alerts.retain(|alert| alert.timestamp >= since);
        alerts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        alerts
            .iter()
            .take(limit)
            .map(|alert| AlertEvent::from_alert(alert, "alert-engine"))
            .collect()
    }

    async fn patient_ids(&self) -> Vec<String> {
        self.simulator.patient_ids()
    }

    async fn latest_summary(&self, patient_id: &str) -> Option<ClinicalSummary> {
        match &self.sink {
            Some(sink) => sink.get_latest_summary(patient_id).await,
            None => None,
        }
    }

    async fn save_summary(&self, summary: &ClinicalSummary) {
        if let Some(sink) = &self.sink {
            sink.save_summary(summary).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertThresholds;
    use crate::core::data::VitalsReading;

    fn history() -> (LocalHistory, Arc<AlertEngine>) {
        let simulator = Arc::new(VitalsSimulator::new(Some(21)));
        let alerts = Arc::new(AlertEngine::new(AlertThresholds::default()));
        (LocalHistory::new(simulator, Arc::clone(&alerts), None), alerts)
    }

    #[tokio::test]
    async fn vitals_are_newest_first_and_capped() {
        let (history, _) = history();
        let vitals = history.recent_vitals("P002", 30, 10).await;
        assert_eq!(vitals.len(), 10);
        assert!(vitals.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
        assert_eq!(vitals[0].patient_name.as_deref(), Some("Sarah Johnson"));
    }

    #[tokio::test]
    async fn unknown_patient_has_no_history() {
        let (history, _) = history();
        assert!(history.recent_vitals("P404", 30, 10).await.is_empty());
        assert!(history.recent_alerts("P404", 30, 10).await.is_empty());
    }

    #[tokio::test]
    async fn alerts_come_from_the_engine() {
        let (history, engine) = history();
        let reading = VitalsReading {
            heart_rate: 140.0,
            spo2: 85.0,
            systolic: 118.0,
            diastolic: 76.0,
            temperature: 36.8,
            respiratory_rate: 15.0,
        };
        engine.evaluate("P001", &reading);

        let alerts = history.recent_alerts("P001", 30, 100).await;
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].alert_type, "Tachycardia Alert");
    }

    #[tokio::test]
    async fn summaries_without_sink_are_not_persisted() {
        let (history, _) = history();
        assert!(history.latest_summary("P001").await.is_none());
        assert_eq!(history.patient_ids().await.len(), 10);
    }
}
