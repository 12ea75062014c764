//! Rule-based alert evaluation.
//!
//! [`detect`] is a pure mapping from one reading to the rules it trips. The
//! [`AlertEngine`] wraps it with id assignment and the per-patient active set:
//! every evaluation replaces the patient's previous alerts outright, so the
//! engine always holds the latest batch per patient and nothing older.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, info, instrument};

use crate::config::AlertThresholds;
use crate::core::data::VitalsReading;
use crate::models::{Alert, AlertCategory, SeverityTier, VitalKind};

const SENSOR_MESSAGE: &str =
    "Vital signs sensor may be disconnected. Check patient monitoring equipment.";

/// One tripped rule, before it is given an id and a timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub category: AlertCategory,
    pub severity: SeverityTier,
    pub vital: VitalKind,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

fn num(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

fn high_band(value: f64, warning: f64, critical: f64) -> Option<(SeverityTier, f64)> {
    if value >= critical {
        Some((SeverityTier::Critical, critical))
    } else if value >= warning {
        Some((SeverityTier::Warning, warning))
    } else {
        None
    }
}

/// Zero is never a physiological low; it is reported as a sensor fault instead.
fn low_band(value: f64, warning: f64, critical: f64) -> Option<(SeverityTier, f64)> {
    if value <= 0.0 {
        None
    } else if value <= critical {
        Some((SeverityTier::Critical, critical))
    } else if value <= warning {
        Some((SeverityTier::Warning, warning))
    } else {
        None
    }
}

/// Every rule `reading` trips under `t`, in a fixed family order.
pub fn detect(t: &AlertThresholds, reading: &VitalsReading) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut push = |category, vital, value, (severity, threshold): (SeverityTier, f64), message| {
        findings.push(Finding {
            category,
            severity,
            vital,
            value,
            threshold,
            message,
        })
    };

    // Heart rate
    let hr = reading.heart_rate;
    if let Some(band) = high_band(hr, t.hr_high_warning, t.hr_high_critical) {
        let message = match band.0 {
            SeverityTier::Critical => format!(
                "Critical tachycardia detected. Heart rate: {} bpm (threshold: >{})",
                num(hr),
                num(band.1)
            ),
            _ => format!("Elevated heart rate detected: {} bpm (threshold: >{})", num(hr), num(band.1)),
        };
        push(AlertCategory::Tachycardia, VitalKind::HeartRate, hr, band, message);
    }
    if let Some(band) = low_band(hr, t.hr_low_warning, t.hr_low_critical) {
        let message = match band.0 {
            SeverityTier::Critical => format!(
                "Critical bradycardia detected. Heart rate: {} bpm (threshold: <{})",
                num(hr),
                num(band.1)
            ),
            _ => format!("Low heart rate detected: {} bpm (threshold: <{})", num(hr), num(band.1)),
        };
        push(AlertCategory::Bradycardia, VitalKind::HeartRate, hr, band, message);
    }

    // SpO2
    let spo2 = reading.spo2;
    if let Some(band) = low_band(spo2, t.spo2_warning, t.spo2_critical) {
        let message = match band.0 {
            SeverityTier::Critical => format!(
                "Critical hypoxia detected. SpO2: {}% (threshold: <{}%)",
                num(spo2),
                num(band.1)
            ),
            _ => format!("Low oxygen saturation detected: {}% (threshold: <{}%)", num(spo2), num(band.1)),
        };
        push(AlertCategory::Hypoxia, VitalKind::Spo2, spo2, band, message);
    }

    // Blood pressure gates on systolic; diastolic only appears in the message.
    let (sys, dia) = (reading.systolic, reading.diastolic);
    if let Some(band) = high_band(sys, t.bp_systolic_warning, t.bp_systolic_critical) {
        let message = match band.0 {
            SeverityTier::Critical => format!(
                "Hypertensive crisis! BP: {}/{} mmHg (threshold: >{})",
                num(sys),
                num(dia),
                num(band.1)
            ),
            _ => format!(
                "Elevated blood pressure: {}/{} mmHg (threshold: >{})",
                num(sys),
                num(dia),
                num(band.1)
            ),
        };
        push(AlertCategory::HypertensiveCrisis, VitalKind::BloodPressure, sys, band, message);
    }
    if let Some(band) = low_band(sys, t.bp_systolic_low_warning, t.bp_systolic_low_critical) {
        let message = match band.0 {
            SeverityTier::Critical => format!(
                "Critical hypotension! BP: {}/{} mmHg (threshold: <{})",
                num(sys),
                num(dia),
                num(band.1)
            ),
            _ => format!(
                "Low blood pressure: {}/{} mmHg (threshold: <{})",
                num(sys),
                num(dia),
                num(band.1)
            ),
        };
        push(AlertCategory::Hypotension, VitalKind::BloodPressure, sys, band, message);
    }

    // Temperature
    let temp = reading.temperature;
    if let Some(band) = high_band(temp, t.temp_warning, t.temp_critical) {
        let message = match band.0 {
            SeverityTier::Critical => format!(
                "High fever detected: {:.1}°C (threshold: >{:.1}°C)",
                temp, band.1
            ),
            _ => format!("Elevated temperature: {:.1}°C (threshold: >{:.1}°C)", temp, band.1),
        };
        push(AlertCategory::Fever, VitalKind::Temperature, temp, band, message);
    }
    if let Some(band) = low_band(temp, t.temp_low_warning, t.temp_low_critical) {
        let message = match band.0 {
            SeverityTier::Critical => format!(
                "Critical hypothermia: {:.1}°C (threshold: <{:.1}°C)",
                temp, band.1
            ),
            _ => format!("Low body temperature: {:.1}°C (threshold: <{:.1}°C)", temp, band.1),
        };
        push(AlertCategory::Hypothermia, VitalKind::Temperature, temp, band, message);
    }

    // Respiratory rate
    let resp = reading.respiratory_rate;
    if let Some(band) = high_band(resp, t.resp_high_warning, t.resp_high_critical) {
        let message = match band.0 {
            SeverityTier::Critical => format!(
                "Critical tachypnea: {}/min (threshold: >{})",
                num(resp),
                num(band.1)
            ),
            _ => format!("Elevated respiratory rate: {}/min (threshold: >{})", num(resp), num(band.1)),
        };
        push(AlertCategory::Tachypnea, VitalKind::RespiratoryRate, resp, band, message);
    }
    if let Some(band) = low_band(resp, t.resp_low_warning, t.resp_low_critical) {
        let message = match band.0 {
            SeverityTier::Critical => format!(
                "Critical bradypnea: {}/min (threshold: <{})",
                num(resp),
                num(band.1)
            ),
            _ => format!("Low respiratory rate: {}/min (threshold: <{})", num(resp), num(band.1)),
        };
        push(AlertCategory::Bradypnea, VitalKind::RespiratoryRate, resp, band, message);
    }

    // A single disconnect alert covers either channel reading zero.
    if hr == 0.0 || spo2 == 0.0 {
        push(
            AlertCategory::SensorDisconnect,
            VitalKind::Sensor,
            0.0,
            (SeverityTier::Warning, 0.0),
            SENSOR_MESSAGE.to_string(),
        );
    }

    findings
}

pub struct AlertEngine {
    thresholds: AlertThresholds,
    active: DashMap<String, Vec<Alert>>,
    counter: AtomicU64,
}

impl AlertEngine {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            active: DashMap::new(),
            counter: AtomicU64::new(0),
        }
    }

    /// `ALT-YYYYMMDD-NNNNN`, increasing for the lifetime of the process.
    fn next_id(&self, now: DateTime<Utc>) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("ALT-{}-{:05}", now.format("%Y%m%d"), seq)
    }

    /// Evaluate one reading and make the result the patient's active alert set.
    #[instrument(skip(self, reading), fields(patient_id = %patient_id))]
    pub fn evaluate(&self, patient_id: &str, reading: &VitalsReading) -> Vec<Alert> {
        let now = Utc::now();
        let alerts: Vec<Alert> = detect(&self.thresholds, reading)
            .into_iter()
            .map(|finding| Alert {
                id: self.next_id(now),
                patient_id: patient_id.to_string(),
                category: finding.category,
                severity: finding.severity,
                vital_type: finding.vital,
                vital_value: finding.value,
                threshold: finding.threshold,
                message: finding.message,
                timestamp: now,
                acknowledged: false,
            })
            .collect();

        if alerts.is_empty() {
            self.active.remove(patient_id);
        } else {
            debug!(count = alerts.len(), "alerts raised");
            self.active.insert(patient_id.to_string(), alerts.clone());
        }
        alerts
    }

    /// Every active alert, newest first.
    pub fn get_all(&self) -> Vec<Alert> {
        let mut all: Vec<Alert> = self
            .active
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        all
    }

    pub fn get_for_patient(&self, patient_id: &str) -> Vec<Alert> {
        self.active
            .get(patient_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Mark an alert acknowledged. `false` when no active alert has that id.
    #[instrument(skip(self), fields(alert_id = %alert_id))]
    pub fn acknowledge(&self, alert_id: &str) -> bool {
        for mut entry in self.active.iter_mut() {
            if let Some(alert) = entry.value_mut().iter_mut().find(|a| a.id == alert_id) {
                alert.acknowledged = true;
                info!(patient_id = %alert.patient_id, "alert acknowledged");
                return true;
            }
        }
        false
    }

    /// Drop the patient's active set. Returns whether there was one.
    #[instrument(skip(self), fields(patient_id = %patient_id))]
    pub fn clear(&self, patient_id: &str) -> bool {
        self.active.remove(patient_id).is_some()
    }

    pub fn active_count(&self) -> usize {
        self.active.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn normal() -> VitalsReading {
        VitalsReading {
            heart_rate: 75.0,
            spo2: 98.0,
            systolic: 118.0,
            diastolic: 76.0,
            temperature: 36.8,
            respiratory_rate: 15.0,
        }
    }

    fn engine() -> AlertEngine {
        AlertEngine::new(AlertThresholds::default())
    }

    fn categories(alerts: &[Alert]) -> Vec<(AlertCategory, SeverityTier)> {
        alerts.iter().map(|a| (a.category, a.severity)).collect()
    }

    #[test]
    fn normal_reading_raises_nothing() {
        assert!(engine().evaluate("P001", &normal()).is_empty());
    }

    #[test]
    fn tachycardia_without_bradycardia() {
        let reading = VitalsReading { heart_rate: 135.0, ..normal() };
        let alerts = engine().evaluate("P001", &reading);
        assert_eq!(categories(&alerts), vec![(AlertCategory::Tachycardia, SeverityTier::Critical)]);
        assert!(alerts.iter().all(|a| a.category != AlertCategory::Bradycardia));
    }

    #[test]
    fn hypoxia_is_single_critical() {
        let reading = VitalsReading { spo2: 85.0, ..normal() };
        let alerts = engine().evaluate("P001", &reading);
        assert_eq!(categories(&alerts), vec![(AlertCategory::Hypoxia, SeverityTier::Critical)]);
    }

    #[test]
    fn zero_readings_raise_one_sensor_alert() {
        let reading = VitalsReading { heart_rate: 0.0, spo2: 0.0, ..normal() };
        let alerts = engine().evaluate("P001", &reading);
        assert_eq!(
            categories(&alerts),
            vec![(AlertCategory::SensorDisconnect, SeverityTier::Warning)]
        );
        assert_eq!(alerts[0].vital_type, VitalKind::Sensor);
    }

    #[test]
    fn zero_heart_rate_alone_is_a_sensor_fault() {
        let reading = VitalsReading { heart_rate: 0.0, ..normal() };
        let alerts = engine().evaluate("P001", &reading);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].category, AlertCategory::SensorDisconnect);
    }

    #[test]
    fn multiple_critical_families() {
        let reading = VitalsReading {
            heart_rate: 160.0,
            spo2: 82.0,
            systolic: 195.0,
            diastolic: 110.0,
            temperature: 39.8,
            respiratory_rate: 34.0,
        };
        let alerts = engine().evaluate("P003", &reading);
        assert!(alerts.len() >= 3);
        assert!(alerts.iter().all(|a| a.severity == SeverityTier::Critical));
    }

    #[test_case(VitalsReading { heart_rate: 105.0, ..normal() } => vec![(AlertCategory::Tachycardia, SeverityTier::Warning)] ; "elevated heart rate")]
    #[test_case(VitalsReading { heart_rate: 130.0, ..normal() } => vec![(AlertCategory::Tachycardia, SeverityTier::Critical)] ; "high side is inclusive")]
    #[test_case(VitalsReading { heart_rate: 45.0, ..normal() } => vec![(AlertCategory::Bradycardia, SeverityTier::Warning)] ; "low heart rate")]
    #[test_case(VitalsReading { heart_rate: 38.0, ..normal() } => vec![(AlertCategory::Bradycardia, SeverityTier::Critical)] ; "critical bradycardia")]
    #[test_case(VitalsReading { spo2: 91.0, ..normal() } => vec![(AlertCategory::Hypoxia, SeverityTier::Warning)] ; "low saturation")]
    #[test_case(VitalsReading { systolic: 150.0, ..normal() } => vec![(AlertCategory::HypertensiveCrisis, SeverityTier::Warning)] ; "elevated pressure")]
    #[test_case(VitalsReading { systolic: 185.0, ..normal() } => vec![(AlertCategory::HypertensiveCrisis, SeverityTier::Critical)] ; "hypertensive crisis")]
    #[test_case(VitalsReading { systolic: 88.0, ..normal() } => vec![(AlertCategory::Hypotension, SeverityTier::Warning)] ; "low pressure")]
    #[test_case(VitalsReading { systolic: 75.0, ..normal() } => vec![(AlertCategory::Hypotension, SeverityTier::Critical)] ; "critical hypotension")]
    #[test_case(VitalsReading { temperature: 38.4, ..normal() } => vec![(AlertCategory::Fever, SeverityTier::Warning)] ; "elevated temperature")]
    #[test_case(VitalsReading { temperature: 39.6, ..normal() } => vec![(AlertCategory::Fever, SeverityTier::Critical)] ; "high fever")]
    #[test_case(VitalsReading { temperature: 35.3, ..normal() } => vec![(AlertCategory::Hypothermia, SeverityTier::Warning)] ; "low temperature")]
    #[test_case(VitalsReading { temperature: 34.6, ..normal() } => vec![(AlertCategory::Hypothermia, SeverityTier::Critical)] ; "hypothermia")]
    #[test_case(VitalsReading { respiratory_rate: 26.0, ..normal() } => vec![(AlertCategory::Tachypnea, SeverityTier::Warning)] ; "elevated respiratory rate")]
    #[test_case(VitalsReading { respiratory_rate: 31.0, ..normal() } => vec![(AlertCategory::Tachypnea, SeverityTier::Critical)] ; "critical tachypnea")]
    #[test_case(VitalsReading { respiratory_rate: 9.0, ..normal() } => vec![(AlertCategory::Bradypnea, SeverityTier::Warning)] ; "low respiratory rate")]
    #[test_case(VitalsReading { respiratory_rate: 7.0, ..normal() } => vec![(AlertCategory::Bradypnea, SeverityTier::Critical)] ; "critical bradypnea")]
    #[test_case(VitalsReading { diastolic: 125.0, ..normal() } => Vec::<(AlertCategory, SeverityTier)>::new() ; "diastolic alone never alerts")]
    fn single_family_rules(reading: VitalsReading) -> Vec<(AlertCategory, SeverityTier)> {
        detect(&AlertThresholds::default(), &reading)
            .into_iter()
            .map(|f| (f.category, f.severity))
            .collect()
    }

    #[test]
    fn messages_embed_value_and_threshold() {
        let reading = VitalsReading { systolic: 190.0, diastolic: 105.0, ..normal() };
        let findings = detect(&AlertThresholds::default(), &reading);
        assert_eq!(
            findings[0].message,
            "Hypertensive crisis! BP: 190/105 mmHg (threshold: >180)"
        );
        assert_eq!(findings[0].threshold, 180.0);
        assert_eq!(findings[0].value, 190.0);
    }

    #[test]
    fn ids_are_date_stamped_and_increasing() {
        let engine = engine();
        let reading = VitalsReading { heart_rate: 140.0, spo2: 80.0, ..normal() };
        let alerts = engine.evaluate("P001", &reading);
        let today = Utc::now().format("%Y%m%d").to_string();
        assert_eq!(alerts[0].id, format!("ALT-{}-00001", today));
        assert_eq!(alerts[1].id, format!("ALT-{}-00002", today));
    }

    #[test]
    fn evaluation_replaces_previous_batch() {
        let engine = engine();
        engine.evaluate("P001", &VitalsReading { heart_rate: 140.0, ..normal() });
        engine.evaluate("P001", &VitalsReading { spo2: 85.0, ..normal() });
        let current = engine.get_for_patient("P001");
        assert_eq!(categories(&current), vec![(AlertCategory::Hypoxia, SeverityTier::Critical)]);

        engine.evaluate("P001", &normal());
        assert!(engine.get_for_patient("P001").is_empty());
        assert_eq!(engine.active_count(), 0);
    }

    #[test]
    fn get_all_is_newest_first_across_patients() {
        let engine = engine();
        engine.evaluate("P001", &VitalsReading { heart_rate: 140.0, ..normal() });
        std::thread::sleep(std::time::Duration::from_millis(5));
        engine.evaluate("P002", &VitalsReading { spo2: 85.0, ..normal() });

        let all = engine.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].patient_id, "P002");
        assert!(all.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
    }

    #[test]
    fn acknowledge_is_idempotent() {
        let engine = engine();
        let alerts = engine.evaluate("P001", &VitalsReading { heart_rate: 140.0, ..normal() });
        let id = alerts[0].id.clone();

        assert!(engine.acknowledge(&id));
        assert!(engine.acknowledge(&id));
        assert!(engine.get_for_patient("P001")[0].acknowledged);
        assert!(!engine.acknowledge("ALT-00000000-99999"));
    }

    #[test]
    fn clear_drops_patient_set() {
        let engine = engine();
        engine.evaluate("P001", &VitalsReading { heart_rate: 140.0, ..normal() });
        engine.evaluate("P002", &VitalsReading { heart_rate: 140.0, ..normal() });
        assert!(engine.clear("P001"));
        assert!(!engine.clear("P001"));
        assert!(engine.get_for_patient("P001").is_empty());
        assert_eq!(engine.active_count(), 1);
    }
}
