//! Clinical summary generation.
//!
//! Input text is assembled deterministically from recent vitals and alerts.
//! A generative backend may rewrite it; without one (or when it fails) an
//! extractive pass keeps the sentences that carry clinical signal.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, instrument, warn};

use crate::config::SummarizerSettings;
use crate::core::ai::TextModel;
use crate::core::history::ClinicalHistory;
use crate::models::events::{AlertEvent, VitalsEvent};
use crate::models::patient::roster_name;
use crate::models::{ClinicalSummary, ModelInfo, SeverityTier};

const KEYWORDS: &[&str] = &["critical", "warning", "alert", "detected", "average", "total"];
const MAX_FALLBACK_SENTENCES: usize = 5;

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "N/A".to_string(), |v| v.to_string())
}

fn mean(values: impl Iterator<Item = i32>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| *v != 0)
        .fold((0i64, 0u32), |(sum, count), v| (sum + i64::from(v), count + 1));
    (count > 0).then(|| sum as f64 / f64::from(count))
}

fn distinct_types(alerts: &[&AlertEvent]) -> String {
    alerts
        .iter()
        .map(|a| a.alert_type.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render monitoring data as prose. `vitals` must be newest first.
pub fn build_input_text(patient_name: &str, vitals: &[VitalsEvent], alerts: &[AlertEvent]) -> String {
    let mut parts = vec![format!("Clinical data for {}:", patient_name)];

    if let Some(latest) = vitals.first() {
        parts.push(format!(
            "Current vitals: Heart rate {} bpm, SpO2 {}%, Blood pressure {}/{} mmHg, Temperature {}°C, Respiratory rate {}/min.",
            or_na(latest.heart_rate),
            or_na(latest.spo2),
            or_na(latest.systolic_bp),
            or_na(latest.diastolic_bp),
            or_na(latest.temperature.map(|t| format!("{:.1}", t))),
            or_na(latest.respiratory_rate),
        ));

        if vitals.len() > 1 {
            let hr = mean(vitals.iter().filter_map(|v| v.heart_rate));
            let spo2 = mean(vitals.iter().filter_map(|v| v.spo2));
            if let (Some(hr), Some(spo2)) = (hr, spo2) {
                parts.push(format!(
                    "Average over monitoring period: Heart rate {:.0} bpm, SpO2 {:.0}%.",
                    hr, spo2
                ));
            }
        }
    }

    if alerts.is_empty() {
        parts.push("No alerts detected during monitoring period.".to_string());
    } else {
        let critical: Vec<_> = alerts
            .iter()
            .filter(|a| a.severity == SeverityTier::Critical)
            .collect();
        let warning: Vec<_> = alerts
            .iter()
            .filter(|a| a.severity == SeverityTier::Warning)
            .collect();

        if !critical.is_empty() {
            parts.push(format!("Critical alerts detected: {}.", distinct_types(&critical)));
        }
        if !warning.is_empty() {
            parts.push(format!("Warning alerts: {}.", distinct_types(&warning)));
        }
        parts.push(format!(
            "Total alerts in monitoring period: {} ({} critical, {} warnings).",
            alerts.len(),
            critical.len(),
            warning.len()
        ));
    }

    parts.join(" ")
}

/// Extractive summary: the first sentence plus every sentence mentioning a
/// clinical keyword, at most five. Same input, same output.
pub fn fallback_summarize(text: &str) -> String {
    let mut sentences = text.split(". ");
    let mut kept: Vec<&str> = sentences.next().into_iter().collect();

    kept.extend(sentences.filter(|sentence| {
        let lower = sentence.to_lowercase();
        KEYWORDS.iter().any(|kw| lower.contains(kw))
    }));
    kept.truncate(MAX_FALLBACK_SENTENCES);

    let mut summary = kept.join(". ");
    if !summary.ends_with('.') {
        summary.push('.');
    }
    summary
}

fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return text.to_string();
    }
    let mut truncated = words[..max_words].join(" ");
    if !truncated.ends_with('.') {
        truncated.push('.');
    }
    truncated
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Name for a summary: latest vitals document, then the roster, then a placeholder.
pub fn resolve_patient_name(patient_id: &str, vitals: &[VitalsEvent]) -> String {
    vitals
        .first()
        .and_then(|v| v.patient_name.clone())
        .filter(|name| !name.is_empty())
        .or_else(|| roster_name(patient_id).map(str::to_string))
        .unwrap_or_else(|| format!("Patient {}", patient_id))
}

pub struct SummaryService {
    settings: SummarizerSettings,
    model: Option<Arc<dyn TextModel>>,
    cache: DashMap<String, ClinicalSummary>,
}

impl SummaryService {
    pub fn new(settings: SummarizerSettings, model: Option<Arc<dyn TextModel>>) -> Self {
        Self {
            settings,
            model,
            cache: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &SummarizerSettings {
        &self.settings
    }

    pub fn model_loaded(&self) -> bool {
        self.model.is_some()
    }

    async fn summarize(&self, input: &str) -> String {
        let max = self.settings.max_output_length;
        if let Some(model) = &self.model {
            match model
                .summarize(input, self.settings.min_output_length, max)
                .await
            {
                Ok(text) => return truncate_words(&text, max),
                Err(err) => warn!(error = %err, "model backend failed, using extractive summary"),
            }
        }
        truncate_words(&fallback_summarize(input), max)
    }

    /// Summarize the given history and cache the result under `patient_id`.
    #[instrument(skip(self, vitals, alerts), fields(patient_id = %patient_id))]
    pub async fn generate(
        &self,
        patient_id: &str,
        patient_name: &str,
        vitals: &[VitalsEvent],
        alerts: &[AlertEvent],
    ) -> ClinicalSummary {
        let started = Instant::now();
        let vitals = &vitals[..vitals.len().min(self.settings.max_vitals)];
        let alerts = &alerts[..alerts.len().min(self.settings.max_alerts)];

        let input = build_input_text(patient_name, vitals, alerts);
        let text = self
            .summarize(truncate_chars(&input, self.settings.max_input_length))
            .await;

        let summary = ClinicalSummary {
            patient_id: patient_id.to_string(),
            patient_name: patient_name.to_string(),
            text,
            vitals_count: vitals.len(),
            alerts_count: alerts.len(),
            processing_time_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
            model_name: self.settings.model_name.clone(),
            model_version: self.settings.model_version.clone(),
        };

        self.remember(summary.clone());
        summary
    }

    /// Fetch lookback history, summarize it and hand the result back to the store.
    pub async fn generate_from(&self, history: &dyn ClinicalHistory, patient_id: &str) -> ClinicalSummary {
        let minutes = self.settings.lookback_minutes;
        let vitals = history
            .recent_vitals(patient_id, minutes, self.settings.max_vitals)
            .await;
        let alerts = history
            .recent_alerts(patient_id, minutes, self.settings.max_alerts)
            .await;
        let name = resolve_patient_name(patient_id, &vitals);

        let summary = self.generate(patient_id, &name, &vitals, &alerts).await;
        history.save_summary(&summary).await;
        summary
    }

    /// One pass over every known patient. Falls back to the roster when the
    /// store knows of none.
    pub async fn run_cycle(&self, history: &dyn ClinicalHistory, roster: &[String]) -> usize {
        let mut patients = history.patient_ids().await;
        if patients.is_empty() {
            patients = roster.to_vec();
        }

        info!(patients = patients.len(), "starting summary generation cycle");
        for patient_id in &patients {
            self.generate_from(history, patient_id).await;
        }
        patients.len()
    }

    /// Cache, then the store's latest summary, then a fresh generation.
    pub async fn lookup(&self, history: &dyn ClinicalHistory, patient_id: &str) -> ClinicalSummary {
        if let Some(cached) = self.get(patient_id) {
            return cached;
        }
        if let Some(stored) = history.latest_summary(patient_id).await {
            return stored;
        }
        self.generate_from(history, patient_id).await
    }

    pub fn get(&self, patient_id: &str) -> Option<ClinicalSummary> {
        self.cache.get(patient_id).map(|entry| entry.value().clone())
    }

    /// Cached summaries, or the store's latest for each roster patient when the cache is cold.
    pub async fn all(&self, history: &dyn ClinicalHistory, roster: &[String]) -> Vec<ClinicalSummary> {
        let mut summaries: Vec<_> = self.cache.iter().map(|e| e.value().clone()).collect();
        if summaries.is_empty() {
            for patient_id in roster {
                if let Some(stored) = history.latest_summary(patient_id).await {
                    summaries.push(stored);
                }
            }
        }
        summaries.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
        summaries
    }

    fn remember(&self, summary: ClinicalSummary) {
        let patient_id = summary.patient_id.clone();
        self.cache.insert(patient_id.clone(), summary);

        while self.cache.len() > self.settings.cache_capacity.max(1) {
            let oldest = self
                .cache
                .iter()
                .filter(|e| e.key() != &patient_id)
                .min_by_key(|e| e.value().timestamp)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.cache.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub fn model_info(&self) -> ModelInfo {
        let full_name = self.settings.model_name.clone();
        let name = full_name.rsplit('/').next().unwrap_or(&full_name).to_string();
        ModelInfo {
            name,
            version: self.settings.model_version.clone(),
            full_name,
            loaded: self.model_loaded(),
            max_input_length: self.settings.max_input_length,
            max_output_length: self.settings.max_output_length,
            last_updated: Utc::now().format("%Y-%m-%d").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{DateTime, Duration};

    struct FailingModel;

    #[async_trait]
    impl TextModel for FailingModel {
        async fn summarize(&self, _: &str, _: usize, _: usize) -> anyhow::Result<String> {
            Err(anyhow!("backend down"))
        }
    }

    struct EchoModel;

    #[async_trait]
    impl TextModel for EchoModel {
        async fn summarize(&self, text: &str, _: usize, _: usize) -> anyhow::Result<String> {
            Ok(format!("Model says: {}", text))
        }
    }

    fn vitals_at(ts: DateTime<Utc>, hr: i32, spo2: i32) -> VitalsEvent {
        VitalsEvent {
            timestamp: ts,
            patient_id: "P001".into(),
            patient_name: Some("John Smith".into()),
            bed_number: Some("ICU-101".into()),
            heart_rate: Some(hr),
            spo2: Some(spo2),
            systolic_bp: Some(120),
            diastolic_bp: Some(80),
            temperature: Some(37.0),
            respiratory_rate: Some(16),
            alert_severity: Some(SeverityTier::Normal),
            service: "vitals-generator".into(),
        }
    }

    fn alert(kind: &str, severity: SeverityTier) -> AlertEvent {
        AlertEvent {
            timestamp: Utc::now(),
            alert_id: "ALT-20240101-00001".into(),
            patient_id: "P001".into(),
            alert_type: kind.into(),
            message: String::new(),
            severity,
            vital_type: "heart_rate".into(),
            vital_value: 0.0,
            threshold: 0.0,
            acknowledged: false,
            service: "alert-engine".into(),
        }
    }

    #[test]
    fn input_text_covers_vitals_averages_and_alerts() {
        let now = Utc::now();
        let vitals = vec![
            vitals_at(now, 80, 97),
            vitals_at(now - Duration::minutes(1), 90, 95),
        ];
        let alerts = vec![
            alert("Tachycardia Alert", SeverityTier::Critical),
            alert("Tachycardia Alert", SeverityTier::Critical),
            alert("Fever Alert", SeverityTier::Warning),
        ];

        let text = build_input_text("John Smith", &vitals, &alerts);
        assert_eq!(
            text,
            "Clinical data for John Smith: \
             Current vitals: Heart rate 80 bpm, SpO2 97%, Blood pressure 120/80 mmHg, Temperature 37.0°C, Respiratory rate 16/min. \
             Average over monitoring period: Heart rate 85 bpm, SpO2 96%. \
             Critical alerts detected: Tachycardia Alert. \
             Warning alerts: Fever Alert. \
             Total alerts in monitoring period: 3 (2 critical, 1 warnings)."
        );
    }

    #[test]
    fn single_sample_has_no_average() {
        let text = build_input_text("Jane", &[vitals_at(Utc::now(), 70, 98)], &[]);
        assert!(!text.contains("Average"));
        assert!(text.ends_with("No alerts detected during monitoring period."));
    }

    #[test]
    fn missing_fields_render_as_na() {
        let mut sparse = vitals_at(Utc::now(), 70, 98);
        sparse.temperature = None;
        let text = build_input_text("Jane", &[sparse], &[]);
        assert!(text.contains("Temperature N/A°C"));
    }

    #[test]
    fn fallback_keeps_first_and_keyword_sentences() {
        let text = "Clinical data for X: Current vitals fine. Nothing here. \
                    Average over period is fine. Critical alerts detected: A. Total alerts: 1.";
        let summary = fallback_summarize(text);
        assert_eq!(
            summary,
            "Clinical data for X: Current vitals fine. Average over period is fine. \
             Critical alerts detected: A. Total alerts: 1."
        );
    }

    #[test]
    fn fallback_is_deterministic_and_capped() {
        let text = "First. critical one. critical two. critical three. critical four. critical five. critical six";
        let first = fallback_summarize(text);
        assert_eq!(first, fallback_summarize(text));
        assert_eq!(first.split(". ").count(), 5);
        assert!(first.ends_with('.'));
    }

    #[test]
    fn word_truncation() {
        assert_eq!(truncate_words("one two three", 5), "one two three");
        assert_eq!(truncate_words("one two three four", 2), "one two.");
    }

    #[test]
    fn char_truncation_respects_boundaries() {
        assert_eq!(truncate_chars("37.0°C fever", 5), "37.0°");
        assert_eq!(truncate_chars("short", 50), "short");
    }

    #[test]
    fn name_resolution_order() {
        let vitals = vec![vitals_at(Utc::now(), 70, 98)];
        assert_eq!(resolve_patient_name("P001", &vitals), "John Smith");
        assert_eq!(resolve_patient_name("P003", &[]), "Michael Brown");
        assert_eq!(resolve_patient_name("P777", &[]), "Patient P777");
    }

    #[tokio::test]
    async fn failing_backend_falls_back_to_extractive() {
        let service = SummaryService::new(SummarizerSettings::default(), Some(Arc::new(FailingModel)));
        let vitals = vec![vitals_at(Utc::now(), 80, 97)];
        let summary = service.generate("P001", "John Smith", &vitals, &[]).await;

        let expected = fallback_summarize(&build_input_text("John Smith", &vitals, &[]));
        assert_eq!(summary.text, expected);
        assert_eq!(summary.vitals_count, 1);
        assert!(service.get("P001").is_some());
    }

    #[tokio::test]
    async fn backend_output_is_used_when_available() {
        let service = SummaryService::new(SummarizerSettings::default(), Some(Arc::new(EchoModel)));
        let summary = service.generate("P001", "John Smith", &[], &[]).await;
        assert!(summary.text.starts_with("Model says:"));
        assert!(service.model_info().loaded);
    }

    #[tokio::test]
    async fn caps_are_applied_to_inputs() {
        let settings = SummarizerSettings {
            max_vitals: 2,
            max_alerts: 1,
            ..SummarizerSettings::default()
        };
        let service = SummaryService::new(settings, None);
        let now = Utc::now();
        let vitals: Vec<_> = (0..5).map(|i| vitals_at(now - Duration::minutes(i), 70, 98)).collect();
        let alerts = vec![
            alert("Fever Alert", SeverityTier::Warning),
            alert("Hypoxia Alert", SeverityTier::Critical),
        ];

        let summary = service.generate("P001", "John Smith", &vitals, &alerts).await;
        assert_eq!(summary.vitals_count, 2);
        assert_eq!(summary.alerts_count, 1);
    }

    #[tokio::test]
    async fn cache_evicts_oldest_beyond_capacity() {
        let settings = SummarizerSettings {
            cache_capacity: 2,
            ..SummarizerSettings::default()
        };
        let service = SummaryService::new(settings, None);
        for id in ["P001", "P002", "P003"] {
            service.generate(id, "X", &[], &[]).await;
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        assert_eq!(service.cached_count(), 2);
        assert!(service.get("P001").is_none());
        assert!(service.get("P003").is_some());
    }

    #[test]
    fn model_info_strips_namespace() {
        let service = SummaryService::new(SummarizerSettings::default(), None);
        let info = service.model_info();
        assert_eq!(info.name, "distilbart-cnn-12-6");
        assert_eq!(info.full_name, "sshleifer/distilbart-cnn-12-6");
        assert!(!info.loaded);
    }
}
