//! Elasticsearch event sink.
//!
//! Write-only from the point of view of the monitoring loops: every failure is
//! logged and dropped. The summarizer also reads recent history back through
//! the [`ClinicalHistory`] implementation at the bottom of this file.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};

use crate::config::SearchSettings;
use crate::core::history::ClinicalHistory;
use crate::models::events::{AlertEvent, SummaryEvent, VitalsEvent};
use crate::models::{Alert, ClinicalSummary, PatientProfile};

const PATIENT_LOOKBACK_HOURS: i64 = 24;
const PATIENT_BUCKETS: usize = 1000;

/// Minimum gap between background reconnection attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    hits: Hits<T>,
}

#[derive(Debug, Deserialize)]
struct Hits<T> {
    hits: Vec<Hit<T>>,
}

#[derive(Debug, Deserialize)]
struct Hit<T> {
    #[serde(rename = "_source")]
    source: T,
}

/// Daily index name, e.g. `medical-vitals-2024.05.01`.
pub fn daily_index(prefix: &str, at: DateTime<Utc>) -> String {
    format!("{}-{}", prefix, at.format("%Y.%m.%d"))
}

fn template(pattern: &str, properties: Value) -> Value {
    json!({
        "index_patterns": [pattern],
        "template": {
            "settings": { "number_of_shards": 1, "number_of_replicas": 0 },
            "mappings": { "properties": properties }
        }
    })
}

pub struct SearchClient {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
    vitals_index: String,
    alerts_index: String,
    summaries_index: String,
    service: String,
    connected: AtomicBool,
    last_attempt: Mutex<Option<Instant>>,
}

impl SearchClient {
    pub fn new(settings: &SearchSettings, service: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build search client")?;

        let credentials = (!settings.password.is_empty())
            .then(|| (settings.username.clone(), settings.password.clone()));

        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            credentials,
            vitals_index: settings.vitals_index.clone(),
            alerts_index: settings.alerts_index.clone(),
            summaries_index: settings.summaries_index.clone(),
            service: service.to_string(),
            connected: AtomicBool::new(false),
            last_attempt: Mutex::new(None),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/{}", self.base_url, path.trim_start_matches('/')));
        match &self.credentials {
            Some((user, password)) => builder.basic_auth(user, Some(password)),
            None => builder,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Liveness check. Refreshes the connected flag as a side effect.
    pub async fn ping(&self) -> bool {
        let ok = match self.request(reqwest::Method::GET, "/").send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                debug!(error = %err, "search ping failed");
                false
            }
        };
        self.connected.store(ok, Ordering::Relaxed);
        ok
    }

    /// Ping and, on success, install the index templates.
    pub async fn connect(&self) -> bool {
        let ok = self.refresh().await;
        if !ok {
            warn!(url = %self.base_url, "search backend unreachable, events will not be persisted");
        }
        ok
    }

    /// Live ping. A backend that comes up after startup gets its index
    /// templates on the first successful refresh.
    pub async fn refresh(&self) -> bool {
        let was_connected = self.is_connected();
        *self.last_attempt.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());

        let ok = self.ping().await;
        if ok && !was_connected {
            info!(url = %self.base_url, "connected to search backend");
            self.setup_templates().await;
        }
        ok
    }

    /// Refresh while disconnected, at most once per [`RECONNECT_BACKOFF`].
    pub async fn reconnect_if_due(&self) -> bool {
        if self.is_connected() {
            return true;
        }
        let due = self
            .last_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map_or(true, |at| at.elapsed() >= RECONNECT_BACKOFF);
        if !due {
            return false;
        }
        self.refresh().await
    }

    async fn setup_templates(&self) {
        let templates = [
            (
                &self.vitals_index,
                json!({
                    "@timestamp": { "type": "date" },
                    "patient_id": { "type": "keyword" },
                    "patient_name": { "type": "text" },
                    "bed_number": { "type": "keyword" },
                    "heart_rate": { "type": "integer" },
                    "spo2": { "type": "integer" },
                    "systolic_bp": { "type": "integer" },
                    "diastolic_bp": { "type": "integer" },
                    "temperature": { "type": "float" },
                    "respiratory_rate": { "type": "integer" },
                    "alert_severity": { "type": "keyword" },
                    "service": { "type": "keyword" }
                }),
            ),
            (
                &self.alerts_index,
                json!({
                    "@timestamp": { "type": "date" },
                    "alert_id": { "type": "keyword" },
                    "patient_id": { "type": "keyword" },
                    "alert_type": { "type": "keyword" },
                    "message": { "type": "text" },
                    "severity": { "type": "keyword" },
                    "vital_type": { "type": "keyword" },
                    "vital_value": { "type": "float" },
                    "threshold": { "type": "float" },
                    "acknowledged": { "type": "boolean" },
                    "service": { "type": "keyword" }
                }),
            ),
            (
                &self.summaries_index,
                json!({
                    "@timestamp": { "type": "date" },
                    "patient_id": { "type": "keyword" },
                    "patient_name": { "type": "text" },
                    "summary_text": { "type": "text" },
                    "vitals_count": { "type": "integer" },
                    "alerts_count": { "type": "integer" },
                    "model_name": { "type": "keyword" },
                    "model_version": { "type": "keyword" },
                    "processing_time_ms": { "type": "integer" },
                    "service": { "type": "keyword" }
                }),
            ),
        ];

        for (prefix, properties) in templates {
            let name = format!("{}-template", prefix);
            let body = template(&format!("{}-*", prefix), properties);
            let result = self
                .request(reqwest::Method::PUT, &format!("_index_template/{}", name))
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            match result {
                Ok(_) => info!(template = %name, "index template installed"),
                Err(err) => warn!(template = %name, error = %err, "failed to install index template"),
            }
        }
    }

    async fn index_document<T: serde::Serialize>(&self, prefix: &str, doc: &T) -> Result<()> {
        let index = daily_index(prefix, Utc::now());
        self.request(reqwest::Method::POST, &format!("{}/_doc", index))
            .json(doc)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// One `_bulk` request for a whole evaluation cycle.
    #[instrument(skip(self, patients), fields(count = patients.len()))]
    pub async fn bulk_log_vitals(&self, patients: &[Arc<PatientProfile>]) {
        if !self.is_connected() || patients.is_empty() {
            return;
        }

        let index = daily_index(&self.vitals_index, Utc::now());
        let mut body = String::new();
        for patient in patients {
            let doc = VitalsEvent::from_patient(patient, &self.service);
            let source = match serde_json::to_string(&doc) {
                Ok(source) => source,
                Err(err) => {
                    error!(patient_id = %patient.id, error = %err, "failed to encode vitals document");
                    continue;
                }
            };
            body.push_str(&json!({ "index": { "_index": index } }).to_string());
            body.push('\n');
            body.push_str(&source);
            body.push('\n');
        }

        let result = self
            .request(reqwest::Method::POST, "_bulk")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .and_then(|r| r.error_for_status());
        if let Err(err) = result {
            error!(error = %err, "failed to bulk log vitals");
        }
    }

    pub async fn log_alert(&self, alert: &Alert) {
        if !self.is_connected() {
            return;
        }
        let doc = AlertEvent::from_alert(alert, &self.service);
        if let Err(err) = self.index_document(&self.alerts_index, &doc).await {
            error!(alert_id = %alert.id, error = %err, "failed to log alert");
        }
    }

    pub async fn save_summary(&self, summary: &ClinicalSummary) {
        if !self.is_connected() {
            return;
        }
        let doc = SummaryEvent::from_summary(summary, &self.service);
        match self.index_document(&self.summaries_index, &doc).await {
            Ok(()) => info!(patient_id = %summary.patient_id, "saved summary"),
            Err(err) => error!(patient_id = %summary.patient_id, error = %err, "failed to save summary"),
        }
    }

    async fn search_raw(&self, prefix: &str, body: &Value) -> Result<Value> {
        let response = self
            .request(reqwest::Method::POST, &format!("{}-*/_search", prefix))
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response)
    }

    async fn search<T: DeserializeOwned>(&self, prefix: &str, body: Value) -> Result<Vec<T>> {
        let raw = self.search_raw(prefix, &body).await?;
        let response: SearchResponse<T> =
            serde_json::from_value(raw).context("unexpected search response shape")?;
        Ok(response.hits.hits.into_iter().map(|hit| hit.source).collect())
    }

    fn recent_query(patient_id: &str, minutes: u32, size: usize) -> Value {
        let since = Utc::now() - chrono::Duration::minutes(i64::from(minutes));
        json!({
            "query": {
                "bool": {
                    "must": [
                        { "term": { "patient_id": patient_id } },
                        { "range": { "@timestamp": { "gte": since.to_rfc3339() } } }
                    ]
                }
            },
            "size": size,
            "sort": [{ "@timestamp": "desc" }]
        })
    }

    pub async fn get_patient_vitals(&self, patient_id: &str, minutes: u32, size: usize) -> Vec<VitalsEvent> {
        if !self.is_connected() {
            return Vec::new();
        }
        self.search(&self.vitals_index, Self::recent_query(patient_id, minutes, size))
            .await
            .unwrap_or_else(|err| {
                error!(patient_id = %patient_id, error = %err, "failed to get patient vitals");
                Vec::new()
            })
    }

    pub async fn get_patient_alerts(&self, patient_id: &str, minutes: u32, size: usize) -> Vec<AlertEvent> {
        if !self.is_connected() {
            return Vec::new();
        }
        self.search(&self.alerts_index, Self::recent_query(patient_id, minutes, size))
            .await
            .unwrap_or_else(|err| {
                error!(patient_id = %patient_id, error = %err, "failed to get patient alerts");
                Vec::new()
            })
    }

    /// Distinct patient ids seen in the vitals indices over the last day.
    pub async fn get_all_patients(&self) -> Vec<String> {
        if !self.is_connected() {
            return Vec::new();
        }

        let since = Utc::now() - chrono::Duration::hours(PATIENT_LOOKBACK_HOURS);
        let body = json!({
            "query": { "range": { "@timestamp": { "gte": since.to_rfc3339() } } },
            "aggs": {
                "unique_patients": {
                    "terms": { "field": "patient_id", "size": PATIENT_BUCKETS }
                }
            },
            "size": 0
        });

        match self.search_raw(&self.vitals_index, &body).await {
            Ok(response) => response["aggregations"]["unique_patients"]["buckets"]
                .as_array()
                .map(|buckets| {
                    buckets
                        .iter()
                        .filter_map(|b| b["key"].as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            Err(err) => {
                error!(error = %err, "failed to get patient list");
                Vec::new()
            }
        }
    }

    pub async fn get_latest_summary(&self, patient_id: &str) -> Option<ClinicalSummary> {
        if !self.is_connected() {
            return None;
        }
        let body = json!({
            "query": { "bool": { "must": [{ "term": { "patient_id": patient_id } }] } },
            "size": 1,
            "sort": [{ "@timestamp": "desc" }]
        });
        match self.search::<SummaryEvent>(&self.summaries_index, body).await {
            Ok(mut hits) if !hits.is_empty() => Some(hits.remove(0).into_summary()),
            Ok(_) => None,
            Err(err) => {
                error!(patient_id = %patient_id, error = %err, "failed to get latest summary");
                None
            }
        }
    }
}

#[async_trait]
impl ClinicalHistory for SearchClient {
    async fn recent_vitals(&self, patient_id: &str, minutes: u32, limit: usize) -> Vec<VitalsEvent> {
        self.get_patient_vitals(patient_id, minutes, limit).await
    }

    async fn recent_alerts(&self, patient_id: &str, minutes: u32, limit: usize) -> Vec<AlertEvent> {
        self.get_patient_alerts(patient_id, minutes, limit).await
    }

    async fn patient_ids(&self) -> Vec<String> {
        self.get_all_patients().await
    }

    async fn latest_summary(&self, patient_id: &str) -> Option<ClinicalSummary> {
        self.get_latest_summary(patient_id).await
    }

    async fn save_summary(&self, summary: &ClinicalSummary) {
        SearchClient::save_summary(self, summary).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use wiremock::matchers::{body_string_contains, header, method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(url: &str) -> SearchSettings {
        SearchSettings {
            url: url.to_string(),
            ..SearchSettings::default()
        }
    }

    async fn connected(server: &MockServer) -> SearchClient {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tagline": "You Know, for Search" })))
            .mount(server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/_index_template/.+"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": true })))
            .expect(3)
            .mount(server)
            .await;

        let client = SearchClient::new(&settings(&server.uri()), "summarizer-service").unwrap();
        assert!(client.connect().await);
        client
    }

    #[test]
    fn daily_index_naming() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 23, 59, 0).unwrap();
        assert_eq!(daily_index("medical-vitals", at), "medical-vitals-2024.05.01");
    }

    #[tokio::test]
    async fn unreachable_backend_is_disconnected() {
        let client = SearchClient::new(&settings("http://127.0.0.1:1"), "vitals-generator").unwrap();
        assert!(!client.connect().await);
        assert!(!client.is_connected());
        // Reads degrade to empty results.
        assert!(client.get_all_patients().await.is_empty());
        assert!(client.get_latest_summary("P001").await.is_none());
    }

    #[tokio::test]
    async fn late_backend_is_picked_up_on_refresh() {
        let server = MockServer::start().await;
        let client = SearchClient::new(&settings(&server.uri()), "vitals-generator").unwrap();
        assert!(!client.is_connected());

        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path_regex(r"^/_index_template/.+"))
            .respond_with(ResponseTemplate::new(200))
            .expect(3)
            .mount(&server)
            .await;

        assert!(client.reconnect_if_due().await);
        assert!(client.is_connected());
        // Already connected: no second ping, no second template install.
        assert!(client.reconnect_if_due().await);
    }

    #[tokio::test]
    async fn reconnect_attempts_are_throttled() {
        let client = SearchClient::new(&settings("http://127.0.0.1:1"), "alert-engine").unwrap();
        assert!(!client.connect().await);
        // The failed connect counts as the latest attempt.
        assert!(!client.reconnect_if_due().await);
        assert!(client.last_attempt.lock().unwrap().is_some());
    }

    #[tokio::test]
    async fn bulk_write_is_ndjson() {
        let server = MockServer::start().await;
        let client = connected(&server).await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("content-type", "application/x-ndjson"))
            .and(body_string_contains("\"patient_id\":\"P001\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "errors": false })))
            .expect(1)
            .mount(&server)
            .await;

        let simulator = crate::core::VitalsSimulator::new(Some(1));
        client.bulk_log_vitals(&simulator.all_patients()).await;
    }

    #[tokio::test]
    async fn vitals_query_parses_hits() {
        let server = MockServer::start().await;
        let client = connected(&server).await;
        Mock::given(method("POST"))
            .and(path("/medical-vitals-*/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": { "hits": [
                    { "_source": { "@timestamp": "2024-05-01T10:01:00Z", "patient_id": "P001", "heart_rate": 91, "patient_name": "John Smith" } },
                    { "_source": { "@timestamp": "2024-05-01T10:00:00Z", "patient_id": "P001", "heart_rate": 88 } }
                ] }
            })))
            .mount(&server)
            .await;

        let vitals = client.recent_vitals("P001", 30, 1000).await;
        assert_eq!(vitals.len(), 2);
        assert_eq!(vitals[0].heart_rate, Some(91));
        assert_eq!(vitals[0].patient_name.as_deref(), Some("John Smith"));
    }

    #[tokio::test]
    async fn patient_ids_come_from_aggregation() {
        let server = MockServer::start().await;
        let client = connected(&server).await;
        Mock::given(method("POST"))
            .and(path("/medical-vitals-*/_search"))
            .and(body_string_contains("unique_patients"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": { "hits": [] },
                "aggregations": { "unique_patients": { "buckets": [
                    { "key": "P001", "doc_count": 10 },
                    { "key": "P002", "doc_count": 4 }
                ] } }
            })))
            .mount(&server)
            .await;

        assert_eq!(client.patient_ids().await, vec!["P001", "P002"]);
    }

    #[tokio::test]
    async fn search_errors_degrade_to_empty() {
        let server = MockServer::start().await;
        let client = connected(&server).await;
        Mock::given(method("POST"))
            .and(path("/medical-alerts-*/_search"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        assert!(client.recent_alerts("P001", 30, 100).await.is_empty());
    }

    #[tokio::test]
    async fn latest_summary_round_trips_document_shape() {
        let server = MockServer::start().await;
        let client = connected(&server).await;
        Mock::given(method("POST"))
            .and(path("/medical-summaries-*/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "hits": { "hits": [ { "_source": {
                    "@timestamp": "2024-05-01T10:00:00Z",
                    "patient_id": "P004",
                    "patient_name": "Emily Davis",
                    "summary_text": "Clinical data for Emily Davis.",
                    "vitals_count": 30,
                    "alerts_count": 0,
                    "model_name": "distilbart",
                    "model_version": "1.0.0",
                    "processing_time_ms": 12,
                    "service": "summarizer-service"
                } } ] }
            })))
            .mount(&server)
            .await;

        let summary = client.latest_summary("P004").await.unwrap();
        assert_eq!(summary.patient_name, "Emily Davis");
        assert_eq!(summary.text, "Clinical data for Emily Davis.");
        assert_eq!(summary.vitals_count, 30);
    }
}
