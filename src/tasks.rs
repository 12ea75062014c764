//! Periodic background work.
//!
//! Three loops, each started only when the process hosts the component:
//! vitals regeneration, alert polling, and summary generation. They share a
//! `watch` shutdown signal and are awaited by `main` once the HTTP server has
//! stopped.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::future::join_all;
use futures::FutureExt;
use serde::Deserialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::core::{AlertEngine, ClinicalHistory, RawVitals, SummaryService, VitalsReading, VitalsSimulator};
use crate::search::SearchClient;
use crate::state::AppState;

// ===== Vitals sources =====

/// One patient's current reading, as the alert poller sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientReading {
    pub patient_id: String,
    pub reading: VitalsReading,
}

/// Where the alert poller gets current vitals from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VitalsSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<Vec<PatientReading>>;
}

/// The in-process simulator.
pub struct LocalVitals {
    simulator: Arc<VitalsSimulator>,
}

impl LocalVitals {
    pub fn new(simulator: Arc<VitalsSimulator>) -> Self {
        Self { simulator }
    }
}

#[async_trait]
impl VitalsSource for LocalVitals {
    async fn fetch(&self) -> anyhow::Result<Vec<PatientReading>> {
        Ok(self
            .simulator
            .all_patients()
            .iter()
            .map(|patient| PatientReading {
                patient_id: patient.id.clone(),
                reading: VitalsReading::from(&patient.vitals),
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct RemotePatient {
    id: String,
    #[serde(default)]
    vitals: RawVitals,
}

/// A vitals service reached over HTTP (`GET {base}/api/patients`).
pub struct RemoteVitals {
    client: reqwest::Client,
    url: String,
}

impl RemoteVitals {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build vitals client")?;
        Ok(Self {
            client,
            url: format!("{}/api/patients", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl VitalsSource for RemoteVitals {
    async fn fetch(&self) -> anyhow::Result<Vec<PatientReading>> {
        let patients: Vec<RemotePatient> = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("GET {}", self.url))?
            .error_for_status()?
            .json()
            .await
            .context("malformed patient list")?;

        Ok(patients
            .into_iter()
            .map(|p| PatientReading {
                patient_id: p.id,
                reading: p.vitals.normalize(),
            })
            .collect())
    }
}

// ===== Loop bodies =====

/// Regenerate every patient and ship the batch to the sink.
pub async fn vitals_tick(simulator: &VitalsSimulator, sink: Option<&SearchClient>) {
    let patients = simulator.regenerate_all();
    debug!(patients = patients.len(), "regenerated vitals");
    if let Some(sink) = sink {
        sink.reconnect_if_due().await;
        sink.bulk_log_vitals(&patients).await;
    }
}

/// Evaluate every patient the source reports. Returns the number of active
/// alerts produced this pass.
pub async fn poll_alerts_once(
    source: &dyn VitalsSource,
    engine: &AlertEngine,
    sink: Option<&SearchClient>,
) -> usize {
    let readings = match source.fetch().await {
        Ok(readings) => readings,
        Err(err) => {
            warn!(error = %err, "could not fetch vitals, skipping alert pass");
            return 0;
        }
    };

    if let Some(sink) = sink {
        sink.reconnect_if_due().await;
    }

    let mut produced = 0;
    for PatientReading { patient_id, reading } in &readings {
        let alerts = engine.evaluate(patient_id, reading);
        produced += alerts.len();
        if let Some(sink) = sink {
            for alert in &alerts {
                sink.log_alert(alert).await;
            }
        }
    }
    debug!(patients = readings.len(), alerts = produced, "alert pass complete");
    produced
}

pub async fn summary_tick(summaries: &SummaryService, history: &dyn ClinicalHistory, roster: &[String]) {
    let count = summaries.run_cycle(history, roster).await;
    info!(patients = count, "summary cycle complete");
}

// ===== Scheduling =====

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Shortest period a loop will run at; a zero period would panic the timer.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Run `tick` every `period` until `shutdown` flips. A slow tick delays the
/// next one instead of overlapping it; a panicking tick is logged and the
/// loop carries on.
pub fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    if period < MIN_PERIOD {
        warn!(task = name, period_ms = period.as_millis() as u64, "period too short, clamping");
    }
    let period = period.max(MIN_PERIOD);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(task = name, period_ms = period.as_millis() as u64, "background task started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(panic) = AssertUnwindSafe(tick()).catch_unwind().await {
                        error!(task = name, panic = panic_message(panic.as_ref()), "background tick panicked");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        info!(task = name, "background task stopped");
    })
}

fn vitals_source(state: &AppState) -> Option<Arc<dyn VitalsSource>> {
    if let Some(simulator) = &state.simulator {
        return Some(Arc::new(LocalVitals::new(Arc::clone(simulator))));
    }
    let settings = &state.settings.alerts;
    match RemoteVitals::new(
        &settings.vitals_service_url,
        Duration::from_secs(settings.request_timeout_secs),
    ) {
        Ok(remote) => Some(Arc::new(remote)),
        Err(err) => {
            error!(error = %err, "alert poller disabled");
            None
        }
    }
}

/// Handles for the running loops.
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn spawn(state: &AppState) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let mut handles = Vec::new();

        if let Some(simulator) = &state.simulator {
            let simulator = Arc::clone(simulator);
            let sink = state.search.clone();
            let period = Duration::from_millis(state.settings.vitals.interval_ms);
            handles.push(spawn_periodic("vitals", period, rx.clone(), move || {
                let simulator = Arc::clone(&simulator);
                let sink = sink.clone();
                async move { vitals_tick(&simulator, sink.as_deref()).await }
            }));
        }

        let alert_loop = state
            .alerts
            .as_ref()
            .and_then(|engine| vitals_source(state).map(|source| (engine, source)));
        if let Some((engine, source)) = alert_loop {
            let engine = Arc::clone(engine);
            let sink = state.search.clone();
            let period = Duration::from_secs(state.settings.alerts.poll_interval_secs);
            handles.push(spawn_periodic("alerts", period, rx.clone(), move || {
                let source = Arc::clone(&source);
                let engine = Arc::clone(&engine);
                let sink = sink.clone();
                async move {
                    poll_alerts_once(source.as_ref(), &engine, sink.as_deref()).await;
                }
            }));
        }

        if let (Some(summaries), Some(history)) = (&state.summaries, &state.history) {
            let summaries = Arc::clone(summaries);
            let history = Arc::clone(history);
            let sink = state.search.clone();
            let roster = state.roster();
            let period = Duration::from_secs(state.settings.summarizer.interval_secs);
            handles.push(spawn_periodic("summaries", period, rx, move || {
                let summaries = Arc::clone(&summaries);
                let history = Arc::clone(&history);
                let sink = sink.clone();
                let roster = roster.clone();
                async move {
                    if let Some(sink) = &sink {
                        sink.reconnect_if_due().await;
                    }
                    summary_tick(&summaries, history.as_ref(), &roster).await
                }
            }));
        }

        info!(tasks = handles.len(), "background tasks running");
        Self { shutdown, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every loop and wait for them to finish their current tick.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for result in join_all(self.handles).await {
            if let Err(err) = result {
                error!(error = %err, "background task ended abnormally");
            }
        }
        info!("background tasks stopped");
    }
}
