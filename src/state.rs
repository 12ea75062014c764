//! Shared application state.
//!
//! Every component is built once at startup and handed to handlers through
//! `web::Data<AppState>`. Components the selected service does not host stay
//! `None`; their accessors answer with `ServiceError::Unavailable`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::auth::TokenIssuer;
use crate::config::{ServiceKind, Settings};
use crate::core::ai::{HttpTextModel, TextModel};
use crate::core::{AlertEngine, ClinicalHistory, LocalHistory, SummaryService, VitalsSimulator};
use crate::db::{AccountStore, Database};
use crate::error::ServiceError;
use crate::models::patient::DEFAULT_ROSTER;
use crate::search::SearchClient;
use crate::websocket::SubscriberRegistry;

pub struct AppState {
    pub service: ServiceKind,
    pub settings: Settings,
    pub simulator: Option<Arc<VitalsSimulator>>,
    pub alerts: Option<Arc<AlertEngine>>,
    pub summaries: Option<Arc<SummaryService>>,
    pub history: Option<Arc<dyn ClinicalHistory>>,
    pub accounts: Option<AccountStore>,
    pub tokens: TokenIssuer,
    pub search: Option<Arc<SearchClient>>,
    pub subscribers: Arc<SubscriberRegistry>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Build the in-process components for `service`. Nothing here touches
    /// the network; the search sink starts out disconnected and the account
    /// store is attached separately.
    pub fn new(service: ServiceKind, settings: Settings) -> Self {
        let simulator = service
            .runs_vitals()
            .then(|| Arc::new(VitalsSimulator::new(settings.vitals.seed)));
        let alerts = service
            .runs_alerts()
            .then(|| Arc::new(AlertEngine::new(settings.alerts.thresholds.clone())));
        let summaries = service
            .runs_summarizer()
            .then(|| Arc::new(SummaryService::new(settings.summarizer.clone(), text_model(&settings))));

        let search = if service == ServiceKind::Accounts {
            None
        } else {
            match SearchClient::new(&settings.search, service.name()) {
                Ok(client) => Some(Arc::new(client)),
                Err(err) => {
                    warn!(error = %err, "search sink disabled");
                    None
                }
            }
        };

        let tokens = TokenIssuer::new(
            &settings.accounts.jwt_secret,
            settings.accounts.jwt_expire_minutes,
        );

        let mut state = Self {
            service,
            settings,
            simulator,
            alerts,
            summaries,
            history: None,
            accounts: None,
            tokens,
            search,
            subscribers: Arc::new(SubscriberRegistry::new()),
            started_at: Utc::now(),
        };
        state.history = state.wire_history();
        state
    }

    /// [`AppState::new`] plus the collaborators that need I/O: the search
    /// sink handshake and the account database. Failures degrade the
    /// matching component and are never fatal.
    pub async fn build(service: ServiceKind, settings: Settings) -> Self {
        let mut state = Self::new(service, settings);

        if let Some(search) = &state.search {
            search.connect().await;
        }

        if service.runs_accounts() {
            match Database::connect(&state.settings.accounts).await {
                Ok(db) => {
                    let store = AccountStore::new(db);
                    let accounts = &state.settings.accounts;
                    if let Err(err) = store
                        .ensure_default_admin(&accounts.default_admin_username, &accounts.default_admin_password)
                        .await
                    {
                        warn!(error = %err, "could not create default admin");
                    }
                    state.accounts = Some(store);
                }
                Err(err) => warn!(error = %err, "account database unavailable, account routes disabled"),
            }
        }

        state
    }

    pub fn with_accounts(mut self, store: AccountStore) -> Self {
        self.accounts = Some(store);
        self
    }

    fn wire_history(&self) -> Option<Arc<dyn ClinicalHistory>> {
        if !self.service.runs_summarizer() {
            return None;
        }
        match (&self.simulator, &self.alerts) {
            (Some(simulator), Some(alerts)) => Some(Arc::new(LocalHistory::new(
                Arc::clone(simulator),
                Arc::clone(alerts),
                self.search.clone(),
            ))),
            _ => self
                .search
                .clone()
                .map(|search| search as Arc<dyn ClinicalHistory>),
        }
    }

    // ===== Component access =====

    pub fn simulator(&self) -> Result<&Arc<VitalsSimulator>, ServiceError> {
        self.simulator.as_ref().ok_or(ServiceError::Unavailable("vitals simulator"))
    }

    pub fn alerts(&self) -> Result<&Arc<AlertEngine>, ServiceError> {
        self.alerts.as_ref().ok_or(ServiceError::Unavailable("alert engine"))
    }

    pub fn summaries(&self) -> Result<(&Arc<SummaryService>, &Arc<dyn ClinicalHistory>), ServiceError> {
        match (&self.summaries, &self.history) {
            (Some(summaries), Some(history)) => Ok((summaries, history)),
            _ => Err(ServiceError::Unavailable("summarizer")),
        }
    }

    pub fn accounts(&self) -> Result<&AccountStore, ServiceError> {
        self.accounts.as_ref().ok_or(ServiceError::Unavailable("account database"))
    }

    /// Patients known to this process: the live simulator, else the fixed roster.
    pub fn roster(&self) -> Vec<String> {
        match &self.simulator {
            Some(simulator) => simulator.patient_ids(),
            None => DEFAULT_ROSTER.iter().map(|e| e.id.to_string()).collect(),
        }
    }
}

fn text_model(settings: &Settings) -> Option<Arc<dyn TextModel>> {
    let endpoint = settings.summarizer.model_endpoint.as_deref()?;
    let timeout = Duration::from_secs(settings.summarizer.model_timeout_secs);
    match HttpTextModel::new(endpoint, &settings.summarizer.model_name, timeout) {
        Ok(model) => {
            info!(endpoint = %endpoint, "model backend configured");
            Some(Arc::new(model))
        }
        Err(err) => {
            warn!(error = %err, "model backend disabled, using extractive summaries");
            None
        }
    }
}
