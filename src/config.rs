//! Application configuration
//!
//! Settings are layered: `config/default.toml`, then `config/{WARDWATCH_ENV}.toml`,
//! then `WARDWATCH_*` environment variables (`__` separates sections). Every field
//! has a default, so no source is mandatory.

use anyhow::{bail, Context};
use serde::Deserialize;
use url::Url;

/// Which components this process hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ServiceKind {
    All,
    Vitals,
    Alerts,
    Summarizer,
    Accounts,
}

impl ServiceKind {
    pub fn name(&self) -> &'static str {
        match self {
            ServiceKind::All => "wardwatch",
            ServiceKind::Vitals => "vitals-generator",
            ServiceKind::Alerts => "alert-engine",
            ServiceKind::Summarizer => "summarizer-service",
            ServiceKind::Accounts => "auth-service",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            ServiceKind::All => 8000,
            ServiceKind::Vitals => 8001,
            ServiceKind::Alerts => 8002,
            ServiceKind::Summarizer => 8003,
            ServiceKind::Accounts => 8004,
        }
    }

    pub fn runs_vitals(&self) -> bool {
        matches!(self, ServiceKind::All | ServiceKind::Vitals)
    }

    pub fn runs_alerts(&self) -> bool {
        matches!(self, ServiceKind::All | ServiceKind::Alerts)
    }

    pub fn runs_summarizer(&self) -> bool {
        matches!(self, ServiceKind::All | ServiceKind::Summarizer)
    }

    pub fn runs_accounts(&self) -> bool {
        matches!(self, ServiceKind::All | ServiceKind::Accounts)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub vitals: VitalsSettings,
    pub alerts: AlertSettings,
    pub summarizer: SummarizerSettings,
    pub search: SearchSettings,
    pub accounts: AccountSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    /// Overrides the per-service default port.
    pub port: Option<u16>,
    pub cors_origins: Vec<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: None,
            cors_origins: vec![
                "http://localhost:3000".into(),
                "http://localhost:5173".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VitalsSettings {
    pub interval_ms: u64,
    pub stream_interval_ms: u64,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
    pub max_history_hours: u32,
}

impl Default for VitalsSettings {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            stream_interval_ms: 1000,
            seed: None,
            max_history_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertSettings {
    pub poll_interval_secs: u64,
    pub vitals_service_url: String,
    pub request_timeout_secs: u64,
    pub thresholds: AlertThresholds,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            vitals_service_url: "http://localhost:8001".into(),
            request_timeout_secs: 10,
            thresholds: AlertThresholds::default(),
        }
    }
}

/// Evaluator threshold table. Low-side checks are `<=`, high-side checks `>=`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    pub hr_low_critical: f64,
    pub hr_low_warning: f64,
    pub hr_high_warning: f64,
    pub hr_high_critical: f64,

    pub spo2_critical: f64,
    pub spo2_warning: f64,

    pub bp_systolic_low_critical: f64,
    pub bp_systolic_low_warning: f64,
    pub bp_systolic_warning: f64,
    pub bp_systolic_critical: f64,

    pub temp_low_critical: f64,
    pub temp_low_warning: f64,
    pub temp_warning: f64,
    pub temp_critical: f64,

    pub resp_low_critical: f64,
    pub resp_low_warning: f64,
    pub resp_high_warning: f64,
    pub resp_high_critical: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            hr_low_critical: 40.0,
            hr_low_warning: 50.0,
            hr_high_warning: 100.0,
            hr_high_critical: 130.0,

            spo2_critical: 88.0,
            spo2_warning: 92.0,

            bp_systolic_low_critical: 80.0,
            bp_systolic_low_warning: 90.0,
            bp_systolic_warning: 140.0,
            bp_systolic_critical: 180.0,

            temp_low_critical: 35.0,
            temp_low_warning: 35.5,
            temp_warning: 38.0,
            temp_critical: 39.0,

            resp_low_critical: 8.0,
            resp_low_warning: 10.0,
            resp_high_warning: 24.0,
            resp_high_critical: 30.0,
        }
    }
}

impl AlertThresholds {
    /// Each family must read critical-low <= warning-low < warning-high <= critical-high.
    pub fn validate(&self) -> anyhow::Result<()> {
        let ladders: [(&str, &[f64]); 4] = [
            ("heart rate", &[self.hr_low_critical, self.hr_low_warning, self.hr_high_warning, self.hr_high_critical]),
            ("systolic", &[self.bp_systolic_low_critical, self.bp_systolic_low_warning, self.bp_systolic_warning, self.bp_systolic_critical]),
            ("temperature", &[self.temp_low_critical, self.temp_low_warning, self.temp_warning, self.temp_critical]),
            ("respiratory", &[self.resp_low_critical, self.resp_low_warning, self.resp_high_warning, self.resp_high_critical]),
        ];
        for (family, ladder) in ladders {
            if ladder[0] > ladder[1] || ladder[1] >= ladder[2] || ladder[2] > ladder[3] {
                bail!("inconsistent {} thresholds: {:?}", family, ladder);
            }
        }
        if self.spo2_critical > self.spo2_warning {
            bail!(
                "inconsistent SpO2 thresholds: critical {} above warning {}",
                self.spo2_critical,
                self.spo2_warning
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummarizerSettings {
    pub interval_secs: u64,
    pub lookback_minutes: u32,
    pub model_name: String,
    pub model_version: String,
    /// Base URL of a text-generation backend. Extractive fallback when unset.
    pub model_endpoint: Option<String>,
    pub model_timeout_secs: u64,
    /// Characters of input text handed to the model.
    pub max_input_length: usize,
    /// Word cap on the produced summary.
    pub max_output_length: usize,
    pub min_output_length: usize,
    pub max_vitals: usize,
    pub max_alerts: usize,
    pub cache_capacity: usize,
}

impl Default for SummarizerSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            lookback_minutes: 30,
            model_name: "sshleifer/distilbart-cnn-12-6".into(),
            model_version: "1.0.0".into(),
            model_endpoint: None,
            model_timeout_secs: 60,
            max_input_length: 1024,
            max_output_length: 150,
            min_output_length: 30,
            max_vitals: 1000,
            max_alerts: 100,
            cache_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub url: String,
    pub username: String,
    pub password: String,
    pub vitals_index: String,
    pub alerts_index: String,
    pub summaries_index: String,
    pub timeout_secs: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".into(),
            username: "elastic".into(),
            password: String::new(),
            vitals_index: "medical-vitals".into(),
            alerts_index: "medical-alerts".into(),
            summaries_index: "medical-summaries".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccountSettings {
    pub database_url: String,
    pub max_connections: u32,
    pub jwt_secret: String,
    pub jwt_expire_minutes: i64,
    pub default_admin_username: String,
    pub default_admin_password: String,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://wardwatch.db?mode=rwc".into(),
            max_connections: 5,
            jwt_secret: "wardwatch-secret-key-change-in-production".into(),
            jwt_expire_minutes: 480,
            default_admin_username: "admin".into(),
            default_admin_password: "admin123".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> anyhow::Result<()> {
        Url::parse(&self.search.url)
            .with_context(|| format!("invalid search.url: {}", self.search.url))?;
        Url::parse(&self.alerts.vitals_service_url).with_context(|| {
            format!("invalid alerts.vitals_service_url: {}", self.alerts.vitals_service_url)
        })?;
        if let Some(endpoint) = &self.summarizer.model_endpoint {
            Url::parse(endpoint)
                .with_context(|| format!("invalid summarizer.model_endpoint: {}", endpoint))?;
        }
        if self.vitals.interval_ms == 0 || self.vitals.stream_interval_ms == 0 {
            bail!("vitals intervals must be positive");
        }
        if self.alerts.poll_interval_secs == 0 {
            bail!("alerts.poll_interval_secs must be positive");
        }
        if self.summarizer.interval_secs == 0 {
            bail!("summarizer.interval_secs must be positive");
        }
        if self.summarizer.cache_capacity == 0 {
            bail!("summarizer.cache_capacity must be positive");
        }
        self.alerts.thresholds.validate()
    }
}

/// Load configuration from files and environment
pub fn load_config() -> Result<Settings, config::ConfigError> {
    let env = std::env::var("WARDWATCH_ENV").unwrap_or_else(|_| "development".into());

    config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false))
        .add_source(config::File::with_name(&format!("config/{}", env)).required(false))
        .add_source(environment())
        .build()?
        .try_deserialize()
}

/// `WARDWATCH_SECTION__KEY` overrides; list values are comma separated.
fn environment() -> config::Environment {
    config::Environment::with_prefix("WARDWATCH")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("server.cors_origins")
        .try_parsing(true)
}
