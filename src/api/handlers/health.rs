use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde_json::{json, Map, Value};

use crate::state::AppState;

/// Liveness plus the state of each collaborator the service depends on.
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let service = state.service;
    let mut body = Map::new();
    body.insert("status".into(), json!("healthy"));
    body.insert("service".into(), json!(service.name()));
    body.insert("version".into(), json!(env!("CARGO_PKG_VERSION")));

    if let Some(search) = &state.search {
        body.insert("elasticsearch".into(), json!(search.refresh().await));
    }
    if let Some(summaries) = &state.summaries {
        body.insert("model_loaded".into(), json!(summaries.model_loaded()));
        body.insert("cached_summaries".into(), json!(summaries.cached_count()));
    }
    if service.runs_accounts() {
        let database = match &state.accounts {
            Some(store) => store.ping().await,
            None => false,
        };
        body.insert("database".into(), json!(database));
    }
    if let Some(simulator) = &state.simulator {
        body.insert("patients".into(), json!(simulator.len()));
        body.insert("streams".into(), json!(state.subscribers.total()));
    }
    if let Some(alerts) = &state.alerts {
        body.insert("active_alerts".into(), json!(alerts.active_count()));
    }

    body.insert("timestamp".into(), json!(Utc::now()));
    HttpResponse::Ok().json(Value::Object(body))
}
