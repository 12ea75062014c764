use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::core::{RawVitals, VitalsReading};
use crate::error::ServiceError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AnalyzeQuery {
    pub patient_id: String,
}

pub async fn list_alerts(state: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    Ok(HttpResponse::Ok().json(state.alerts()?.get_all()))
}

pub async fn patient_alerts(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    Ok(HttpResponse::Ok().json(state.alerts()?.get_for_patient(&path)))
}

pub async fn acknowledge_alert(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let alert_id = path.into_inner();
    if !state.alerts()?.acknowledge(&alert_id) {
        return Err(ServiceError::not_found("Alert", alert_id));
    }
    Ok(HttpResponse::Ok().json(json!({ "status": "acknowledged", "alert_id": alert_id })))
}

/// Clearing a patient with no active alerts still succeeds.
pub async fn clear_alerts(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let patient_id = path.into_inner();
    state.alerts()?.clear(&patient_id);
    Ok(HttpResponse::Ok().json(json!({ "status": "cleared", "patient_id": patient_id })))
}

/// Evaluate an ad-hoc reading. The result replaces the patient's active set
/// and every alert goes to the sink.
#[instrument(skip(state, query, body), fields(patient_id = %query.patient_id))]
pub async fn analyze(
    state: web::Data<AppState>,
    query: web::Query<AnalyzeQuery>,
    body: web::Json<RawVitals>,
) -> Result<HttpResponse, ServiceError> {
    let reading = VitalsReading::from(body.into_inner());
    let alerts = state.alerts()?.evaluate(&query.patient_id, &reading);

    if let Some(sink) = &state.search {
        for alert in &alerts {
            sink.log_alert(alert).await;
        }
    }
    Ok(HttpResponse::Ok().json(json!({ "alerts": alerts })))
}
