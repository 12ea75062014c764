use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::error::ServiceError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub patient_id: String,
}

pub async fn list_summaries(state: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    let (summaries, history) = state.summaries()?;
    let all = summaries.all(history.as_ref(), &state.roster()).await;
    Ok(HttpResponse::Ok().json(all))
}

pub async fn get_summary(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let (summaries, history) = state.summaries()?;
    let summary = summaries.lookup(history.as_ref(), &path).await;
    Ok(HttpResponse::Ok().json(summary))
}

pub async fn model_info(state: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    let (summaries, _) = state.summaries()?;
    Ok(HttpResponse::Ok().json(summaries.model_info()))
}

/// Generate now, bypassing the cache.
#[instrument(skip(state, body), fields(patient_id = %body.patient_id))]
pub async fn trigger_summary(
    state: web::Data<AppState>,
    body: web::Json<SummaryRequest>,
) -> Result<HttpResponse, ServiceError> {
    let (summaries, history) = state.summaries()?;
    let summary = summaries.generate_from(history.as_ref(), &body.patient_id).await;
    Ok(HttpResponse::Ok().json(json!({ "status": "generated", "summary": summary })))
}
