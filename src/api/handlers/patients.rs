use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::error::ServiceError;
use crate::models::{BloodPressure, PatientProfile, SeverityTier, VitalsSample};
use crate::state::AppState;

// ===== Response shapes =====

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsView {
    pub heart_rate: i32,
    #[serde(rename = "spO2")]
    pub spo2: i32,
    pub blood_pressure: BloodPressure,
    pub temperature: f64,
    pub respiratory: i32,
}

impl From<&VitalsSample> for VitalsView {
    fn from(vitals: &VitalsSample) -> Self {
        Self {
            heart_rate: vitals.heart_rate,
            spo2: vitals.spo2,
            blood_pressure: vitals.blood_pressure,
            temperature: vitals.temperature,
            respiratory: vitals.respiratory_rate,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientView {
    pub id: String,
    pub name: String,
    pub bed_number: String,
    pub age: u32,
    pub gender: String,
    pub admission_date: DateTime<Utc>,
    pub diagnosis: Option<String>,
    pub attending_physician: Option<String>,
    pub vitals: VitalsView,
    pub alert_severity: SeverityTier,
}

impl From<&PatientProfile> for PatientView {
    fn from(patient: &PatientProfile) -> Self {
        Self {
            id: patient.id.clone(),
            name: patient.name.clone(),
            bed_number: patient.bed_number.clone(),
            age: patient.age,
            gender: patient.gender.clone(),
            admission_date: patient.admission_date,
            diagnosis: patient.diagnosis.clone(),
            attending_physician: patient.attending_physician.clone(),
            vitals: VitalsView::from(&patient.vitals),
            alert_severity: patient.severity,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CurrentVitals {
    #[serde(flatten)]
    pub vitals: VitalsView,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Point<T> {
    pub timestamp: DateTime<Utc>,
    pub value: T,
}

/// One time series per vital, oldest first.
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalsHistory {
    pub heart_rate: Vec<Point<i32>>,
    #[serde(rename = "spO2")]
    pub spo2: Vec<Point<i32>>,
    pub systolic: Vec<Point<i32>>,
    pub diastolic: Vec<Point<i32>>,
    pub temperature: Vec<Point<f64>>,
    pub respiratory: Vec<Point<i32>>,
}

impl FromIterator<VitalsSample> for VitalsHistory {
    fn from_iter<I: IntoIterator<Item = VitalsSample>>(samples: I) -> Self {
        let mut history = Self::default();
        for v in samples {
            let at = v.timestamp;
            history.heart_rate.push(Point { timestamp: at, value: v.heart_rate });
            history.spo2.push(Point { timestamp: at, value: v.spo2 });
            history.systolic.push(Point { timestamp: at, value: v.blood_pressure.systolic });
            history.diastolic.push(Point { timestamp: at, value: v.blood_pressure.diastolic });
            history.temperature.push(Point { timestamp: at, value: v.temperature });
            history.respiratory.push(Point { timestamp: at, value: v.respiratory_rate });
        }
        history
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub hours: Option<u32>,
}

// ===== Handlers =====

pub async fn list_patients(state: web::Data<AppState>) -> Result<HttpResponse, ServiceError> {
    let patients: Vec<PatientView> = state
        .simulator()?
        .all_patients()
        .iter()
        .map(|p| PatientView::from(p.as_ref()))
        .collect();
    Ok(HttpResponse::Ok().json(patients))
}

fn find_patient(
    state: &AppState,
    patient_id: &str,
) -> Result<std::sync::Arc<PatientProfile>, ServiceError> {
    state
        .simulator()?
        .get_patient(patient_id)
        .ok_or_else(|| ServiceError::not_found("Patient", patient_id))
}

pub async fn get_patient(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let patient = find_patient(&state, &path)?;
    Ok(HttpResponse::Ok().json(PatientView::from(patient.as_ref())))
}

pub async fn get_vitals(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServiceError> {
    let patient = find_patient(&state, &path)?;
    Ok(HttpResponse::Ok().json(CurrentVitals {
        vitals: VitalsView::from(&patient.vitals),
        timestamp: patient.vitals.timestamp,
    }))
}

#[instrument(skip(state, path, query), fields(patient_id = %path.as_str()))]
pub async fn get_vitals_history(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, ServiceError> {
    let max_hours = state.settings.vitals.max_history_hours;
    let hours = query.hours.unwrap_or(1);
    if hours == 0 || hours > max_hours {
        return Err(ServiceError::BadRequest(format!(
            "hours must be between 1 and {}",
            max_hours
        )));
    }

    let series = state
        .simulator()?
        .history(&path, hours)
        .ok_or_else(|| ServiceError::not_found("Patient", path.as_str()))?;
    Ok(HttpResponse::Ok().json(series.into_iter().collect::<VitalsHistory>()))
}
