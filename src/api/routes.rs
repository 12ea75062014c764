use actix_web::web;

use super::handlers::{accounts, alerts, health, patients, summaries};
use crate::config::ServiceKind;
use crate::websocket;

/// Route table for `service`.
pub fn configure(service: ServiceKind) -> impl Fn(&mut web::ServiceConfig) + Clone {
    move |cfg: &mut web::ServiceConfig| {
        cfg.route("/health", web::get().to(health::health));

        if service.runs_vitals() {
            cfg.service(
                web::scope("/api/patients")
                    .route("", web::get().to(patients::list_patients))
                    .route("/{patient_id}", web::get().to(patients::get_patient))
                    .route("/{patient_id}/vitals", web::get().to(patients::get_vitals))
                    .route("/{patient_id}/vitals/history", web::get().to(patients::get_vitals_history)),
            )
            .service(websocket::server::websocket_route());
        }

        if service.runs_alerts() {
            cfg.service(
                web::scope("/api/alerts")
                    .route("", web::get().to(alerts::list_alerts))
                    .route("/{patient_id}", web::get().to(alerts::patient_alerts))
                    .route("/{patient_id}", web::delete().to(alerts::clear_alerts))
                    .route("/{alert_id}/acknowledge", web::post().to(alerts::acknowledge_alert)),
            )
            .route("/api/analyze", web::post().to(alerts::analyze));
        }

        if service.runs_summarizer() {
            cfg.service(
                web::scope("/api/summaries")
                    .route("", web::get().to(summaries::list_summaries))
                    .route("/{patient_id}", web::get().to(summaries::get_summary)),
            )
            .service(
                web::scope("/api/model")
                    .route("/info", web::get().to(summaries::model_info))
                    .route("/trigger-summary", web::post().to(summaries::trigger_summary)),
            );
        }

        if service.runs_accounts() {
            cfg.service(
                web::scope("/api/auth")
                    .route("/login", web::post().to(accounts::login))
                    .route("/me", web::get().to(accounts::me))
                    .route("/users", web::post().to(accounts::create_user))
                    .route("/users/{username}", web::get().to(accounts::get_user))
                    .route("/users/{user_id}/audit", web::get().to(accounts::audit_log)),
            );
        }
    }
}
