use actix_cors::Cors;
use actix_web::http::{header, Method};

use crate::config::ServerSettings;

/// CORS policy for the dashboard origins. `*` in the list allows any origin.
pub fn cors(settings: &ServerSettings) -> Cors {
    let base = if settings.cors_origins.iter().any(|origin| origin == "*") {
        Cors::default().allow_any_origin()
    } else {
        settings
            .cors_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };

    base.allowed_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allowed_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .supports_credentials()
        .max_age(3600)
}
