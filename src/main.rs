//! Wardwatch
//!
//! Main entry point. `--service` picks which components this process hosts.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_actix_web::TracingLogger;

use wardwatch::config::{self, ServiceKind};
use wardwatch::tasks::BackgroundTasks;
use wardwatch::{api, telemetry, AppState};

#[derive(Debug, Parser)]
#[command(name = "wardwatch", version, about = "Simulated ICU monitoring services")]
struct Cli {
    /// Component(s) to run in this process.
    #[arg(long, value_enum, default_value = "all")]
    service: ServiceKind,

    /// Listen port; defaults to the service's own port.
    #[arg(long)]
    port: Option<u16>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Load configuration
    let settings = config::load_config().context("failed to load configuration")?;
    settings.validate()?;
    telemetry::init(&settings.logging);

    let service = cli.service;
    let host = settings.server.host.clone();
    let port = cli
        .port
        .or(settings.server.port)
        .unwrap_or_else(|| service.default_port());
    let server_settings = settings.server.clone();

    let state = web::Data::new(AppState::build(service, settings).await);
    let tasks = BackgroundTasks::spawn(&state);

    info!(service = service.name(), %host, port, "starting HTTP server");
    let app_state = state.clone();
    let result = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(api::middleware::cors(&server_settings))
            .wrap(TracingLogger::default())
            .configure(api::configure(service))
    })
    .bind((host.as_str(), port))
    .with_context(|| format!("failed to bind {}:{}", host, port))?
    .run()
    .await;

    tasks.shutdown().await;
    info!(service = service.name(), "shut down");
    result.context("HTTP server failed")
}
