//! WebSocket session actor for `/ws/vitals/{patient_id}`.
//!
//! Each session regenerates its patient on a fixed interval and pushes the
//! resulting frame. A peer that closes, errors, or stops answering pings for
//! [`CLIENT_TIMEOUT`] is dropped and deregistered; there is no resend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{web, HttpRequest, HttpResponse, Resource};
use actix_web_actors::ws;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{SubscriberRegistry, VitalsFrame};
use crate::core::VitalsSimulator;
use crate::error::ServiceError;
use crate::state::AppState;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct VitalsSession {
    id: Uuid,
    patient_id: String,
    simulator: Arc<VitalsSimulator>,
    registry: Arc<SubscriberRegistry>,
    push_interval: Duration,
    last_heartbeat: Instant,
}

impl VitalsSession {
    pub fn new(
        patient_id: String,
        simulator: Arc<VitalsSimulator>,
        registry: Arc<SubscriberRegistry>,
        push_interval: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            simulator,
            registry,
            push_interval,
            last_heartbeat: Instant::now(),
        }
    }

    fn push(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(patient) = self.simulator.regenerate(&self.patient_id) else {
            ctx.stop();
            return;
        };
        match serde_json::to_string(&VitalsFrame::from(&*patient)) {
            Ok(frame) => ctx.text(frame),
            Err(err) => error!(patient_id = %self.patient_id, error = %err, "failed to encode frame"),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        if Instant::now().duration_since(self.last_heartbeat) > CLIENT_TIMEOUT {
            warn!(patient_id = %self.patient_id, session = %self.id, "heartbeat timed out");
            ctx.stop();
            return;
        }
        ctx.ping(b"");
    }
}

impl Actor for VitalsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.registry.register(&self.patient_id, self.id);
        info!(patient_id = %self.patient_id, session = %self.id, "stream connected");

        self.push(ctx);
        ctx.run_interval(self.push_interval, |act, ctx| act.push(ctx));
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| act.heartbeat(ctx));
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        self.registry.deregister(&self.patient_id, self.id);
        info!(patient_id = %self.patient_id, session = %self.id, "stream disconnected");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for VitalsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(bytes)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&bytes);
            }
            Ok(ws::Message::Pong(_)) | Ok(ws::Message::Text(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(patient_id = %self.patient_id, "peer closed stream");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(err) => {
                warn!(patient_id = %self.patient_id, error = %err, "stream protocol error");
                ctx.stop();
            }
        }
    }
}

async fn vitals_stream(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let patient_id = path.into_inner();
    let simulator = Arc::clone(state.simulator()?);
    if simulator.get_patient(&patient_id).is_none() {
        return Err(ServiceError::not_found("Patient", patient_id).into());
    }

    let session = VitalsSession::new(
        patient_id,
        simulator,
        Arc::clone(&state.subscribers),
        Duration::from_millis(state.settings.vitals.stream_interval_ms),
    );
    ws::start(session, &req, stream)
}

pub fn websocket_route() -> Resource {
    web::resource("/ws/vitals/{patient_id}").route(web::get().to(vitals_stream))
}
