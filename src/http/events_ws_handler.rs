use crate::bus::{Notification, Topic};
use crate::http::lobby_handler::AppState;
use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, warn};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
const FORWARD_INTERVAL: Duration = Duration::from_millis(50);

/// WebSocket message types
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Something under `topic` changed; re-fetch it
    Changed { topic: Topic },
    /// Notifications were lost; re-fetch everything
    Resync { missed: u64 },
    Error { message: String },
    Ping,
    Pong,
}

/// Forwards topic-only bus notifications to one client
pub struct EventsWebSocket {
    id: Uuid,
    hb: Instant,
    notifications: broadcast::Receiver<Notification>,
}

impl EventsWebSocket {
    pub fn new(notifications: broadcast::Receiver<Notification>) -> Self {
        Self {
            id: Uuid::new_v4(),
            hb: Instant::now(),
            notifications,
        }
    }

    fn send(ctx: &mut <Self as Actor>::Context, message: &WsMessage) {
        if let Ok(json) = serde_json::to_string(message) {
            ctx.text(json);
        }
    }

    fn hb(&self, ctx: &mut <Self as Actor>::Context) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!(session_id = %act.id, "WebSocket heartbeat timeout, disconnecting");
                ctx.stop();
                return;
            }
            Self::send(ctx, &WsMessage::Ping);
        });
    }

    /// Drain whatever the bus delivered since the last tick.
    fn forward(&mut self, ctx: &mut <Self as Actor>::Context) {
        loop {
            match self.notifications.try_recv() {
                Ok(note) => Self::send(ctx, &WsMessage::Changed { topic: note.topic }),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Lagged(missed)) => {
                    debug!(session_id = %self.id, missed, "Event socket lagged");
                    Self::send(ctx, &WsMessage::Resync { missed });
                }
                Err(TryRecvError::Closed) => {
                    ctx.stop();
                    break;
                }
            }
        }
    }

    fn handle_message(&mut self, msg: &str, ctx: &mut <Self as Actor>::Context) {
        match serde_json::from_str::<WsMessage>(msg) {
            Ok(WsMessage::Ping) => Self::send(ctx, &WsMessage::Pong),
            Ok(WsMessage::Pong) => self.hb = Instant::now(),
            Ok(_) => warn!(session_id = %self.id, "Received unexpected message type"),
            Err(e) => {
                debug!(session_id = %self.id, error = %e, "Failed to parse WebSocket message");
                Self::send(
                    ctx,
                    &WsMessage::Error {
                        message: "Invalid message format".to_string(),
                    },
                );
            }
        }
    }
}

impl Actor for EventsWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.id, "Event socket connected");
        self.hb(ctx);
        ctx.run_interval(FORWARD_INTERVAL, |act, ctx| act.forward(ctx));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(session_id = %self.id, "Event socket closed");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for EventsWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.handle_message(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                warn!(session_id = %self.id, "Binary messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.id, reason = ?reason, "Client initiated close");
                ctx.close(reason);
                ctx.stop();
            }
            _ => (),
        }
    }
}

/// GET /ws/events
pub async fn events_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(EventsWebSocket::new(state.bus.subscribe()), &req, stream)
}
