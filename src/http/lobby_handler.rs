use crate::api_error::ApiError;
use crate::bus::NotificationBus;
use crate::config::LobbyConfig;
use crate::http::events_ws_handler::events_websocket;
use crate::http::health::health_check;
use crate::models::{
    MatchState, Move, PlayerRecord, RegisterOutcome, RoundResult, RoundState, Slot, UpcomingMatch,
    ViewerOutcome,
};
use crate::service::{ChooseOutcome, Lobby, LobbyOutcome, Matchmaker, MatchmakingPolicy};
use crate::store::StoreBackend;
use actix_web::{web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

/// One registered player driving the core through HTTP
struct Session {
    lobby: Lobby<StoreBackend>,
    reactor: JoinHandle<()>,
}

/// Process-wide state: the shared store and bus, plus one lobby actor per
/// registered name.
pub struct AppState {
    pub store: StoreBackend,
    pub bus: NotificationBus,
    pub config: LobbyConfig,
    /// Anonymous actor used for lobby-wide reads
    pub observer: Lobby<StoreBackend>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl AppState {
    pub fn new(store: StoreBackend, bus: NotificationBus, config: LobbyConfig) -> Self {
        let observer = Lobby::new(store.clone(), bus.clone(), &config);
        Self {
            store,
            bus,
            config,
            observer,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    async fn session(&self, name: &str) -> Result<Lobby<StoreBackend>, ApiError> {
        self.sessions
            .read()
            .await
            .get(name)
            .map(|session| session.lobby.clone())
            .ok_or_else(|| ApiError::not_found(format!("no session for {name}")))
    }

    async fn open_session(&self, name: String, lobby: Lobby<StoreBackend>) {
        let reactor = lobby.spawn_reactor();
        let previous = self
            .sessions
            .write()
            .await
            .insert(name, Session { lobby, reactor });
        if let Some(previous) = previous {
            previous.reactor.abort();
        }
    }

    async fn close_session(&self, name: &str) -> Option<Lobby<StoreBackend>> {
        let session = self.sessions.write().await.remove(name)?;
        session.reactor.abort();
        Some(session.lobby)
    }

    /// Tear down every session, marking its player offline.
    pub async fn shutdown(&self) {
        let sessions: Vec<(String, Session)> = self.sessions.write().await.drain().collect();
        for (name, session) in sessions {
            session.reactor.abort();
            session.lobby.teardown().await;
            info!(player = %name, "Session closed on shutdown");
        }
    }
}

// =============================================================================
// DTOs
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 32))]
    pub name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChallengeRequest {
    #[validate(length(min = 1, max = 32))]
    pub opponent: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    #[serde(rename = "move")]
    pub choice: Move,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyView {
    pub policy: MatchmakingPolicy,
    pub online: Vec<PlayerRecord>,
    pub queue: Vec<String>,
    pub active_match: Option<MatchState>,
    pub upcoming: Vec<UpcomingMatch>,
}

/// A round as one participant may see it: the opponent's move stays hidden
/// until the round resolves.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    pub a: String,
    pub b: String,
    pub choice_a: Option<Move>,
    pub choice_b: Option<Move>,
    pub result: RoundResult,
    pub outcome: Option<ViewerOutcome>,
}

impl RoundView {
    pub fn for_viewer(round: &RoundState, viewer: &str) -> Self {
        Self {
            a: round.a.clone(),
            b: round.b.clone(),
            choice_a: round.visible_move(Slot::A, viewer),
            choice_b: round.visible_move(Slot::B, viewer),
            result: round.result,
            outcome: round.outcome_for(viewer),
        }
    }
}

fn outcome_response(outcome: LobbyOutcome) -> Result<HttpResponse, ApiError> {
    match outcome {
        LobbyOutcome::Rejected { reason } => Err(reason.into()),
        outcome => Ok(HttpResponse::Ok().json(outcome)),
    }
}

// =============================================================================
// PLAYERS
// =============================================================================

/// POST /api/players
pub async fn register(
    state: web::Data<AppState>,
    req: web::Json<RegisterRequest>,
) -> Result<impl Responder, ApiError> {
    req.validate()?;

    let lobby = Lobby::new(state.store.clone(), state.bus.clone(), &state.config);
    let outcome = lobby.register(&req.name).await?;
    match &outcome {
        RegisterOutcome::Registered { player, .. } => {
            state.open_session(player.name.clone(), lobby).await;
            Ok(HttpResponse::Created().json(&outcome))
        }
        RegisterOutcome::AlreadyOnline => Err(ApiError::conflict(format!(
            "{} is already online",
            req.name
        ))),
        RegisterOutcome::Rejected { reason } => Err(reason.clone().into()),
    }
}

/// POST /api/players/{name}/logout
pub async fn logout(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, ApiError> {
    let name = path.into_inner();
    let lobby = state
        .close_session(&name)
        .await
        .ok_or_else(|| ApiError::not_found(format!("no session for {name}")))?;
    lobby.logout().await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({ "name": name, "online": false })))
}

/// GET /api/players
pub async fn leaderboard(state: web::Data<AppState>) -> Result<impl Responder, ApiError> {
    let players = state.observer.registry().leaderboard().await?;
    Ok(HttpResponse::Ok().json(players))
}

/// GET /api/lobby
pub async fn lobby_view(state: web::Data<AppState>) -> Result<impl Responder, ApiError> {
    let observer = &state.observer;
    let queue: Vec<String> = match observer.matchmaking().as_queue() {
        Some(queue) => queue.queue().await?.iter().map(str::to_owned).collect(),
        None => Vec::new(),
    };
    let upcoming = match observer.matchmaking().as_upcoming() {
        Some(upcoming) => upcoming.upcoming().await?,
        None => Vec::new(),
    };

    Ok(HttpResponse::Ok().json(LobbyView {
        policy: observer.matchmaking().policy(),
        online: observer.registry().online_players().await?,
        queue,
        active_match: observer.slot().current().await?,
        upcoming,
    }))
}

// =============================================================================
// MATCHMAKING
// =============================================================================

/// POST /api/players/{name}/challenge
pub async fn challenge(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<ChallengeRequest>,
) -> Result<impl Responder, ApiError> {
    req.validate()?;
    let name = path.into_inner();
    let lobby = state.session(&name).await?;

    info!(player = %name, opponent = %req.opponent, "Received challenge request");
    outcome_response(lobby.challenge(&req.opponent).await?)
}

/// POST /api/players/{name}/upcoming/{id}/accept
pub async fn accept(
    state: web::Data<AppState>,
    path: web::Path<(String, Uuid)>,
) -> Result<impl Responder, ApiError> {
    let (name, id) = path.into_inner();
    let lobby = state.session(&name).await?;
    outcome_response(lobby.accept(id).await?)
}

/// POST /api/players/{name}/upcoming/{id}/decline
pub async fn decline(
    state: web::Data<AppState>,
    path: web::Path<(String, Uuid)>,
) -> Result<impl Responder, ApiError> {
    let (name, id) = path.into_inner();
    let lobby = state.session(&name).await?;
    outcome_response(lobby.decline(id).await?)
}

/// POST /api/players/{name}/leave
pub async fn leave(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, ApiError> {
    let name = path.into_inner();
    let left = state.session(&name).await?.leave_match().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "left": left })))
}

// =============================================================================
// ROUNDS
// =============================================================================

/// POST /api/players/{name}/enter
pub async fn enter(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, ApiError> {
    let name = path.into_inner();
    let round = state
        .session(&name)
        .await?
        .enter_game()
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{name} is not in an active match")))?;
    Ok(HttpResponse::Ok().json(RoundView::for_viewer(&round, &name)))
}

/// POST /api/players/{name}/moves
pub async fn choose(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: web::Json<MoveRequest>,
) -> Result<impl Responder, ApiError> {
    let name = path.into_inner();
    let lobby = state.session(&name).await?;

    match lobby.choose(req.choice).await? {
        ChooseOutcome::NoRound => Err(ApiError::not_found("no round in progress")),
        ChooseOutcome::NotParticipant => {
            Err(ApiError::bad_request(format!("{name} is not playing this round")))
        }
        ChooseOutcome::AlreadyResolved => Err(ApiError::conflict("round already resolved")),
        ChooseOutcome::Recorded { round } | ChooseOutcome::Resolved { round, .. } => {
            Ok(HttpResponse::Ok().json(RoundView::for_viewer(&round, &name)))
        }
    }
}

/// POST /api/players/{name}/play-again
pub async fn play_again(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, ApiError> {
    let name = path.into_inner();
    let round = state
        .session(&name)
        .await?
        .play_again()
        .await?
        .ok_or_else(|| ApiError::not_found(format!("{name} is not in an active match")))?;
    Ok(HttpResponse::Ok().json(RoundView::for_viewer(&round, &name)))
}

/// GET /api/players/{name}/round
pub async fn round(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<impl Responder, ApiError> {
    let name = path.into_inner();
    let round = state
        .session(&name)
        .await?
        .rounds()
        .current()
        .await?
        .ok_or_else(|| ApiError::not_found("no round in progress"))?;
    Ok(HttpResponse::Ok().json(RoundView::for_viewer(&round, &name)))
}

/// Configure lobby routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(health_check))
            .route("/lobby", web::get().to(lobby_view))
            .route("/players", web::get().to(leaderboard))
            .route("/players", web::post().to(register))
            .route("/players/{name}/logout", web::post().to(logout))
            .route("/players/{name}/challenge", web::post().to(challenge))
            .route("/players/{name}/enter", web::post().to(enter))
            .route("/players/{name}/moves", web::post().to(choose))
            .route("/players/{name}/play-again", web::post().to(play_again))
            .route("/players/{name}/leave", web::post().to(leave))
            .route("/players/{name}/round", web::get().to(round))
            .route("/players/{name}/upcoming/{id}/accept", web::post().to(accept))
            .route("/players/{name}/upcoming/{id}/decline", web::post().to(decline)),
    )
    .route("/ws/events", web::get().to(events_websocket));
}
