use super::match_slot::MatchSlot;
use super::matchmaking::{Matchmaker, Matchmaking};
use super::player_registry::PlayerRegistry;
use super::queue_matchmaker::StartOutcome;
use super::round_engine::{ChooseOutcome, RoundEngine};
use super::upcoming_matchmaker::{ProposalOutcome, UpcomingMatchmaker};
use crate::bus::{NotificationBus, Topic};
use crate::config::LobbyConfig;
use crate::models::{MatchState, Move, RegisterOutcome, Rejection, RoundState, UpcomingMatch};
use crate::store::{SharedStore, StoreError, SyncContext};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a lobby action led to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LobbyOutcome {
    Started {
        #[serde(rename = "match")]
        state: MatchState,
    },
    Enqueued {
        position: usize,
    },
    Proposed {
        upcoming: UpcomingMatch,
    },
    /// Accepted, but a match is already running; the proposal stays pending
    Deferred,
    Withdrawn,
    Rejected {
        reason: Rejection,
    },
}

impl From<StartOutcome> for LobbyOutcome {
    fn from(outcome: StartOutcome) -> Self {
        match outcome {
            StartOutcome::Started { state } => LobbyOutcome::Started { state },
            StartOutcome::Enqueued { position } => LobbyOutcome::Enqueued { position },
            StartOutcome::Rejected { reason } => LobbyOutcome::Rejected { reason },
        }
    }
}

impl From<ProposalOutcome> for LobbyOutcome {
    fn from(outcome: ProposalOutcome) -> Self {
        match outcome {
            ProposalOutcome::Proposed { upcoming } => LobbyOutcome::Proposed { upcoming },
            ProposalOutcome::Rejected { reason } => LobbyOutcome::Rejected { reason },
        }
    }
}

/// One actor's view of the game: its identity, the matchmaker the system
/// runs, and the round engine, all sharing one actor id.
#[derive(Clone)]
pub struct Lobby<S> {
    ctx: SyncContext<S>,
    registry: PlayerRegistry<S>,
    slot: MatchSlot<S>,
    matchmaking: Matchmaking<S>,
    rounds: RoundEngine<S>,
}

impl<S: SharedStore> Lobby<S> {
    pub fn new(store: S, bus: NotificationBus, config: &LobbyConfig) -> Self {
        let ctx = SyncContext::new(store, bus, config.write_retries);
        let registry = PlayerRegistry::new(ctx.clone(), config.poll_interval);
        let slot = MatchSlot::new(ctx.clone(), config.poll_interval);
        let matchmaking = Matchmaking::new(ctx.clone(), slot.clone(), registry.clone(), config);
        let rounds = RoundEngine::new(ctx.clone(), registry.clone(), config.poll_interval);
        Self {
            ctx,
            registry,
            slot,
            matchmaking,
            rounds,
        }
    }

    pub fn context(&self) -> &SyncContext<S> {
        &self.ctx
    }

    pub fn registry(&self) -> &PlayerRegistry<S> {
        &self.registry
    }

    pub fn slot(&self) -> &MatchSlot<S> {
        &self.slot
    }

    pub fn matchmaking(&self) -> &Matchmaking<S> {
        &self.matchmaking
    }

    pub fn rounds(&self) -> &RoundEngine<S> {
        &self.rounds
    }

    /// Claim a name, then give any waiting player a chance to meet the newcomer.
    pub async fn register(&self, name: &str) -> Result<RegisterOutcome, StoreError> {
        let outcome = self.registry.register(name).await?;
        if outcome.is_success() {
            self.matchmaking.advance().await?;
        }
        Ok(outcome)
    }

    /// Leaves any match this player is in, drops them from the queue, then
    /// marks them offline.
    pub async fn logout(&self) -> Result<Option<String>, StoreError> {
        let Some(me) = self.registry.current_user() else {
            return Ok(None);
        };
        self.leave_match().await?;
        if let Some(queue) = self.matchmaking.as_queue() {
            queue.remove(&me).await?;
        }
        self.registry.logout().await
    }

    pub async fn challenge(&self, opponent: &str) -> Result<LobbyOutcome, StoreError> {
        let Some(me) = self.registry.current_user() else {
            return Ok(LobbyOutcome::Rejected {
                reason: Rejection::NotLoggedIn,
            });
        };
        match &self.matchmaking {
            Matchmaking::Queue(queue) => Ok(queue.try_start_match(&me, opponent).await?.into()),
            Matchmaking::Upcoming(upcoming) => {
                Ok(upcoming.create_upcoming_match(&me, opponent).await?.into())
            }
        }
    }

    /// Approve a proposal this player is part of and try to start it.
    pub async fn accept(&self, id: Uuid) -> Result<LobbyOutcome, StoreError> {
        let upcoming = match self.involved_proposal(id).await? {
            Ok(upcoming) => upcoming,
            Err(reason) => return Ok(LobbyOutcome::Rejected { reason }),
        };
        match upcoming.promote(id).await? {
            Some(state) => Ok(LobbyOutcome::Started { state }),
            None => Ok(LobbyOutcome::Deferred),
        }
    }

    pub async fn decline(&self, id: Uuid) -> Result<LobbyOutcome, StoreError> {
        let upcoming = match self.involved_proposal(id).await? {
            Ok(upcoming) => upcoming,
            Err(reason) => return Ok(LobbyOutcome::Rejected { reason }),
        };
        if upcoming.cancel_upcoming_match(id).await? {
            Ok(LobbyOutcome::Withdrawn)
        } else {
            Ok(LobbyOutcome::Rejected {
                reason: Rejection::UnknownProposal,
            })
        }
    }

    /// Round for the player's active match. An existing round for the same
    /// pair is kept so a late arrival does not wipe the opponent's move.
    pub async fn enter_game(&self) -> Result<Option<RoundState>, StoreError> {
        let Some(state) = self.my_match().await? else {
            return Ok(None);
        };
        let [a, b] = &state.players;
        Ok(Some(self.rounds.ensure(a, b).await?))
    }

    pub async fn choose(&self, mv: Move) -> Result<ChooseOutcome, StoreError> {
        match self.registry.current_user() {
            Some(me) => self.rounds.choose(&me, mv).await,
            None => Ok(ChooseOutcome::NotParticipant),
        }
    }

    /// Fresh round for the same pair; only players in the active match may ask.
    pub async fn play_again(&self) -> Result<Option<RoundState>, StoreError> {
        let Some(state) = self.my_match().await? else {
            return Ok(None);
        };
        let [a, b] = &state.players;
        match self.rounds.current().await? {
            Some(round) if round.is_for_pair(a, b) => self.rounds.reset().await,
            _ => Ok(Some(self.rounds.ensure(a, b).await?)),
        }
    }

    /// End this player's match, discard its round and drain after the delay.
    pub async fn leave_match(&self) -> Result<bool, StoreError> {
        let Some(state) = self.my_match().await? else {
            return Ok(false);
        };
        let ended = self.matchmaking.end_match(state.id).await?;
        if ended {
            let [a, b] = &state.players;
            self.rounds.clear_for(a, b).await?;
            info!(match_id = %state.id, actor = %self.ctx.actor(), "Player left match");
        }
        Ok(ended)
    }

    /// Best-effort cleanup when the actor goes away.
    pub async fn teardown(&self) {
        if let Err(e) = self.logout().await {
            warn!(error = %e, actor = %self.ctx.actor(), "Lobby teardown incomplete");
            self.registry.teardown().await;
        }
    }

    /// React to other actors clearing the match slot by running a drain step.
    ///
    /// Notifications published by this actor are skipped. A lagged
    /// subscription drains as well since the missed messages are unknown.
    pub fn spawn_reactor(&self) -> JoinHandle<()> {
        let this = self.clone();
        let mut notifications = self.ctx.bus().subscribe();
        tokio::spawn(async move {
            loop {
                match notifications.recv().await {
                    Ok(note) if note.topic == Topic::Match && note.origin != this.ctx.actor() => {}
                    Ok(_) => continue,
                    Err(RecvError::Lagged(missed)) => {
                        debug!(missed, actor = %this.ctx.actor(), "Reactor lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
                if let Err(e) = this.matchmaking.advance().await {
                    warn!(error = %e, actor = %this.ctx.actor(), "Reactor drain failed");
                }
            }
        })
    }

    async fn my_match(&self) -> Result<Option<MatchState>, StoreError> {
        match self.registry.current_user() {
            Some(me) => self.slot.player_match(&me).await,
            None => Ok(None),
        }
    }

    async fn involved_proposal(
        &self,
        id: Uuid,
    ) -> Result<Result<&UpcomingMatchmaker<S>, Rejection>, StoreError> {
        let Some(me) = self.registry.current_user() else {
            return Ok(Err(Rejection::NotLoggedIn));
        };
        let Some(upcoming) = self.matchmaking.as_upcoming() else {
            return Ok(Err(Rejection::UnknownProposal));
        };
        match upcoming.get(id).await? {
            Some(proposal) if proposal.status.is_terminal() => Ok(Err(Rejection::UnknownProposal)),
            Some(proposal) if !proposal.involves(&me) => Ok(Err(Rejection::NotInvolved)),
            Some(_) => Ok(Ok(upcoming)),
            None => Ok(Err(Rejection::UnknownProposal)),
        }
    }
}
