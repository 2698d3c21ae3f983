use super::match_slot::MatchSlot;
use super::player_registry::PlayerRegistry;
use super::queue_matchmaker::QueueMatchmaker;
use super::upcoming_matchmaker::UpcomingMatchmaker;
use crate::config::LobbyConfig;
use crate::models::MatchState;
use crate::store::{SharedStore, StoreError, SyncContext};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Which matchmaking policy the whole system runs. The two never mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchmakingPolicy {
    /// Start immediately, queue when busy
    Queue,
    /// Propose, then promote on approval
    Upcoming,
}

impl FromStr for MatchmakingPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "queue" => Ok(MatchmakingPolicy::Queue),
            "upcoming" => Ok(MatchmakingPolicy::Upcoming),
            other => Err(anyhow::anyhow!("unknown matchmaking policy: {other}")),
        }
    }
}

impl std::fmt::Display for MatchmakingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchmakingPolicy::Queue => f.write_str("queue"),
            MatchmakingPolicy::Upcoming => f.write_str("upcoming"),
        }
    }
}

/// Admission control shared by both policies
pub trait Matchmaker: Clone + Send + Sync + 'static {
    fn policy(&self) -> MatchmakingPolicy;

    fn active_match(&self) -> impl Future<Output = Result<Option<MatchState>, StoreError>> + Send;

    /// Clear the slot and, if something was cleared, drain after the
    /// propagation delay.
    fn finish_match(&self) -> impl Future<Output = Result<Option<MatchState>, StoreError>> + Send;

    /// Like `finish_match`, but only while the slot still holds match `id`.
    fn end_match(&self, id: Uuid) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// One drain step: start the next waiting match if the slot is free.
    fn advance(&self) -> impl Future<Output = Result<Option<MatchState>, StoreError>> + Send;

    fn schedule_advance(&self) -> JoinHandle<()>;
}

#[derive(Clone)]
pub enum Matchmaking<S> {
    Queue(QueueMatchmaker<S>),
    Upcoming(UpcomingMatchmaker<S>),
}

impl<S: SharedStore> Matchmaking<S> {
    pub fn new(
        ctx: SyncContext<S>,
        slot: MatchSlot<S>,
        registry: PlayerRegistry<S>,
        config: &LobbyConfig,
    ) -> Self {
        match config.policy {
            MatchmakingPolicy::Queue => Matchmaking::Queue(QueueMatchmaker::new(
                ctx,
                slot,
                registry,
                config.drain_delay,
                config.poll_interval,
            )),
            MatchmakingPolicy::Upcoming => Matchmaking::Upcoming(UpcomingMatchmaker::new(
                ctx,
                slot,
                config.drain_delay,
                config.upcoming_retention,
                config.poll_interval,
            )),
        }
    }

    pub fn as_queue(&self) -> Option<&QueueMatchmaker<S>> {
        match self {
            Matchmaking::Queue(queue) => Some(queue),
            Matchmaking::Upcoming(_) => None,
        }
    }

    pub fn as_upcoming(&self) -> Option<&UpcomingMatchmaker<S>> {
        match self {
            Matchmaking::Upcoming(upcoming) => Some(upcoming),
            Matchmaking::Queue(_) => None,
        }
    }
}

impl<S: SharedStore> Matchmaker for Matchmaking<S> {
    fn policy(&self) -> MatchmakingPolicy {
        match self {
            Matchmaking::Queue(m) => m.policy(),
            Matchmaking::Upcoming(m) => m.policy(),
        }
    }

    async fn active_match(&self) -> Result<Option<MatchState>, StoreError> {
        match self {
            Matchmaking::Queue(m) => m.active_match().await,
            Matchmaking::Upcoming(m) => m.active_match().await,
        }
    }

    async fn finish_match(&self) -> Result<Option<MatchState>, StoreError> {
        match self {
            Matchmaking::Queue(m) => m.finish_match().await,
            Matchmaking::Upcoming(m) => m.finish_match().await,
        }
    }

    async fn end_match(&self, id: Uuid) -> Result<bool, StoreError> {
        match self {
            Matchmaking::Queue(m) => m.end_match(id).await,
            Matchmaking::Upcoming(m) => m.end_match(id).await,
        }
    }

    async fn advance(&self) -> Result<Option<MatchState>, StoreError> {
        match self {
            Matchmaking::Queue(m) => m.advance().await,
            Matchmaking::Upcoming(m) => m.advance().await,
        }
    }

    fn schedule_advance(&self) -> JoinHandle<()> {
        match self {
            Matchmaking::Queue(m) => m.schedule_advance(),
            Matchmaking::Upcoming(m) => m.schedule_advance(),
        }
    }
}
