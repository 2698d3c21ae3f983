use crate::bus::ChangeStream;
use crate::models::{check_name, rank, PlayerRecord, RegisterOutcome};
use crate::store::{Mutation, RecordKey, SharedStore, StoreError, SyncContext};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Presence and score for every known identity, plus this actor's local identity.
#[derive(Clone)]
pub struct PlayerRegistry<S> {
    ctx: SyncContext<S>,
    local: Arc<RwLock<Option<String>>>,
    poll_interval: Duration,
}

impl<S: SharedStore> PlayerRegistry<S> {
    pub fn new(ctx: SyncContext<S>, poll_interval: Duration) -> Self {
        Self {
            ctx,
            local: Arc::new(RwLock::new(None)),
            poll_interval,
        }
    }

    // =============================================================================
    // MUTATIONS
    // =============================================================================

    /// Claim `name` for this actor.
    ///
    /// Creates the record on first use and reactivates an offline one. A name
    /// that is currently online is refused without writing anything. Names
    /// are stored exactly as given.
    pub async fn register(&self, name: &str) -> Result<RegisterOutcome, StoreError> {
        if let Err(reason) = check_name(name) {
            return Ok(RegisterOutcome::Rejected { reason });
        }

        let outcome = self
            .ctx
            .modify(RecordKey::Players, |players: Option<Vec<PlayerRecord>>| {
                let mut players = players.unwrap_or_default();
                match players.iter().position(|p| p.name == name) {
                    Some(index) if players[index].online => {
                        Mutation::Keep(RegisterOutcome::AlreadyOnline)
                    }
                    Some(index) => {
                        let player = &mut players[index];
                        player.online = true;
                        player.touch();
                        let player = player.clone();
                        Mutation::Put(
                            players,
                            RegisterOutcome::Registered {
                                player,
                                returning: true,
                            },
                        )
                    }
                    None => {
                        let player = PlayerRecord::new(name);
                        players.push(player.clone());
                        Mutation::Put(
                            players,
                            RegisterOutcome::Registered {
                                player,
                                returning: false,
                            },
                        )
                    }
                }
            })
            .await?;

        match &outcome {
            RegisterOutcome::Registered { returning, .. } => {
                self.set_local(Some(name.to_string()));
                info!(player = %name, returning, actor = %self.ctx.actor(), "Player registered");
            }
            RegisterOutcome::AlreadyOnline => {
                debug!(player = %name, "Registration refused, name is online");
            }
            RegisterOutcome::Rejected { .. } => {}
        }

        Ok(outcome)
    }

    /// Returns false when the name is unknown.
    pub async fn set_online(&self, name: &str, online: bool) -> Result<bool, StoreError> {
        self.ctx
            .modify(RecordKey::Players, |players: Option<Vec<PlayerRecord>>| {
                let mut players = players.unwrap_or_default();
                match players.iter_mut().find(|p| p.name == name) {
                    Some(player) => {
                        player.online = online;
                        player.touch();
                        Mutation::Put(players, true)
                    }
                    None => Mutation::Keep(false),
                }
            })
            .await
    }

    /// Adds `delta` to the score and returns the new total, or `None` for an
    /// unknown name. The sign of `delta` is not checked.
    pub async fn add_score(&self, name: &str, delta: i64) -> Result<Option<i64>, StoreError> {
        let score = self
            .ctx
            .modify(RecordKey::Players, |players: Option<Vec<PlayerRecord>>| {
                let mut players = players.unwrap_or_default();
                match players.iter_mut().find(|p| p.name == name) {
                    Some(player) => {
                        player.score += delta;
                        player.touch();
                        let score = player.score;
                        Mutation::Put(players, Some(score))
                    }
                    None => Mutation::Keep(None),
                }
            })
            .await?;

        if let Some(score) = score {
            info!(player = %name, delta, score, "Score updated");
        }
        Ok(score)
    }

    /// Credit the winner of `round` with one point. Idempotent per round, so a
    /// retried award never counts twice. Returns false for an unknown name or
    /// an already credited round.
    pub async fn award_round(&self, name: &str, round: Uuid) -> Result<bool, StoreError> {
        let credited = self
            .ctx
            .modify(RecordKey::Players, |players: Option<Vec<PlayerRecord>>| {
                let mut players = players.unwrap_or_default();
                let credited = match players.iter_mut().find(|p| p.name == name) {
                    Some(player) => player.credit(round),
                    None => false,
                };
                if credited {
                    Mutation::Put(players, true)
                } else {
                    Mutation::Keep(false)
                }
            })
            .await?;

        if credited {
            info!(player = %name, round_id = %round, "Round win credited");
        } else {
            debug!(player = %name, round_id = %round, "Round win already credited");
        }
        Ok(credited)
    }

    /// Marks the local identity offline and forgets it.
    pub async fn logout(&self) -> Result<Option<String>, StoreError> {
        let Some(name) = self.take_local() else {
            return Ok(None);
        };
        self.set_online(&name, false).await?;
        info!(player = %name, actor = %self.ctx.actor(), "Player logged out");
        Ok(Some(name))
    }

    /// Best-effort logout when the actor goes away.
    pub async fn teardown(&self) {
        if let Err(e) = self.logout().await {
            warn!(error = %e, actor = %self.ctx.actor(), "Could not mark player offline on teardown");
        }
    }

    // =============================================================================
    // READS
    // =============================================================================

    pub fn current_user(&self) -> Option<String> {
        self.local
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_logged_in(&self) -> bool {
        self.current_user().is_some_and(|name| !name.trim().is_empty())
    }

    /// Point-in-time copy of every record, in registration order.
    pub async fn snapshot(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        Ok(self
            .ctx
            .read::<Vec<PlayerRecord>>(RecordKey::Players)
            .await?
            .unwrap_or_default())
    }

    pub async fn get(&self, name: &str) -> Result<Option<PlayerRecord>, StoreError> {
        Ok(self.snapshot().await?.into_iter().find(|p| p.name == name))
    }

    pub async fn online_players(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        let mut players = self.leaderboard().await?;
        players.retain(|p| p.online);
        Ok(players)
    }

    pub async fn leaderboard(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        let mut players = self.snapshot().await?;
        rank(&mut players);
        Ok(players)
    }

    pub async fn watch(&self) -> Result<ChangeStream<Vec<PlayerRecord>>, StoreError> {
        ChangeStream::spawn(self.ctx.clone(), RecordKey::Players, self.poll_interval).await
    }

    fn set_local(&self, name: Option<String>) {
        *self
            .local
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = name;
    }

    fn take_local(&self) -> Option<String> {
        self.local
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}
