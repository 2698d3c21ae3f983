use crate::bus::ChangeStream;
use crate::models::{MatchState, MatchStatus};
use crate::store::{Mutation, RecordKey, SharedStore, StoreError, SyncContext};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Result of asking for the match slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Admitted(MatchState),
    /// Someone else holds the slot; carries the active match
    Occupied(MatchState),
}

/// Admission control over the single system-wide match slot.
///
/// All writes are compare-and-swap, so of any number of actors racing for an
/// empty slot exactly one is admitted.
#[derive(Clone)]
pub struct MatchSlot<S> {
    ctx: SyncContext<S>,
    poll_interval: Duration,
}

impl<S: SharedStore> MatchSlot<S> {
    pub fn new(ctx: SyncContext<S>, poll_interval: Duration) -> Self {
        Self { ctx, poll_interval }
    }

    /// The active match, if any
    pub async fn current(&self) -> Result<Option<MatchState>, StoreError> {
        Ok(self
            .ctx
            .read::<MatchState>(RecordKey::Match)
            .await?
            .filter(MatchState::is_active))
    }

    pub async fn activate(&self, a: &str, b: &str) -> Result<Admission, StoreError> {
        let admission = self
            .ctx
            .modify(RecordKey::Match, |current: Option<MatchState>| match current {
                Some(held) if !held.status.can_transition_to(&MatchStatus::Active) => {
                    Mutation::Keep(Admission::Occupied(held))
                }
                _ => {
                    let next = MatchState::active(a, b);
                    Mutation::Put(next.clone(), Admission::Admitted(next))
                }
            })
            .await?;

        match &admission {
            Admission::Admitted(state) => {
                info!(match_id = %state.id, player_a = %a, player_b = %b, "Match started");
            }
            Admission::Occupied(state) => {
                debug!(match_id = %state.id, player_a = %a, player_b = %b, "Match slot occupied");
            }
        }
        Ok(admission)
    }

    /// Empties the slot whatever it holds. Returns the match that was removed.
    pub async fn clear(&self) -> Result<Option<MatchState>, StoreError> {
        let cleared = self
            .ctx
            .modify(RecordKey::Match, |current: Option<MatchState>| match current {
                Some(state) if state.status.can_transition_to(&MatchStatus::Inactive) => {
                    Mutation::Clear(Some(state))
                }
                _ => Mutation::Keep(None),
            })
            .await?;

        if let Some(state) = &cleared {
            info!(match_id = %state.id, "Match cleared");
        }
        Ok(cleared)
    }

    /// Empties the slot only while it still holds match `id`, so a stale
    /// caller can never end somebody else's newer match.
    pub async fn release(&self, id: Uuid) -> Result<bool, StoreError> {
        let released = self
            .ctx
            .modify(RecordKey::Match, |current: Option<MatchState>| match current {
                Some(state)
                    if state.id == id && state.status.can_transition_to(&MatchStatus::Inactive) =>
                {
                    Mutation::Clear(true)
                }
                _ => Mutation::Keep(false),
            })
            .await?;

        if released {
            info!(match_id = %id, "Match released");
        } else {
            debug!(match_id = %id, "Match already gone, nothing to release");
        }
        Ok(released)
    }

    pub async fn is_player_in_active_match(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.player_match(name).await?.is_some())
    }

    pub async fn player_match(&self, name: &str) -> Result<Option<MatchState>, StoreError> {
        Ok(self.current().await?.filter(|m| m.includes(name)))
    }

    /// Re-read the slot and nudge every view of it to do the same.
    pub async fn refresh(&self) -> Result<Option<MatchState>, StoreError> {
        self.ctx.bus().publish(RecordKey::Match.topic(), self.ctx.actor());
        self.current().await
    }

    pub async fn watch(&self) -> Result<ChangeStream<MatchState>, StoreError> {
        ChangeStream::spawn(self.ctx.clone(), RecordKey::Match, self.poll_interval).await
    }
}
