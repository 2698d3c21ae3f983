use super::match_slot::{Admission, MatchSlot};
use super::matchmaking::{Matchmaker, MatchmakingPolicy};
use super::player_registry::PlayerRegistry;
use crate::bus::ChangeStream;
use crate::models::{check_pair, MatchState, Rejection, WaitQueue};
use crate::store::{Mutation, RecordKey, SharedStore, StoreError, SyncContext};
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    Started {
        #[serde(rename = "match")]
        state: MatchState,
    },
    /// The slot was taken; the requester now waits at `position` (1-based)
    Enqueued { position: usize },
    Rejected { reason: Rejection },
}

/// Immediate matchmaking: start now if the slot is free, otherwise wait in a
/// FIFO queue that is drained whenever a match ends.
#[derive(Clone)]
pub struct QueueMatchmaker<S> {
    ctx: SyncContext<S>,
    slot: MatchSlot<S>,
    registry: PlayerRegistry<S>,
    drain_delay: Duration,
    poll_interval: Duration,
}

impl<S: SharedStore> QueueMatchmaker<S> {
    pub fn new(
        ctx: SyncContext<S>,
        slot: MatchSlot<S>,
        registry: PlayerRegistry<S>,
        drain_delay: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ctx,
            slot,
            registry,
            drain_delay,
            poll_interval,
        }
    }

    pub fn slot(&self) -> &MatchSlot<S> {
        &self.slot
    }

    /// Start `a` vs `b`, or queue `a` if a match is already running.
    pub async fn try_start_match(&self, a: &str, b: &str) -> Result<StartOutcome, StoreError> {
        if let Err(reason) = check_pair(a, b) {
            return Ok(StartOutcome::Rejected { reason });
        }

        match self.slot.activate(a, b).await? {
            Admission::Admitted(state) => Ok(StartOutcome::Started { state }),
            Admission::Occupied(active) => {
                let position = self.enqueue(a).await?;
                info!(
                    player = %a,
                    position,
                    active_match = %active.id,
                    "Slot busy, player queued"
                );
                Ok(StartOutcome::Enqueued { position })
            }
        }
    }

    /// Idempotent; returns the 1-based queue position.
    pub async fn enqueue(&self, name: &str) -> Result<usize, StoreError> {
        self.ctx
            .modify(RecordKey::Queue, |queue: Option<WaitQueue>| {
                let mut queue = queue.unwrap_or_default();
                match queue.position(name) {
                    Some(position) => Mutation::Keep(position),
                    None => {
                        let position = queue.push_unique(name);
                        Mutation::Put(queue, position)
                    }
                }
            })
            .await
    }

    pub async fn dequeue(&self) -> Result<Option<String>, StoreError> {
        self.ctx
            .modify(RecordKey::Queue, |queue: Option<WaitQueue>| {
                let mut queue = queue.unwrap_or_default();
                match queue.pop_front() {
                    Some(head) => Mutation::Put(queue, Some(head)),
                    None => Mutation::Keep(None),
                }
            })
            .await
    }

    /// Drop `name` from wherever it sits in the queue.
    pub async fn remove(&self, name: &str) -> Result<bool, StoreError> {
        self.ctx
            .modify(RecordKey::Queue, |queue: Option<WaitQueue>| {
                let mut queue = queue.unwrap_or_default();
                if queue.remove(name) {
                    Mutation::Put(queue, true)
                } else {
                    Mutation::Keep(false)
                }
            })
            .await
    }

    pub async fn queue(&self) -> Result<WaitQueue, StoreError> {
        Ok(self
            .ctx
            .read::<WaitQueue>(RecordKey::Queue)
            .await?
            .unwrap_or_default())
    }

    pub async fn watch_queue(&self) -> Result<ChangeStream<WaitQueue>, StoreError> {
        ChangeStream::spawn(self.ctx.clone(), RecordKey::Queue, self.poll_interval).await
    }

    /// One drain step: pair the queue head with the first online player who
    /// is neither the head nor queued.
    ///
    /// The head leaves the queue only after its match was admitted, so losing
    /// the slot to another actor keeps it waiting for the next drain.
    pub async fn check_queue_and_prompt(&self) -> Result<Option<MatchState>, StoreError> {
        if self.slot.current().await?.is_some() {
            return Ok(None);
        }

        let queue = self.queue().await?;
        let Some(head) = queue.head() else {
            return Ok(None);
        };

        let players = self.registry.snapshot().await?;
        let opponent = players
            .iter()
            .find(|p| p.online && p.name != head && !queue.contains(&p.name));
        let Some(opponent) = opponent else {
            debug!(player = %head, "No eligible opponent, head keeps waiting");
            return Ok(None);
        };

        match self.slot.activate(head, &opponent.name).await? {
            Admission::Admitted(state) => {
                self.remove(head).await?;
                info!(
                    match_id = %state.id,
                    player = %head,
                    opponent = %opponent.name,
                    "Queued player matched"
                );
                Ok(Some(state))
            }
            Admission::Occupied(_) => Ok(None),
        }
    }

    pub async fn force_check_queue(&self) -> Result<Option<MatchState>, StoreError> {
        self.check_queue_and_prompt().await
    }

    /// Clears the slot without draining the queue.
    pub async fn clear_match(&self) -> Result<Option<MatchState>, StoreError> {
        self.slot.clear().await
    }
}

impl<S: SharedStore> Matchmaker for QueueMatchmaker<S> {
    fn policy(&self) -> MatchmakingPolicy {
        MatchmakingPolicy::Queue
    }

    async fn active_match(&self) -> Result<Option<MatchState>, StoreError> {
        self.slot.current().await
    }

    async fn finish_match(&self) -> Result<Option<MatchState>, StoreError> {
        let cleared = self.slot.clear().await?;
        if cleared.is_some() {
            self.schedule_advance();
        }
        Ok(cleared)
    }

    async fn end_match(&self, id: Uuid) -> Result<bool, StoreError> {
        let released = self.slot.release(id).await?;
        if released {
            self.schedule_advance();
        }
        Ok(released)
    }

    async fn advance(&self) -> Result<Option<MatchState>, StoreError> {
        self.check_queue_and_prompt().await
    }

    fn schedule_advance(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.drain_delay).await;
            if let Err(e) = this.check_queue_and_prompt().await {
                warn!(error = %e, "Queue drain failed");
            }
        })
    }
}
