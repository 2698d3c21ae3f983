use super::match_slot::{Admission, MatchSlot};
use super::matchmaking::{Matchmaker, MatchmakingPolicy};
use crate::bus::ChangeStream;
use crate::models::{check_pair, compact, Compaction, MatchState, Rejection, UpcomingMatch, UpcomingStatus};
use crate::store::{Mutation, RecordKey, SharedStore, StoreError, SyncContext};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProposalOutcome {
    Proposed { upcoming: UpcomingMatch },
    Rejected { reason: Rejection },
}

/// Proposal/approval matchmaking: a challenge becomes a pending upcoming
/// match that is promoted into the slot when accepted or when the slot frees up.
#[derive(Clone)]
pub struct UpcomingMatchmaker<S> {
    ctx: SyncContext<S>,
    slot: MatchSlot<S>,
    drain_delay: Duration,
    retention: Duration,
    poll_interval: Duration,
}

impl<S: SharedStore> UpcomingMatchmaker<S> {
    pub fn new(
        ctx: SyncContext<S>,
        slot: MatchSlot<S>,
        drain_delay: Duration,
        retention: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            ctx,
            slot,
            drain_delay,
            retention,
            poll_interval,
        }
    }

    pub fn slot(&self) -> &MatchSlot<S> {
        &self.slot
    }

    // =============================================================================
    // PROPOSALS
    // =============================================================================

    /// The duplicate check runs inside the optimistic write, so two racing
    /// proposals for one pair cannot both land.
    pub async fn create_upcoming_match(&self, p1: &str, p2: &str) -> Result<ProposalOutcome, StoreError> {
        if let Err(reason) = check_pair(p1, p2) {
            return Ok(ProposalOutcome::Rejected { reason });
        }

        let now = Utc::now();
        let retention = self.retention;
        let outcome = self
            .update(|list| {
                let duplicate = list
                    .iter()
                    .find(|m| m.is_pending() && m.same_pair(p1, p2) && !m.is_expired(now, retention));
                if let Some(existing) = duplicate {
                    return (
                        false,
                        ProposalOutcome::Rejected {
                            reason: Rejection::DuplicateProposal { existing: existing.id },
                        },
                    );
                }
                let upcoming = UpcomingMatch::new(p1, p2);
                list.push(upcoming.clone());
                (true, ProposalOutcome::Proposed { upcoming })
            })
            .await?;

        match &outcome {
            ProposalOutcome::Proposed { upcoming } => {
                info!(upcoming_id = %upcoming.id, player_a = %p1, player_b = %p2, "Match proposed");
            }
            ProposalOutcome::Rejected { reason } => {
                debug!(player_a = %p1, player_b = %p2, reason = %reason, "Proposal rejected");
            }
        }
        Ok(outcome)
    }

    /// Promote pending proposal `id` into the match slot.
    pub async fn try_start_match(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.promote(id).await?.is_some())
    }

    /// Withdraw a pending proposal. Unknown or settled ids are left alone.
    pub async fn cancel_upcoming_match(&self, id: Uuid) -> Result<bool, StoreError> {
        let found = self
            .update(|list| {
                let cancelled = list
                    .iter_mut()
                    .find(|m| m.id == id)
                    .is_some_and(|m| m.transition(UpcomingStatus::Cancelled));
                (cancelled, cancelled)
            })
            .await?;

        if found {
            info!(upcoming_id = %id, "Proposal cancelled");
        }
        Ok(found)
    }

    /// Promote the oldest live pending proposal if the slot is free.
    pub async fn start_next_upcoming_match(&self) -> Result<Option<MatchState>, StoreError> {
        if self.slot.current().await?.is_some() {
            return Ok(None);
        }

        let now = Utc::now();
        let next = self
            .upcoming()
            .await?
            .into_iter()
            .find(|m| m.is_pending() && !m.is_expired(now, self.retention));
        match next {
            Some(upcoming) => self.promote(upcoming.id).await,
            None => Ok(None),
        }
    }

    // =============================================================================
    // READS
    // =============================================================================

    pub async fn upcoming(&self) -> Result<Vec<UpcomingMatch>, StoreError> {
        Ok(self
            .ctx
            .read::<Vec<UpcomingMatch>>(RecordKey::Upcoming)
            .await?
            .unwrap_or_default())
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<UpcomingMatch>, StoreError> {
        Ok(self.upcoming().await?.into_iter().find(|m| m.id == id))
    }

    /// Pending proposals that involve `name`
    pub async fn pending_for(&self, name: &str) -> Result<Vec<UpcomingMatch>, StoreError> {
        let mut list = self.upcoming().await?;
        list.retain(|m| m.is_pending() && m.involves(name));
        Ok(list)
    }

    pub async fn watch_upcoming(&self) -> Result<ChangeStream<Vec<UpcomingMatch>>, StoreError> {
        ChangeStream::spawn(self.ctx.clone(), RecordKey::Upcoming, self.poll_interval).await
    }

    /// Like [`try_start_match`](Self::try_start_match), returning the started match.
    pub async fn promote(&self, id: Uuid) -> Result<Option<MatchState>, StoreError> {
        let Some(upcoming) = self.get(id).await?.filter(UpcomingMatch::is_pending) else {
            debug!(upcoming_id = %id, "No pending proposal to promote");
            return Ok(None);
        };

        let [a, b] = &upcoming.players;
        let state = match self.slot.activate(a, b).await? {
            Admission::Admitted(state) => state,
            Admission::Occupied(_) => return Ok(None),
        };

        let marked = self
            .update(|list| {
                let ready = list
                    .iter_mut()
                    .find(|m| m.id == id)
                    .is_some_and(|m| m.transition(UpcomingStatus::Ready));
                (ready, ready)
            })
            .await?;
        if !marked {
            // Withdrawn or pruned between our read and the admission
            warn!(upcoming_id = %id, match_id = %state.id, "Proposal no longer pending, releasing its match");
            self.slot.release(state.id).await?;
            return Ok(None);
        }

        info!(upcoming_id = %id, match_id = %state.id, "Proposal promoted");
        Ok(Some(state))
    }

    /// Read-modify-write of the upcoming list. `step` reports whether it
    /// changed anything; every real write also compacts the list.
    async fn update<R, F>(&self, mut step: F) -> Result<R, StoreError>
    where
        R: Send,
        F: FnMut(&mut Vec<UpcomingMatch>) -> (bool, R) + Send,
    {
        let retention = self.retention;
        let (result, report) = self
            .ctx
            .modify(RecordKey::Upcoming, |list: Option<Vec<UpcomingMatch>>| {
                let mut list = list.unwrap_or_default();
                let (changed, result) = step(&mut list);
                if !changed {
                    return Mutation::Keep((result, None));
                }
                let report = compact(&mut list, Utc::now(), retention);
                Mutation::Put(list, (result, Some(report)))
            })
            .await?;

        if let Some(report) = report {
            log_compaction(&report);
        }
        Ok(result)
    }
}

fn log_compaction(report: &Compaction) {
    if report.cancelled > 0 || report.expired > 0 {
        debug!(cancelled = report.cancelled, expired = report.expired, "Upcoming list compacted");
    }
    for id in &report.expired_pending {
        warn!(upcoming_id = %id, "Pending proposal expired before it was promoted");
    }
}

impl<S: SharedStore> Matchmaker for UpcomingMatchmaker<S> {
    fn policy(&self) -> MatchmakingPolicy {
        MatchmakingPolicy::Upcoming
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
        self.start_next_upcoming_match().await
    }

    fn schedule_advance(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(this.drain_delay).await;
            if let Err(e) = this.start_next_upcoming_match().await {
                warn!(error = %e, "Upcoming drain failed");
            }
        })
    }
}
