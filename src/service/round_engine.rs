use super::player_registry::PlayerRegistry;
use crate::bus::ChangeStream;
use crate::models::{ChoiceEffect, Move, RoundState};
use crate::store::{Mutation, RecordKey, SharedStore, StoreError, SyncContext};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ChooseOutcome {
    NoRound,
    NotParticipant,
    AlreadyResolved,
    Recorded { round: RoundState },
    Resolved { round: RoundState, winner: Option<String> },
}

/// Moves and results for the round belonging to the active match
#[derive(Clone)]
pub struct RoundEngine<S> {
    ctx: SyncContext<S>,
    registry: PlayerRegistry<S>,
    poll_interval: Duration,
}

impl<S: SharedStore> RoundEngine<S> {
    pub fn new(ctx: SyncContext<S>, registry: PlayerRegistry<S>, poll_interval: Duration) -> Self {
        Self {
            ctx,
            registry,
            poll_interval,
        }
    }

    /// Replace whatever round is stored with a fresh one for `a` vs `b`.
    pub async fn init(&self, a: &str, b: &str) -> Result<RoundState, StoreError> {
        let round = RoundState::new(a, b);
        let displaced = self
            .ctx
            .modify(RecordKey::Round, |current: Option<RoundState>| {
                Mutation::Put(round.clone(), current)
            })
            .await?;
        self.settle_displaced(displaced).await?;
        info!(round_id = %round.id, player_a = %a, player_b = %b, "Round initialised");
        Ok(round)
    }

    /// The round for `a` vs `b`. A stored round for that pair is kept with
    /// its moves; anything else is replaced by a fresh round.
    pub async fn ensure(&self, a: &str, b: &str) -> Result<RoundState, StoreError> {
        let (round, displaced) = self
            .ctx
            .modify(RecordKey::Round, |current: Option<RoundState>| match current {
                Some(round) if round.is_for_pair(a, b) => Mutation::Keep((round, None)),
                other => {
                    let fresh = RoundState::new(a, b);
                    Mutation::Put(fresh.clone(), (fresh, other))
                }
            })
            .await?;
        self.settle_displaced(displaced).await?;

        if round.award_pending() {
            return Ok(self.complete_award(&round).await?.unwrap_or(round));
        }
        Ok(round)
    }

    /// Record `who`'s move. The actor whose write resolves the round awards
    /// the point; a later call retries an award that did not go through.
    pub async fn choose(&self, who: &str, mv: Move) -> Result<ChooseOutcome, StoreError> {
        let mut outcome = self
            .ctx
            .modify(RecordKey::Round, |round: Option<RoundState>| {
                let Some(mut round) = round else {
                    return Mutation::Keep(ChooseOutcome::NoRound);
                };
                match round.apply_choice(who, mv) {
                    ChoiceEffect::NotParticipant => Mutation::Keep(ChooseOutcome::NotParticipant),
                    ChoiceEffect::AlreadyResolved => Mutation::Keep(ChooseOutcome::AlreadyResolved),
                    ChoiceEffect::Recorded => {
                        Mutation::Put(round.clone(), ChooseOutcome::Recorded { round })
                    }
                    ChoiceEffect::Resolved(_) => {
                        let winner = round.winner().map(str::to_owned);
                        Mutation::Put(round.clone(), ChooseOutcome::Resolved { round, winner })
                    }
                }
            })
            .await?;

        match &mut outcome {
            ChooseOutcome::Resolved { round, winner } => {
                info!(
                    round_id = %round.id,
                    player_a = %round.a,
                    player_b = %round.b,
                    winner = winner.as_deref().unwrap_or("draw"),
                    "Round resolved"
                );
                if round.award_pending() {
                    if let Some(marked) = self.complete_award(round).await? {
                        *round = marked;
                    }
                }
            }
            ChooseOutcome::AlreadyResolved => {
                self.settle().await?;
            }
            ChooseOutcome::Recorded { .. } => debug!(player = %who, "Move recorded"),
            other => debug!(player = %who, outcome = ?other, "Move ignored"),
        }
        Ok(outcome)
    }

    /// Clear both moves, keeping the pair. Never touches scores.
    pub async fn reset(&self) -> Result<Option<RoundState>, StoreError> {
        let (round, displaced) = self
            .ctx
            .modify(RecordKey::Round, |round: Option<RoundState>| match round {
                None => Mutation::Keep((None, None)),
                Some(round) if round.is_untouched() => Mutation::Keep((Some(round), None)),
                Some(round) => {
                    let fresh = round.fresh();
                    Mutation::Put(fresh.clone(), (Some(fresh), Some(round)))
                }
            })
            .await?;
        self.settle_displaced(displaced).await?;
        Ok(round)
    }

    /// Discard the round of `a` vs `b` when their match ends. A round that
    /// already belongs to another pair is left alone.
    pub async fn clear_for(&self, a: &str, b: &str) -> Result<bool, StoreError> {
        let (cleared, displaced) = self
            .ctx
            .modify(RecordKey::Round, |round: Option<RoundState>| match round {
                Some(round) if round.is_for_pair(a, b) => Mutation::Clear((true, Some(round))),
                _ => Mutation::Keep((false, None)),
            })
            .await?;
        self.settle_displaced(displaced).await?;
        Ok(cleared)
    }

    /// Credit the winner of the stored round if that has not happened yet.
    pub async fn settle(&self) -> Result<Option<RoundState>, StoreError> {
        match self.current().await? {
            Some(round) if round.award_pending() => {
                Ok(Some(self.complete_award(&round).await?.unwrap_or(round)))
            }
            other => Ok(other),
        }
    }

    pub async fn current(&self) -> Result<Option<RoundState>, StoreError> {
        self.ctx.read(RecordKey::Round).await
    }

    pub async fn watch(&self) -> Result<ChangeStream<RoundState>, StoreError> {
        ChangeStream::spawn(self.ctx.clone(), RecordKey::Round, self.poll_interval).await
    }

    /// Award the point for `round`, then flag it scored. Returns the stored
    /// round if it is still the same one.
    async fn complete_award(&self, round: &RoundState) -> Result<Option<RoundState>, StoreError> {
        self.award(round).await?;
        let id = round.id;
        self.ctx
            .modify(RecordKey::Round, |current: Option<RoundState>| match current {
                Some(mut stored) if stored.id == id => {
                    if stored.scored {
                        Mutation::Keep(Some(stored))
                    } else {
                        stored.scored = true;
                        Mutation::Put(stored.clone(), Some(stored))
                    }
                }
                _ => Mutation::Keep(None),
            })
            .await
    }

    async fn award(&self, round: &RoundState) -> Result<(), StoreError> {
        if let Some(winner) = round.winner() {
            self.registry.award_round(winner, round.id).await?;
        }
        Ok(())
    }

    /// A replaced round takes its pending award with it unless credited here.
    async fn settle_displaced(&self, displaced: Option<RoundState>) -> Result<(), StoreError> {
        match displaced {
            Some(round) if round.award_pending() => self.award(&round).await,
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::NotificationBus;
    use crate::models::RoundResult;
    use crate::store::testing::{FlakyStore, GatedStore};
    use crate::store::MemoryStore;

    struct Fixture {
        registry: PlayerRegistry<MemoryStore>,
        rounds: RoundEngine<MemoryStore>,
    }

    async fn fixture(store: &MemoryStore) -> Fixture {
        let ctx = SyncContext::new(store.clone(), NotificationBus::new(16), 8);
        let registry = PlayerRegistry::new(ctx.clone(), Duration::from_secs(60));
        for name in ["alice", "bob"] {
            registry.register(name).await.unwrap();
        }
        let rounds = RoundEngine::new(ctx, registry.clone(), Duration::from_secs(60));
        Fixture { registry, rounds }
    }

    async fn score(registry: &PlayerRegistry<MemoryStore>, name: &str) -> i64 {
        registry.get(name).await.unwrap().unwrap().score
    }

    #[tokio::test]
    async fn test_choose_without_round_is_no_op() {
        let store = MemoryStore::new();
        let f = fixture(&store).await;
        let outcome = f.rounds.choose("alice", Move::Rock).await.unwrap();
        assert_eq!(outcome, ChooseOutcome::NoRound);
        assert!(f.rounds.current().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decisive_round_scores_winner_once() {
        let store = MemoryStore::new();
        let f = fixture(&store).await;
        f.rounds.init("alice", "bob").await.unwrap();

        f.rounds.choose("alice", Move::Rock).await.unwrap();
        let outcome = f.rounds.choose("bob", Move::Scissors).await.unwrap();
        assert!(matches!(
            outcome,
            ChooseOutcome::Resolved { ref winner, .. } if winner.as_deref() == Some("alice")
        ));

        // Late moves after resolution change nothing
        assert_eq!(
            f.rounds.choose("bob", Move::Rock).await.unwrap(),
            ChooseOutcome::AlreadyResolved
        );
        assert_eq!(score(&f.registry, "alice").await, 1);
        assert_eq!(score(&f.registry, "bob").await, 0);
    }

    #[tokio::test]
    async fn test_draw_awards_nothing() {
        let store = MemoryStore::new();
        let f = fixture(&store).await;
        f.rounds.init("alice", "bob").await.unwrap();
        f.rounds.choose("alice", Move::Paper).await.unwrap();
        f.rounds.choose("bob", Move::Paper).await.unwrap();

        let round = f.rounds.current().await.unwrap().unwrap();
        assert_eq!(round.result, RoundResult::Draw);
        assert_eq!(score(&f.registry, "alice").await, 0);
        assert_eq!(score(&f.registry, "bob").await, 0);
    }

    #[tokio::test]
    async fn test_outsider_move_ignored() {
        let store = MemoryStore::new();
        let f = fixture(&store).await;
        f.rounds.init("alice", "bob").await.unwrap();
        assert_eq!(
            f.rounds.choose("mallory", Move::Rock).await.unwrap(),
            ChooseOutcome::NotParticipant
        );
    }

    #[tokio::test]
    async fn test_reset_is_idempotent_and_keeps_scores() {
        let store = MemoryStore::new();
        let f = fixture(&store).await;
        f.rounds.init("alice", "bob").await.unwrap();
        f.rounds.choose("alice", Move::Paper).await.unwrap();
        f.rounds.choose("bob", Move::Rock).await.unwrap();

        let once = f.rounds.reset().await.unwrap().unwrap();
        let twice = f.rounds.reset().await.unwrap().unwrap();
        assert!(once.is_untouched());
        assert!(once.is_for_pair("alice", "bob"));
        assert_eq!(once, twice);
        assert_eq!(score(&f.registry, "alice").await, 1);
    }

    #[tokio::test]
    async fn test_simultaneous_final_moves_score_once() {
        let store = MemoryStore::new();
        let f = fixture(&store).await;
        f.rounds.init("alice", "bob").await.unwrap();

        let bus = NotificationBus::new(16);
        let alice_ctx = SyncContext::new(store.clone(), bus.clone(), 8);
        let bob_ctx = SyncContext::new(store.clone(), bus, 8);
        let alice = RoundEngine::new(
            alice_ctx.clone(),
            PlayerRegistry::new(alice_ctx, Duration::from_secs(60)),
            Duration::from_secs(60),
        );
        let bob = RoundEngine::new(
            bob_ctx.clone(),
            PlayerRegistry::new(bob_ctx, Duration::from_secs(60)),
            Duration::from_secs(60),
        );

        let (a, b) = tokio::join!(
            alice.choose("alice", Move::Scissors),
            bob.choose("bob", Move::Paper)
        );
        let resolved = [a.unwrap(), b.unwrap()]
            .into_iter()
            .filter(|o| matches!(o, ChooseOutcome::Resolved { .. }))
            .count();

        assert_eq!(resolved, 1);
        assert_eq!(score(&f.registry, "alice").await, 1);
    }

    #[tokio::test]
    async fn test_clear_only_discards_own_pair() {
        let store = MemoryStore::new();
        let f = fixture(&store).await;
        f.rounds.init("carol", "dave").await.unwrap();

        assert!(!f.rounds.clear_for("alice", "bob").await.unwrap());
        let kept = f.rounds.current().await.unwrap().unwrap();
        assert!(kept.is_for_pair("carol", "dave"));

        assert!(f.rounds.clear_for("carol", "dave").await.unwrap());
        assert!(!f.rounds.clear_for("carol", "dave").await.unwrap());
        assert_eq!(f.rounds.reset().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ensure_keeps_recorded_move() {
        let store = MemoryStore::new();
        let f = fixture(&store).await;
        let first = f.rounds.ensure("alice", "bob").await.unwrap();
        f.rounds.choose("alice", Move::Rock).await.unwrap();

        let again = f.rounds.ensure("alice", "bob").await.unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.choice_a, Some(Move::Rock));

        let other = f.rounds.ensure("carol", "dave").await.unwrap();
        assert!(other.is_untouched());
        assert_ne!(other.id, first.id);
    }

    #[tokio::test]
    async fn test_late_ensure_does_not_wipe_move() {
        let memory = MemoryStore::new();
        let f = fixture(&memory).await;
        let gated = GatedStore::new(memory.clone(), RecordKey::Round);
        let bus = NotificationBus::new(16);
        let bob_ctx = SyncContext::new(gated.clone(), bus, 8);
        let bob = RoundEngine::new(
            bob_ctx.clone(),
            PlayerRegistry::new(bob_ctx, Duration::from_secs(60)),
            Duration::from_secs(60),
        );

        // Bob reads "no round" and stalls before writing
        gated.arm();
        let pending = tokio::spawn(async move { bob.ensure("alice", "bob").await });
        gated.reached().await;

        f.rounds.ensure("alice", "bob").await.unwrap();
        let recorded = f.rounds.choose("alice", Move::Rock).await.unwrap();
        assert!(matches!(recorded, ChooseOutcome::Recorded { .. }));

        gated.release();
        let seen_by_bob = pending.await.unwrap().unwrap();
        assert_eq!(seen_by_bob.choice_a, Some(Move::Rock));

        let stored = f.rounds.current().await.unwrap().unwrap();
        assert_eq!(stored.choice_a, Some(Move::Rock));
    }

    #[tokio::test]
    async fn test_failed_award_is_retried_once() {
        let memory = MemoryStore::new();
        let flaky = FlakyStore::new(memory.clone(), RecordKey::Players);
        let ctx = SyncContext::new(flaky.clone(), NotificationBus::new(16), 8);
        let registry = PlayerRegistry::new(ctx.clone(), Duration::from_secs(60));
        for name in ["alice", "bob"] {
            registry.register(name).await.unwrap();
        }
        let rounds = RoundEngine::new(ctx, registry.clone(), Duration::from_secs(60));
        rounds.init("alice", "bob").await.unwrap();
        rounds.choose("alice", Move::Rock).await.unwrap();

        flaky.fail_next(1);
        assert!(rounds.choose("bob", Move::Scissors).await.is_err());
        let stranded = rounds.current().await.unwrap().unwrap();
        assert!(stranded.award_pending());
        assert_eq!(registry.get("alice").await.unwrap().unwrap().score, 0);

        assert_eq!(
            rounds.choose("bob", Move::Scissors).await.unwrap(),
            ChooseOutcome::AlreadyResolved
        );
        assert_eq!(registry.get("alice").await.unwrap().unwrap().score, 1);
        assert!(rounds.current().await.unwrap().unwrap().scored);

        rounds.choose("alice", Move::Paper).await.unwrap();
        rounds.settle().await.unwrap();
        assert_eq!(registry.get("alice").await.unwrap().unwrap().score, 1);
    }

    #[tokio::test]
    async fn test_replacing_unscored_round_credits_winner() {
        let memory = MemoryStore::new();
        let flaky = FlakyStore::new(memory.clone(), RecordKey::Players);
        let ctx = SyncContext::new(flaky.clone(), NotificationBus::new(16), 8);
        let registry = PlayerRegistry::new(ctx.clone(), Duration::from_secs(60));
        for name in ["alice", "bob"] {
            registry.register(name).await.unwrap();
        }
        let rounds = RoundEngine::new(ctx, registry.clone(), Duration::from_secs(60));
        rounds.init("alice", "bob").await.unwrap();
        rounds.choose("alice", Move::Paper).await.unwrap();

        flaky.fail_next(1);
        assert!(rounds.choose("bob", Move::Rock).await.is_err());

        let fresh = rounds.reset().await.unwrap().unwrap();
        assert!(fresh.is_untouched());
        assert_eq!(registry.get("alice").await.unwrap().unwrap().score, 1);
    }
}
