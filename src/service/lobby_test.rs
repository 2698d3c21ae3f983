#[cfg(test)]
mod tests {
    use crate::bus::NotificationBus;
    use crate::config::LobbyConfig;
    use crate::models::{MatchState, Move, RegisterOutcome, Rejection, RoundResult, UpcomingStatus};
    use crate::service::{
        ChooseOutcome, Lobby, LobbyOutcome, Matchmaker, MatchmakingPolicy, StartOutcome,
    };
    use crate::store::MemoryStore;
    use std::time::Duration;

    /// Helper to build one actor on a shared store and bus
    fn actor(store: &MemoryStore, bus: &NotificationBus, policy: MatchmakingPolicy) -> Lobby<MemoryStore> {
        let config = LobbyConfig {
            policy,
            ..LobbyConfig::default()
        };
        Lobby::new(store.clone(), bus.clone(), &config)
    }

    async fn login(store: &MemoryStore, bus: &NotificationBus, policy: MatchmakingPolicy, name: &str) -> Lobby<MemoryStore> {
        let lobby = actor(store, bus, policy);
        let outcome = tokio_test::assert_ok!(lobby.register(name).await);
        assert!(outcome.is_success(), "{name} should register");
        lobby
    }

    async fn wait_for_match(lobby: &Lobby<MemoryStore>) -> MatchState {
        for _ in 0..50 {
            if let Some(state) = lobby.slot().current().await.unwrap() {
                return state;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no match became active");
    }

    #[tokio::test]
    async fn test_full_round_scenario() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let alice = login(&store, &bus, MatchmakingPolicy::Queue, "alice").await;
        let bob = login(&store, &bus, MatchmakingPolicy::Queue, "bob").await;

        let online = alice.registry().online_players().await.unwrap();
        assert_eq!(online.len(), 2);

        let started = alice.challenge("bob").await.unwrap();
        let LobbyOutcome::Started { state } = started else {
            panic!("expected a started match, got {started:?}");
        };
        assert_eq!(state.players, ["alice".to_string(), "bob".to_string()]);
        assert!(state.is_active());

        alice.enter_game().await.unwrap().unwrap();
        alice.choose(Move::Rock).await.unwrap();
        // Bob arriving late must not wipe alice's move
        let round = bob.enter_game().await.unwrap().unwrap();
        assert_eq!(round.choice_a, Some(Move::Rock));

        let outcome = bob.choose(Move::Scissors).await.unwrap();
        let ChooseOutcome::Resolved { round, winner } = outcome else {
            panic!("round should resolve");
        };
        assert_eq!(round.result, RoundResult::ParticipantA);
        assert_eq!(winner.as_deref(), Some("alice"));
        assert_eq!(alice.registry().get("alice").await.unwrap().unwrap().score, 1);
        assert_eq!(alice.registry().get("bob").await.unwrap().unwrap().score, 0);

        let cleared = alice.matchmaking().finish_match().await.unwrap();
        assert_eq!(cleared.map(|m| m.id), Some(state.id));
        assert!(alice.slot().current().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_busy_slot_enqueues_requester() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let alice = login(&store, &bus, MatchmakingPolicy::Queue, "alice").await;
        login(&store, &bus, MatchmakingPolicy::Queue, "bob").await;
        let carol = login(&store, &bus, MatchmakingPolicy::Queue, "carol").await;

        alice.challenge("bob").await.unwrap();
        assert_eq!(
            carol.challenge("alice").await.unwrap(),
            LobbyOutcome::Enqueued { position: 1 }
        );
        // Re-asking keeps a single entry
        assert_eq!(
            carol.challenge("bob").await.unwrap(),
            LobbyOutcome::Enqueued { position: 1 }
        );

        let queue = carol.matchmaking().as_queue().unwrap().queue().await.unwrap();
        assert_eq!(queue.iter().collect::<Vec<_>>(), vec!["carol"]);
    }

    #[tokio::test]
    async fn test_self_challenge_rejected() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let alice = login(&store, &bus, MatchmakingPolicy::Queue, "alice").await;

        assert_eq!(
            alice.challenge("alice").await.unwrap(),
            LobbyOutcome::Rejected {
                reason: Rejection::SelfChallenge
            }
        );
        let anonymous = actor(&store, &bus, MatchmakingPolicy::Queue);
        assert_eq!(
            anonymous.challenge("alice").await.unwrap(),
            LobbyOutcome::Rejected {
                reason: Rejection::NotLoggedIn
            }
        );
    }

    #[tokio::test]
    async fn test_queue_drain_pairs_head_with_free_player() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let carol = login(&store, &bus, MatchmakingPolicy::Queue, "carol").await;
        login(&store, &bus, MatchmakingPolicy::Queue, "dave").await;

        let queue = carol.matchmaking().as_queue().unwrap();
        queue.enqueue("carol").await.unwrap();

        let started = queue.check_queue_and_prompt().await.unwrap().unwrap();
        assert_eq!(started.players, ["carol".to_string(), "dave".to_string()]);
        assert!(queue.queue().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queue_head_waits_without_opponent() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let carol = login(&store, &bus, MatchmakingPolicy::Queue, "carol").await;
        let queue = carol.matchmaking().as_queue().unwrap();
        queue.enqueue("carol").await.unwrap();

        assert!(queue.force_check_queue().await.unwrap().is_none());
        assert_eq!(queue.queue().await.unwrap().head(), Some("carol"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_leaving_match_drains_queue_after_delay() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let alice = login(&store, &bus, MatchmakingPolicy::Queue, "alice").await;
        login(&store, &bus, MatchmakingPolicy::Queue, "bob").await;
        let carol = login(&store, &bus, MatchmakingPolicy::Queue, "carol").await;

        alice.challenge("bob").await.unwrap();
        carol.challenge("bob").await.unwrap();

        assert!(alice.leave_match().await.unwrap());
        assert!(alice.slot().current().await.unwrap().is_none());
        assert!(alice.rounds().current().await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(500)).await;
        let next = alice.slot().current().await.unwrap().unwrap();
        assert_eq!(next.players, ["carol".to_string(), "alice".to_string()]);
        let queue = alice.matchmaking().as_queue().unwrap().queue().await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_starts_admit_exactly_one() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(256);
        let names = ["p0", "p1", "p2", "p3", "p4", "p5"];
        let mut lobbies = Vec::new();
        for name in names {
            lobbies.push(login(&store, &bus, MatchmakingPolicy::Queue, name).await);
        }

        let mut handles = Vec::new();
        for (i, lobby) in lobbies.into_iter().enumerate() {
            let opponent = names[(i + 1) % names.len()];
            handles.push(tokio::spawn(async move {
                let queue = lobby.matchmaking().as_queue().unwrap().clone();
                queue.try_start_match(names[i], opponent).await
            }));
        }

        let mut started = 0;
        let mut enqueued = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                StartOutcome::Started { .. } => started += 1,
                StartOutcome::Enqueued { .. } => enqueued += 1,
                StartOutcome::Rejected { reason } => panic!("unexpected rejection: {reason}"),
            }
        }
        assert_eq!(started, 1);
        assert_eq!(enqueued, names.len() - 1);
    }

    #[tokio::test]
    async fn test_reactor_drains_after_foreign_clear() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let alice = login(&store, &bus, MatchmakingPolicy::Queue, "alice").await;
        login(&store, &bus, MatchmakingPolicy::Queue, "bob").await;
        let carol = login(&store, &bus, MatchmakingPolicy::Queue, "carol").await;
        let reactor = carol.spawn_reactor();

        alice.challenge("bob").await.unwrap();
        carol.challenge("alice").await.unwrap();

        // Clearing without a drain leaves the work to other actors
        alice.matchmaking().as_queue().unwrap().clear_match().await.unwrap();

        let next = wait_for_match(&carol).await;
        assert!(next.includes("carol"));
        reactor.abort();
    }

    #[tokio::test]
    async fn test_logout_leaves_match_and_queue() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let alice = login(&store, &bus, MatchmakingPolicy::Queue, "alice").await;
        let bob = login(&store, &bus, MatchmakingPolicy::Queue, "bob").await;
        let carol = login(&store, &bus, MatchmakingPolicy::Queue, "carol").await;

        alice.challenge("bob").await.unwrap();
        carol.challenge("alice").await.unwrap();

        assert_eq!(carol.logout().await.unwrap().as_deref(), Some("carol"));
        assert_eq!(bob.logout().await.unwrap().as_deref(), Some("bob"));

        assert!(alice.slot().current().await.unwrap().is_none());
        assert!(alice.matchmaking().as_queue().unwrap().queue().await.unwrap().is_empty());
        assert!(!alice.registry().get("bob").await.unwrap().unwrap().online);

        // The name is free again
        let again = actor(&store, &bus, MatchmakingPolicy::Queue);
        assert!(matches!(
            again.register("bob").await.unwrap(),
            RegisterOutcome::Registered { returning: true, .. }
        ));
    }

    #[tokio::test]
    async fn test_play_again_resets_round() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let alice = login(&store, &bus, MatchmakingPolicy::Queue, "alice").await;
        let bob = login(&store, &bus, MatchmakingPolicy::Queue, "bob").await;
        alice.challenge("bob").await.unwrap();
        alice.enter_game().await.unwrap();
        alice.choose(Move::Paper).await.unwrap();
        bob.choose(Move::Paper).await.unwrap();

        let fresh = bob.play_again().await.unwrap().unwrap();
        assert_eq!(fresh.result, RoundResult::Unset);
        assert_eq!(fresh.choice_a, None);

        let outsider = login(&store, &bus, MatchmakingPolicy::Queue, "carol").await;
        assert!(outsider.play_again().await.unwrap().is_none());
        assert!(outsider.enter_game().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_proposal_rejected() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let a = login(&store, &bus, MatchmakingPolicy::Upcoming, "a").await;
        let b = login(&store, &bus, MatchmakingPolicy::Upcoming, "b").await;

        let LobbyOutcome::Proposed { upcoming } = a.challenge("b").await.unwrap() else {
            panic!("first proposal should be created");
        };
        assert_eq!(
            b.challenge("a").await.unwrap(),
            LobbyOutcome::Rejected {
                reason: Rejection::DuplicateProposal { existing: upcoming.id }
            }
        );

        assert_eq!(b.decline(upcoming.id).await.unwrap(), LobbyOutcome::Withdrawn);
        assert!(matches!(
            b.challenge("a").await.unwrap(),
            LobbyOutcome::Proposed { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_accepted_proposals_run_one_at_a_time() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let a = login(&store, &bus, MatchmakingPolicy::Upcoming, "a").await;
        let b = login(&store, &bus, MatchmakingPolicy::Upcoming, "b").await;
        let c = login(&store, &bus, MatchmakingPolicy::Upcoming, "c").await;
        let d = login(&store, &bus, MatchmakingPolicy::Upcoming, "d").await;

        let LobbyOutcome::Proposed { upcoming: first } = a.challenge("b").await.unwrap() else {
            panic!("proposal expected");
        };
        let LobbyOutcome::Proposed { upcoming: second } = c.challenge("d").await.unwrap() else {
            panic!("proposal expected");
        };

        assert_eq!(
            c.accept(first.id).await.unwrap(),
            LobbyOutcome::Rejected {
                reason: Rejection::NotInvolved
            }
        );
        assert!(matches!(b.accept(first.id).await.unwrap(), LobbyOutcome::Started { .. }));
        assert_eq!(d.accept(second.id).await.unwrap(), LobbyOutcome::Deferred);

        let upcoming = a.matchmaking().as_upcoming().unwrap();
        assert_eq!(upcoming.get(first.id).await.unwrap().unwrap().status, UpcomingStatus::Ready);
        assert_eq!(
            a.accept(first.id).await.unwrap(),
            LobbyOutcome::Rejected {
                reason: Rejection::UnknownProposal
            }
        );
        assert!(upcoming.pending_for("a").await.unwrap().is_empty());
        assert_eq!(upcoming.pending_for("d").await.unwrap().len(), 1);

        assert!(a.leave_match().await.unwrap());
        tokio::time::sleep(Duration::from_millis(500)).await;

        let next = a.slot().current().await.unwrap().unwrap();
        assert_eq!(next.players, ["c".to_string(), "d".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_proposal_operations() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let a = login(&store, &bus, MatchmakingPolicy::Upcoming, "a").await;
        let upcoming = a.matchmaking().as_upcoming().unwrap();
        let id = uuid::Uuid::new_v4();

        assert!(!upcoming.try_start_match(id).await.unwrap());
        assert!(!upcoming.cancel_upcoming_match(id).await.unwrap());
        assert!(upcoming.start_next_upcoming_match().await.unwrap().is_none());
        assert_eq!(
            a.accept(id).await.unwrap(),
            LobbyOutcome::Rejected {
                reason: Rejection::UnknownProposal
            }
        );
    }

    #[tokio::test]
    async fn test_stale_proposals_pruned_on_write() {
        let store = MemoryStore::new();
        let bus = NotificationBus::new(64);
        let config = LobbyConfig {
            policy: MatchmakingPolicy::Upcoming,
            upcoming_retention: Duration::from_millis(10),
            ..LobbyConfig::default()
        };
        let lobby = Lobby::new(store.clone(), bus.clone(), &config);
        let upcoming = lobby.matchmaking().as_upcoming().unwrap();

        upcoming.create_upcoming_match("a", "b").await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        upcoming.create_upcoming_match("c", "d").await.unwrap();

        let list = upcoming.upcoming().await.unwrap();
        assert_eq!(list.len(), 1);
        assert!(list[0].same_pair("d", "c"));
    }
}
