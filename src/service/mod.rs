// Engines layered over the shared store
pub mod lobby;
pub mod match_slot;
pub mod matchmaking;
pub mod player_registry;
pub mod queue_matchmaker;
pub mod round_engine;
pub mod upcoming_matchmaker;

#[cfg(test)]
mod lobby_test;

pub use lobby::{Lobby, LobbyOutcome};
pub use match_slot::{Admission, MatchSlot};
pub use matchmaking::{Matchmaker, Matchmaking, MatchmakingPolicy};
pub use player_registry::PlayerRegistry;
pub use queue_matchmaker::{QueueMatchmaker, StartOutcome};
pub use round_engine::{ChooseOutcome, RoundEngine};
pub use upcoming_matchmaker::{ProposalOutcome, UpcomingMatchmaker};
