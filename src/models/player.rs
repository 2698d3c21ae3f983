use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How many credited round ids a record remembers
const AWARD_MEMORY: usize = 16;

/// Presence and score for one identity. Never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub name: String,
    pub score: i64,
    pub online: bool,
    pub last_seen: DateTime<Utc>,
    /// Rounds already credited to this player, newest last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_awards: Vec<Uuid>,
}

impl PlayerRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            score: 0,
            online: true,
            last_seen: Utc::now(),
            recent_awards: Vec::new(),
        }
    }

    pub fn touch(&mut self) {
        self.last_seen = Utc::now();
    }

    /// Credit one point for `round`. Returns false if that round was
    /// already credited.
    pub fn credit(&mut self, round: Uuid) -> bool {
        if self.recent_awards.contains(&round) {
            return false;
        }
        self.score += 1;
        self.recent_awards.push(round);
        if self.recent_awards.len() > AWARD_MEMORY {
            let excess = self.recent_awards.len() - AWARD_MEMORY;
            self.recent_awards.drain(..excess);
        }
        self.touch();
        true
    }
}

/// Outcome of a registration attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RegisterOutcome {
    /// Record created, or an offline record reactivated
    Registered { player: PlayerRecord, returning: bool },
    /// A record with this name is currently online
    AlreadyOnline,
    Rejected { reason: super::Rejection },
}

impl RegisterOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RegisterOutcome::Registered { .. })
    }
}

/// Highest score first, ties broken by name
pub fn rank(players: &mut [PlayerRecord]) {
    players.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
}
