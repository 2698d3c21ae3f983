use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Inactive,
    Active,
}

impl MatchStatus {
    /// inactive --start--> active --finish--> inactive
    pub fn can_transition_to(&self, to: &MatchStatus) -> bool {
        matches!(
            (self, to),
            (MatchStatus::Inactive, MatchStatus::Active) | (MatchStatus::Active, MatchStatus::Inactive)
        )
    }
}

/// The single system-wide match slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    pub id: Uuid,
    pub players: [String; 2],
    pub status: MatchStatus,
    pub started_at: DateTime<Utc>,
}

impl MatchState {
    pub fn active(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            players: [a.into(), b.into()],
            status: MatchStatus::Active,
            started_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == MatchStatus::Active
    }

    pub fn includes(&self, name: &str) -> bool {
        self.players.iter().any(|p| p == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(MatchStatus::Inactive.can_transition_to(&MatchStatus::Active));
        assert!(MatchStatus::Active.can_transition_to(&MatchStatus::Inactive));
        assert!(!MatchStatus::Active.can_transition_to(&MatchStatus::Active));
        assert!(!MatchStatus::Inactive.can_transition_to(&MatchStatus::Inactive));
    }

    #[test]
    fn test_participants() {
        let m = MatchState::active("alice", "bob");
        assert!(m.is_active());
        assert!(m.includes("alice"));
        assert!(!m.includes("carol"));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&MatchStatus::Active).unwrap();
        assert_eq!(json, "\"active\"");
    }
}
