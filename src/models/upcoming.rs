use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpcomingStatus {
    Pending,
    Ready,
    Cancelled,
}

impl UpcomingStatus {
    pub fn can_transition_to(&self, to: &UpcomingStatus) -> bool {
        matches!(
            (self, to),
            (UpcomingStatus::Pending, UpcomingStatus::Ready)
                | (UpcomingStatus::Pending, UpcomingStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, UpcomingStatus::Pending)
    }
}

/// A proposed match waiting to be promoted into the match slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingMatch {
    pub id: Uuid,
    pub players: [String; 2],
    pub created_at: DateTime<Utc>,
    pub status: UpcomingStatus,
}

impl UpcomingMatch {
    pub fn new(p1: impl Into<String>, p2: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            players: [p1.into(), p2.into()],
            created_at: Utc::now(),
            status: UpcomingStatus::Pending,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == UpcomingStatus::Pending
    }

    /// Unordered pair comparison
    pub fn same_pair(&self, a: &str, b: &str) -> bool {
        let [x, y] = &self.players;
        (x == a && y == b) || (x == b && y == a)
    }

    pub fn involves(&self, name: &str) -> bool {
        self.players.iter().any(|p| p == name)
    }

    pub fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        // A record from the future (clock skew between actors) is never expired
        (now - self.created_at)
            .to_std()
            .map(|age| age > retention)
            .unwrap_or(false)
    }

    /// Apply a status change if the FSM allows it
    pub fn transition(&mut self, to: UpcomingStatus) -> bool {
        if self.status.can_transition_to(&to) {
            self.status = to;
            true
        } else {
            false
        }
    }
}

/// What a compaction pass removed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compaction {
    pub cancelled: usize,
    pub expired: usize,
    /// Proposals dropped for age before anyone promoted or withdrew them
    pub expired_pending: Vec<Uuid>,
}

/// Drop cancelled records and anything older than `retention`, whatever its status.
pub fn compact(list: &mut Vec<UpcomingMatch>, now: DateTime<Utc>, retention: Duration) -> Compaction {
    let mut report = Compaction::default();
    list.retain(|m| {
        if m.status == UpcomingStatus::Cancelled {
            report.cancelled += 1;
            return false;
        }
        if m.is_expired(now, retention) {
            report.expired += 1;
            if m.is_pending() {
                report.expired_pending.push(m.id);
            }
            return false;
        }
        true
    });
    report
}
