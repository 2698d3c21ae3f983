use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Move {
    Rock,
    Paper,
    Scissors,
}

impl Move {
    pub const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Cyclic dominance: rock > scissors > paper > rock
    pub fn beats(&self, other: &Move) -> bool {
        matches!(
            (self, other),
            (Move::Rock, Move::Scissors) | (Move::Scissors, Move::Paper) | (Move::Paper, Move::Rock)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RoundResult {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "a")]
    ParticipantA,
    #[serde(rename = "b")]
    ParticipantB,
    #[serde(rename = "draw")]
    Draw,
}

impl RoundResult {
    pub fn decide(a: Move, b: Move) -> Self {
        if a == b {
            RoundResult::Draw
        } else if a.beats(&b) {
            RoundResult::ParticipantA
        } else {
            RoundResult::ParticipantB
        }
    }

    pub fn is_decisive(&self) -> bool {
        matches!(self, RoundResult::ParticipantA | RoundResult::ParticipantB)
    }
}

/// Which side of the round a participant occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewerOutcome {
    Win,
    Lose,
    Draw,
}

/// Result of applying one move to a round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceEffect {
    NotParticipant,
    AlreadyResolved,
    /// Move stored, still waiting on the other side
    Recorded,
    /// This move completed the pair and fixed the result
    Resolved(RoundResult),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundState {
    /// New for every fresh round; score awards are keyed by it
    pub id: Uuid,
    pub a: String,
    pub b: String,
    pub choice_a: Option<Move>,
    pub choice_b: Option<Move>,
    pub result: RoundResult,
    /// Set once the winner's point has been recorded
    #[serde(default)]
    pub scored: bool,
}

impl RoundState {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            a: a.into(),
            b: b.into(),
            choice_a: None,
            choice_b: None,
            result: RoundResult::Unset,
            scored: false,
        }
    }

    /// Same pair, both moves cleared
    pub fn fresh(&self) -> Self {
        Self::new(self.a.clone(), self.b.clone())
    }

    /// No move made yet
    pub fn is_untouched(&self) -> bool {
        self.choice_a.is_none() && self.choice_b.is_none() && !self.is_resolved()
    }

    /// Decisive and the winner has not been credited yet
    pub fn award_pending(&self) -> bool {
        self.result.is_decisive() && !self.scored
    }

    pub fn slot_of(&self, name: &str) -> Option<Slot> {
        if self.a == name {
            Some(Slot::A)
        } else if self.b == name {
            Some(Slot::B)
        } else {
            None
        }
    }

    pub fn is_for_pair(&self, a: &str, b: &str) -> bool {
        self.a == a && self.b == b
    }

    pub fn is_resolved(&self) -> bool {
        self.result != RoundResult::Unset
    }

    pub fn choice(&self, slot: Slot) -> Option<Move> {
        match slot {
            Slot::A => self.choice_a,
            Slot::B => self.choice_b,
        }
    }

    /// Store `mv` for `who` and resolve if both sides have now chosen.
    ///
    /// A participant may change their move until the opponent's arrives.
    /// Once resolved the round is frozen until it is replaced.
    pub fn apply_choice(&mut self, who: &str, mv: Move) -> ChoiceEffect {
        if self.is_resolved() {
            return ChoiceEffect::AlreadyResolved;
        }
        match self.slot_of(who) {
            Some(Slot::A) => self.choice_a = Some(mv),
            Some(Slot::B) => self.choice_b = Some(mv),
            None => return ChoiceEffect::NotParticipant,
        }

        match (self.choice_a, self.choice_b) {
            (Some(a), Some(b)) => {
                self.result = RoundResult::decide(a, b);
                ChoiceEffect::Resolved(self.result)
            }
            _ => ChoiceEffect::Recorded,
        }
    }

    pub fn winner(&self) -> Option<&str> {
        match self.result {
            RoundResult::ParticipantA => Some(self.a.as_str()),
            RoundResult::ParticipantB => Some(self.b.as_str()),
            RoundResult::Unset | RoundResult::Draw => None,
        }
    }

    /// A move is hidden from everyone but its owner until the round resolves.
    pub fn visible_move(&self, slot: Slot, viewer: &str) -> Option<Move> {
        if self.is_resolved() || self.slot_of(viewer) == Some(slot) {
            self.choice(slot)
        } else {
            None
        }
    }

    pub fn outcome_for(&self, viewer: &str) -> Option<ViewerOutcome> {
        let slot = self.slot_of(viewer)?;
        match (self.result, slot) {
            (RoundResult::Unset, _) => None,
            (RoundResult::Draw, _) => Some(ViewerOutcome::Draw),
            (RoundResult::ParticipantA, Slot::A) | (RoundResult::ParticipantB, Slot::B) => {
                Some(ViewerOutcome::Win)
            }
            _ => Some(ViewerOutcome::Lose),
        }
    }
}
