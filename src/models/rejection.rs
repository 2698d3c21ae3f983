use serde::Serialize;
use uuid::Uuid;

/// Why a request was refused. Refusals are ordinary outcomes, not errors:
/// nothing was written and the caller can simply try something else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    EmptyName,
    SelfChallenge,
    /// A pending proposal for the same pair must be resolved first
    DuplicateProposal { existing: Uuid },
    UnknownProposal,
    /// The acting identity is not one of the proposal's players
    NotInvolved,
    NotLoggedIn,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::EmptyName => f.write_str("player name must not be empty"),
            Rejection::SelfChallenge => f.write_str("a player cannot challenge themselves"),
            Rejection::DuplicateProposal { existing } => {
                write!(f, "a pending proposal for this pair already exists ({existing})")
            }
            Rejection::UnknownProposal => f.write_str("no pending proposal with that id"),
            Rejection::NotInvolved => f.write_str("player is not part of this proposal"),
            Rejection::NotLoggedIn => f.write_str("no player is logged in on this session"),
        }
    }
}

/// Names are used verbatim; only blank names are refused.
pub fn check_name(name: &str) -> Result<(), Rejection> {
    if name.trim().is_empty() {
        Err(Rejection::EmptyName)
    } else {
        Ok(())
    }
}

pub fn check_pair(a: &str, b: &str) -> Result<(), Rejection> {
    check_name(a)?;
    check_name(b)?;
    if a == b {
        return Err(Rejection::SelfChallenge);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_pair() {
        assert_eq!(check_pair("a", "b"), Ok(()));
        assert_eq!(check_pair("a", "a"), Err(Rejection::SelfChallenge));
        assert_eq!(check_pair("", "b"), Err(Rejection::EmptyName));
        assert_eq!(check_pair("a", "  "), Err(Rejection::EmptyName));
    }

    #[test]
    fn test_serialized_tag() {
        let json = serde_json::to_value(Rejection::SelfChallenge).unwrap();
        assert_eq!(json["kind"], "self_challenge");

        let id = Uuid::new_v4();
        let json = serde_json::to_value(Rejection::DuplicateProposal { existing: id }).unwrap();
        assert_eq!(json["existing"], id.to_string());
    }
}
