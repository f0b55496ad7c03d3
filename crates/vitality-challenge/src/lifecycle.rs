//! Challenge instance lifecycle
//!
//! ```text
//! Locked -> Active -> Completed -> Claimed
//!             |           |
//!             +-> Expired <+
//! ```
//!
//! `Claimed` and `Expired` are terminal.

use serde::{Deserialize, Serialize};
use std::fmt;
use vitality_core::{QuestError, Result};

/// Lifecycle state of a challenge instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    /// Waiting for the window start or a prerequisite
    Locked,
    /// Accepting progress
    Active,
    /// Target reached, reward not yet claimed
    Completed,
    /// Reward paid out
    Claimed,
    /// Window closed without a claim
    Expired,
}

impl ChallengeStatus {
    /// Whether no further transition is possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }

    /// Snake-case name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Claimed => "claimed",
            Self::Expired => "expired",
        }
    }

    /// Operation that moves an instance into this state
    fn verb(self) -> &'static str {
        match self {
            Self::Locked => "lock",
            Self::Active => "activate",
            Self::Completed => "complete",
            Self::Claimed => "claim",
            Self::Expired => "expire",
        }
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States reachable from `from` in one step
#[must_use]
pub fn allowed_transitions(from: ChallengeStatus) -> &'static [ChallengeStatus] {
    use ChallengeStatus::{Active, Claimed, Completed, Expired, Locked};
    match from {
        Locked => &[Active],
        Active => &[Completed, Expired],
        Completed => &[Claimed, Expired],
        Claimed | Expired => &[],
    }
}

/// Validates a state transition.
///
/// # Errors
/// `QuestError::InvalidState` naming the attempted operation and the
/// current state
pub fn validate_transition(from: ChallengeStatus, to: ChallengeStatus) -> Result<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(QuestError::invalid_state(to.verb(), from))
    }
}
