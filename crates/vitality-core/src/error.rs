//! Error types for Vitality
//!
//! One taxonomy for every engine operation:
//! - Malformed input
//! - Operations illegal in the current lifecycle state
//! - Conversions exceeding the available XP
//! - Unknown users, challenges or instances
//! - Lock contention the caller should retry
//!
//! Replayed claims and conversions are not errors; they succeed with the
//! original outcome.

use std::fmt;

/// Result alias used across the workspace
pub type Result<T, E = QuestError> = std::result::Result<T, E>;

/// Main engine error type
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestError {
    /// Malformed input, e.g. a negative delta
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Operation not legal for the current lifecycle state
    #[error("invalid state: cannot {operation} while {state}")]
    InvalidState {
        /// Attempted operation
        operation: &'static str,
        /// Observed state
        state: String,
    },

    /// Conversion exceeds the XP available for conversion
    #[error("insufficient balance: requires {required} XP, {available} available")]
    InsufficientBalance {
        /// XP the request needs
        required: u64,
        /// XP available for conversion
        available: u64,
    },

    /// Unknown entity
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind
        kind: EntityKind,
        /// Entity identifier
        id: String,
    },

    /// Could not acquire the per-key lock in time; retry
    #[error("conflict on {key}: {reason}")]
    Conflict {
        /// Contended key
        key: String,
        /// Reason
        reason: String,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Ledger journal failed verification
    #[error("ledger integrity violation at sequence {sequence}: {reason}")]
    Integrity {
        /// First offending journal sequence
        sequence: u64,
        /// What failed
        reason: String,
    },
}

impl QuestError {
    /// Create invalid argument error
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create invalid state error
    #[inline]
    pub fn invalid_state(operation: &'static str, state: impl fmt::Display) -> Self {
        Self::InvalidState {
            operation,
            state: state.to_string(),
        }
    }

    /// Create not found error
    #[inline]
    pub fn not_found(kind: EntityKind, id: impl fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Create conflict error
    #[inline]
    pub fn conflict(key: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::Conflict {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if the caller should retry
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Check if the error is the caller's fault
    #[inline]
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument(_)
                | Self::InvalidState { .. }
                | Self::InsufficientBalance { .. }
                | Self::NotFound { .. }
        )
    }
}

/// Kinds of entity an error can refer to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// User
    User,
    /// Challenge template
    Challenge,
    /// Challenge instance
    Instance,
    /// Department or team
    Unit,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::Challenge => "challenge",
            Self::Instance => "challenge instance",
            Self::Unit => "unit",
        };
        f.write_str(name)
    }
}
