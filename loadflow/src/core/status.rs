//! Durability states reported for completed batches.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How far a batch has progressed towards the destination.
///
/// Variants are ordered: a later state implies every earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchState {
    /// Records were read and handed to an accumulator.
    Processed,
    /// Records were staged (buffered or uploaded) but are not yet queryable.
    Staged,
    /// Records were durably written to the destination.
    Persisted,
    /// Records are durable and no further work remains for them.
    Complete,
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Processed => write!(f, "PROCESSED"),
            Self::Staged => write!(f, "STAGED"),
            Self::Persisted => write!(f, "PERSISTED"),
            Self::Complete => write!(f, "COMPLETE"),
        }
    }
}

impl BatchState {
    /// Returns true if records in this state are safe to acknowledge upstream.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        *self >= Self::Persisted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_state_ordering() {
        assert!(BatchState::Processed < BatchState::Staged);
        assert!(BatchState::Persisted < BatchState::Complete);
        assert!(BatchState::Complete.is_persisted());
        assert!(BatchState::Persisted.is_persisted());
        assert!(!BatchState::Staged.is_persisted());
    }

    #[test]
    fn test_batch_state_serialize() {
        let json = serde_json::to_string(&BatchState::Complete).unwrap();
        assert_eq!(json, r#""COMPLETE""#);

        let state: BatchState = serde_json::from_str(r#""STAGED""#).unwrap();
        assert_eq!(state, BatchState::Staged);
        assert_eq!(state.to_string(), "STAGED");
    }
}
