//! Commit State Definitions
//!
//! ```text
//! UNBOUND → PROBING → CREATING ─┐
//!              │    → UPDATING ─┼→ BOUND
//!              │    → MERGING  ─┘
//!              └───────────────→ BOUND   (CREATE_ONLY, record exists)
//!
//! any non-terminal state → FAILED
//! ```

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitState {
    /// No entry id yet
    Unbound,
    /// Looking for an existing record by qualifier fields
    Probing,
    Creating,
    Updating,
    Merging,
    /// Terminal: record exists in the target store
    Bound,
    /// Terminal: commit aborted
    Failed,
}

impl CommitState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, CommitState::Bound | CommitState::Failed)
    }

    /// Check a transition against the commit state machine
    pub fn can_transition_to(&self, next: CommitState) -> bool {
        use CommitState::*;
        match (self, next) {
            (Bound | Failed, _) => false,
            (_, Failed) => true,
            (Unbound, Probing) => true,
            (Probing, Creating | Updating | Merging | Bound) => true,
            (Creating | Updating | Merging, Bound) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Unbound => "UNBOUND",
            CommitState::Probing => "PROBING",
            CommitState::Creating => "CREATING",
            CommitState::Updating => "UPDATING",
            CommitState::Merging => "MERGING",
            CommitState::Bound => "BOUND",
            CommitState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
