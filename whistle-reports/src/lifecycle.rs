//! Report status state machine.
//!
//! ```text
//! pending ──► underReview ──► awaitingInfo
//!                 ▲   │            │
//!                 └───┼────────────┘  (reporter reply)
//!                     ▼
//!        resolved | closed | rejected
//! ```
//!
//! Any non-terminal state may also move to `closed` (administrative
//! closure). Terminal states have no outgoing transitions.

use serde::{Deserialize, Serialize};

use crate::models::Author;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReportStatus {
    Pending,
    UnderReview,
    AwaitingInfo,
    Resolved,
    Closed,
    Rejected,
}

impl ReportStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Resolved | Self::Closed | Self::Rejected)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "underReview",
            Self::AwaitingInfo => "awaitingInfo",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("cannot move report from {from} to {to}")]
pub struct InvalidTransition {
    pub from: ReportStatus,
    pub to: ReportStatus,
}

/// Check whether `actor` may move a report from `from` to `to`.
pub fn check_transition(
    from: ReportStatus,
    to: ReportStatus,
    actor: Author,
) -> Result<(), InvalidTransition> {
    use ReportStatus::*;

    let allowed = match actor {
        Author::Reporter => matches!((from, to), (AwaitingInfo, UnderReview)),
        Author::CaseHandler => match (from, to) {
            (f, _) if f.is_terminal() => false,
            (_, Closed) => true,
            (Pending, UnderReview) => true,
            (UnderReview, AwaitingInfo) => true,
            (UnderReview, Resolved | Rejected) => true,
            _ => false,
        },
    };

    if allowed {
        Ok(())
    } else {
        Err(InvalidTransition { from, to })
    }
}

/// Transitions that carry a message as part of the same step.
pub fn requires_message(from: ReportStatus, to: ReportStatus) -> bool {
    matches!(
        (from, to),
        (ReportStatus::UnderReview, ReportStatus::AwaitingInfo)
            | (ReportStatus::AwaitingInfo, ReportStatus::UnderReview)
    )
}
