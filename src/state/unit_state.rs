//! Lifecycle states of a work unit within a single run
use std::fmt;

/// Represents the current state of a work unit in the crawl process
///
/// ```text
/// PENDING -> IN_FLIGHT -> EXTRACTED -> COMPLETE
///                 |  \
///                 |   -> FAILED
///                 -> PENDING (retry)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    // ===== Active States =====
    /// Queued and waiting for a worker
    Pending,

    /// Dequeued by a worker; the fetch is running
    InFlight,

    /// Fetched and handed to the extractor and paginator
    Extracted,

    // ===== Terminal States =====
    /// Fully processed: fetched, extracted and pagination followed
    Complete,

    /// Permanently failed, or exhausted its retry budget
    Failed,
}

impl UnitState {
    /// Returns true if no further processing will happen in this run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Returns true if the unit is still moving through the pipeline
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Checks whether `self -> next` is a legal transition
    ///
    /// `InFlight -> Pending` is how a retry signal re-queues a unit.
    pub fn can_transition_to(&self, next: UnitState) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Extracted)
                | (Self::InFlight, Self::Failed)
                | (Self::InFlight, Self::Pending)
                | (Self::Extracted, Self::Complete)
        )
    }

    /// Moves to `next`, rejecting illegal transitions
    pub fn transition(self, next: UnitState) -> crate::Result<UnitState> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(crate::TrawlError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Extracted => "extracted",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
