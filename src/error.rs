//! Error taxonomy for the symbolic planner core.
//!
//! Per the propagation policy: no exceptions escape the engine. Only the
//! non-recoverable faults listed here (bad configuration, proven
//! unsolvability surfaced through the public API, a goal whose bw
//! constraints could not be applied within budget) are ever returned as
//! `Err`. Budget trip-outs inside a single BDD operation
//! (`BddLimitReached`) and a single direction's step timeout
//! (`StepTimeLimit`) are recovered locally by the search loop and never
//! escape as errors -- they are sentinels/flags consumed internally.

use thiserror::Error;

pub type SymbolicResult<T> = std::result::Result<T, SymbolicError>;

/// Errors that can legitimately escape the public API of this crate.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SymbolicError {
    /// An unsupported combination of configuration options was requested.
    /// Reported before any work begins; no resources are held at that point.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Disambiguation proved that the initial state or the goal is
    /// intrinsically mutex; the task is provably unsolvable.
    #[error("task is unsolvable: {0}")]
    TaskUnsolvable(String),

    /// The backward constraints could not be applied to the goal within its
    /// time budget. The task keeps working with the raw, untightened goal
    /// BDD; this variant is surfaced to the caller as a diagnostic, not as a
    /// hard failure path (search still proceeds).
    #[error("goal constraint application exceeded its time budget")]
    GoalConstraintFailed,
}
