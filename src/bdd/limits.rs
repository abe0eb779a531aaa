//! Node-count and wall-clock budgets shared by every "limited" BDD operation.
//!
//! Per suspension points are exactly the BDD operations invoked
//! with a time or node limit; each either completes or returns a `None`-style
//! sentinel. There is no internal cancellation inside a single BDD package
//! call (the underlying package has no yield points), so a limit is enforced
//! by checking the *deadline* before starting an operation and the *resulting
//! size* immediately after -- if either is already blown, the caller gets
//! `None` and must treat it as "skip this refinement" (never as an error).

use std::time::{Duration, Instant};

/// A monotonic deadline. `None` means "no deadline" (unbounded).
///
/// Mirrors the config convention used throughout where a
/// negative number means "unbounded": constructing a `TimeLimit` from a
/// negative number of seconds yields [`TimeLimit::unbounded`].
#[derive(Debug, Clone, Copy)]
pub struct TimeLimit {
    deadline: Option<Instant>,
}

impl TimeLimit {
    pub fn unbounded() -> Self {
        TimeLimit { deadline: None }
    }

    pub fn from_secs(secs: f64) -> Self {
        if secs < 0.0 {
            Self::unbounded()
        } else {
            TimeLimit {
                deadline: Some(Instant::now() + Duration::from_secs_f64(secs)),
            }
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.deadline, Some(d) if Instant::now() >= d)
    }
}

/// A node-count budget. `None` means "unbounded".
///
/// When a negative node limit is combined with a positive time limit, the
/// time limit wins and the node limit is ignored -- callers pass
/// `NodeLimit::unbounded()` alongside a finite `TimeLimit` whenever the
/// source config supplied a negative count.
#[derive(Debug, Clone, Copy)]
pub struct NodeLimit {
    max_nodes: Option<usize>,
}

impl NodeLimit {
    pub fn unbounded() -> Self {
        NodeLimit { max_nodes: None }
    }

    pub fn from_signed(n: i64) -> Self {
        if n < 0 {
            Self::unbounded()
        } else {
            NodeLimit {
                max_nodes: Some(n as usize),
            }
        }
    }

    pub fn exceeded_by(&self, size: usize) -> bool {
        matches!(self.max_nodes, Some(max) if size > max)
    }
}

/// The combined budget accepted by every limited operation in [`super::BddManager`].
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub nodes: NodeLimit,
    pub time: TimeLimit,
}

impl Budget {
    pub fn unbounded() -> Self {
        Budget {
            nodes: NodeLimit::unbounded(),
            time: TimeLimit::unbounded(),
        }
    }

    pub fn new(nodes: NodeLimit, time: TimeLimit) -> Self {
        Budget { nodes, time }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_seconds_is_unbounded() {
        assert!(!TimeLimit::from_secs(-1.0).is_expired());
    }

    #[test]
    fn zero_time_budget_expires_immediately() {
        std::thread::sleep(Duration::from_millis(1));
        assert!(TimeLimit::from_secs(0.0).is_expired());
    }

    #[test]
    fn negative_node_limit_is_unbounded() {
        assert!(!NodeLimit::from_signed(-1).exceeded_by(1_000_000));
    }

    #[test]
    fn node_limit_trips_past_threshold() {
        let lim = NodeLimit::from_signed(10);
        assert!(!lim.exceeded_by(10));
        assert!(lim.exceeded_by(11));
    }
}
