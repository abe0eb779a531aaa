//! The symbolic state node: one entry in a direction's node pool, lazily
//! holding the BDD of the set of states it represents.

use crate::bdd::Bdd;
use crate::transition::Cost;

pub type NodeId = usize;

/// Sentinel `parent_id` for a root node.
pub const ROOT_PARENT: isize = -1;
/// Sentinel `parent_id` for a node created by merging several equal-priority
/// open nodes (step 9).
pub const MERGED_PARENT: isize = -2;

#[derive(Debug, Clone)]
pub struct SymbolicNode {
    pub id: NodeId,
    pub parent_id: isize,
    /// Non-empty only for a merged node (`parent_id == MERGED_PARENT`).
    pub parent_ids: Vec<NodeId>,
    /// The transition group that produced this node; `None` for roots.
    pub trans_id: Option<usize>,
    pub cost: Cost,
    pub heur: i64,
    /// Lazily constructed from the parent node plus `trans_id`.
    pub bdd: Option<Bdd>,
    pub is_closed: bool,
}

impl SymbolicNode {
    /// `f_value = cost.hard ⊕ max(heur, 0)`.
    pub fn f_value(&self) -> i64 {
        self.cost.hard + self.heur.max(0)
    }

    pub fn is_root(&self) -> bool {
        self.parent_id == ROOT_PARENT
    }

    pub fn is_merged(&self) -> bool {
        self.parent_id == MERGED_PARENT
    }
}
