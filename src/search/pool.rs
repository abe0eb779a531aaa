//! The state pool: an extendable array of state structs.
//! `Vec<T>`'s own amortised growth already gives us "lazy growth in
//! fixed-size blocks" without hand-rolled chunking.

use crate::bdd::Bdd;
use crate::search::node::{NodeId, SymbolicNode, MERGED_PARENT, ROOT_PARENT};
use crate::transition::Cost;

#[derive(Debug, Default)]
pub struct NodePool {
    nodes: Vec<SymbolicNode>,
}

impl NodePool {
    pub fn new() -> Self {
        NodePool { nodes: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> &SymbolicNode {
        &self.nodes[id]
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut SymbolicNode {
        &mut self.nodes[id]
    }

    /// `Add`: allocates a node with zeroed costs and no BDD.
    pub fn add(&mut self, parent_id: isize, trans_id: Option<usize>, cost: Cost, heur: i64) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(SymbolicNode {
            id,
            parent_id,
            parent_ids: Vec::new(),
            trans_id,
            cost,
            heur,
            bdd: None,
            is_closed: false,
        });
        id
    }

    /// `AddInit`: allocates the root with a user-supplied heuristic value
    /// and an already-known BDD.
    pub fn add_init(&mut self, bdd: Bdd, heur: i64) -> NodeId {
        let id = self.add(ROOT_PARENT, None, Cost::new(0), heur);
        self.nodes[id].bdd = Some(bdd);
        id
    }

    /// `AddBDD`: sets (clones in) the BDD of an existing node.
    pub fn add_bdd(&mut self, id: NodeId, bdd: Bdd) {
        self.nodes[id].bdd = Some(bdd);
    }

    /// Allocates a merged node (`parent_id = -2`) combining `parent_ids`,
    /// with the given OR-BDD already attached.
    pub fn add_merged(&mut self, parent_ids: Vec<NodeId>, cost: Cost, heur: i64, bdd: Bdd) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(SymbolicNode {
            id,
            parent_id: MERGED_PARENT,
            parent_ids,
            trans_id: None,
            cost,
            heur,
            bdd: Some(bdd),
            is_closed: false,
        });
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_allocates_with_zeroed_costs_and_no_bdd() {
        let mut pool = NodePool::new();
        let id = pool.add(ROOT_PARENT, None, Cost::new(0), 0);
        let n = pool.get(id);
        assert!(n.bdd.is_none());
        assert_eq!(n.cost, Cost::new(0));
    }

    #[test]
    fn merged_node_records_every_parent() {
        let mut pool = NodePool::new();
        let a = pool.add(ROOT_PARENT, None, Cost::new(1), 1);
        let b = pool.add(ROOT_PARENT, None, Cost::new(1), 1);
        let merged = pool.add_merged(vec![a, b], Cost::new(1), 1, crate::bdd::BddManager::new(1, 1, 16).mk_true());
        let n = pool.get(merged);
        assert!(n.is_merged());
        assert_eq!(n.parent_ids, vec![a, b]);
    }
}
