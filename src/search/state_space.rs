//! The open heaps and closed tree, built on `binary_heap_plus::BinaryHeap` +
//! `compare::Compare` to give a plain-data heap entry a custom ranking.
//!
//! `open_by_f` and `open_by_g` conceptually share nodes, as two pairing
//! heaps linked through separate hook fields, so that popping from
//! one also detaches the entry from the other. `binary_heap_plus` has no
//! such hooks, so both heaps instead hold copies of the same lightweight
//! `(cost, heur, id)` triple and `next_open` performs the detach with lazy
//! deletion: a popped id is recorded, and stale copies are skipped the next
//! time they would surface at the top of the other heap.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use binary_heap_plus::BinaryHeap;
use compare::Compare;

use crate::bdd::{Bdd, BddManager};
use crate::search::node::NodeId;
use crate::search::pool::NodePool;
use crate::transition::Cost;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    id: NodeId,
    cost: Cost,
    heur: i64,
}

impl Entry {
    fn f(&self) -> i64 {
        self.cost.hard + self.heur.max(0)
    }
}

/// Orders entries so the smallest `(f, cost.hard, cost.zero_cost_tag, heur)`
/// tuple sorts greatest, i.e. ends up on top of `binary_heap_plus`'s
/// (max-first) heap. The tag keeps zero-cost transitions from collapsing
/// into the same bucket as positive-cost ones at equal f/g.
struct ByF;
impl Compare<Entry> for ByF {
    fn compare(&self, a: &Entry, b: &Entry) -> std::cmp::Ordering {
        (b.f(), b.cost.hard, b.cost.zero_cost_tag, b.heur).cmp(&(a.f(), a.cost.hard, a.cost.zero_cost_tag, a.heur))
    }
}

/// Orders entries so the smallest `(cost.hard, cost.zero_cost_tag, f, heur)`
/// tuple sorts greatest.
struct ByG;
impl Compare<Entry> for ByG {
    fn compare(&self, a: &Entry, b: &Entry) -> std::cmp::Ordering {
        (b.cost.hard, b.cost.zero_cost_tag, b.f(), b.heur).cmp(&(a.cost.hard, a.cost.zero_cost_tag, a.f(), a.heur))
    }
}

pub struct StateSpace {
    open_by_f: BinaryHeap<Entry, ByF>,
    open_by_g: BinaryHeap<Entry, ByG>,
    /// Ids popped from one heap but not yet observed (and skipped) at the
    /// top of the other.
    detached: HashSet<NodeId>,
    closed: BTreeSet<(Cost, i64, NodeId)>,
    all_closed: Bdd,
    all_closed_by_g: Option<BTreeMap<i64, Bdd>>,
    pub bound: i64,
}

impl StateSpace {
    pub fn new(manager: &BddManager, track_closed_by_g: bool) -> Self {
        StateSpace {
            open_by_f: BinaryHeap::from_vec_cmp(Vec::new(), ByF),
            open_by_g: BinaryHeap::from_vec_cmp(Vec::new(), ByG),
            detached: HashSet::new(),
            closed: BTreeSet::new(),
            all_closed: manager.mk_false(),
            all_closed_by_g: if track_closed_by_g { Some(BTreeMap::new()) } else { None },
            bound: i64::MAX,
        }
    }

    pub fn push_open(&mut self, pool: &NodePool, id: NodeId) {
        let n = pool.get(id);
        let e = Entry { id, cost: n.cost, heur: n.heur };
        self.open_by_f.push(e);
        self.open_by_g.push(e);
    }

    /// `NextOpen`: pops the f-min from `open_by_f`, also detaching it from
    /// `open_by_g`.
    pub fn next_open(&mut self) -> Option<NodeId> {
        let popped = loop {
            let e = self.open_by_f.pop()?;
            if self.detached.remove(&e.id) {
                continue;
            }
            break e;
        };
        self.detached.insert(popped.id);
        self.drain_stale_g();
        Some(popped.id)
    }

    fn drain_stale_g(&mut self) {
        while let Some(&top) = self.open_by_g.peek() {
            if self.detached.contains(&top.id) {
                self.open_by_g.pop();
                self.detached.remove(&top.id);
            } else {
                break;
            }
        }
    }

    pub fn min_open_f(&self) -> Option<i64> {
        self.open_by_f.peek().map(|e| e.f())
    }

    /// Peeks the current f-minimum without popping it, skipping (and
    /// discarding) any stale detached entries first.
    pub fn peek_open(&mut self) -> Option<(NodeId, Cost, i64)> {
        loop {
            let top = *self.open_by_f.peek()?;
            if self.detached.contains(&top.id) {
                self.open_by_f.pop();
                self.detached.remove(&top.id);
                continue;
            }
            return Some((top.id, top.cost, top.heur));
        }
    }

    pub fn is_open_empty(&self) -> bool {
        self.open_by_f.is_empty()
    }

    /// `Close(n)`: marks `n` closed, inserts into the closed tree, and
    /// merges `n.bdd` into `all_closed` (and `all_closed_by_g` if enabled).
    pub fn close(&mut self, manager: &BddManager, pool: &mut NodePool, id: NodeId) {
        let bdd = pool.get(id).bdd.clone().unwrap_or_else(|| manager.mk_false());
        let (cost, heur) = {
            let n = pool.get_mut(id);
            n.is_closed = true;
            (n.cost, n.heur)
        };
        self.closed.insert((cost, heur, id));
        self.all_closed = manager.or(&self.all_closed, &bdd);
        if let Some(by_g) = &mut self.all_closed_by_g {
            let entry = by_g.entry(cost.hard).or_insert_with(|| manager.mk_false());
            *entry = manager.or(entry, &bdd);
        }
    }

    /// `RemoveClosedStates(s, cost)`: subtracts every already-closed state
    /// from `s`. When the by-g map is tracked, only subtracts buckets whose
    /// g-value does not exceed `cost` -- cheaper, and sufficient, since a
    /// node with `g > cost` cannot re-close anything reachable at `cost`.
    pub fn remove_closed_states(&self, manager: &BddManager, s: &Bdd, cost: i64) -> Bdd {
        match &self.all_closed_by_g {
            None => manager.and(s, &manager.not(&self.all_closed)),
            Some(by_g) => {
                let mut result = s.clone();
                for (&g, closed_g) in by_g.range(..=cost) {
                    let _ = g;
                    result = manager.and(&result, &manager.not(closed_g));
                }
                result
            }
        }
    }

    pub fn all_closed(&self) -> &Bdd {
        &self.all_closed
    }

    pub fn closed_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.closed.iter().map(|&(_, _, id)| id)
    }

    /// Iterates closed node ids in ascending g-value order (used by the
    /// bi-directional meet check, step 6).
    pub fn closed_ascending_by_g(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.closed.iter().map(|&(_, _, id)| id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::pool::NodePool;

    fn mgr() -> BddManager {
        BddManager::new(2, 2, 128)
    }

    #[test]
    fn next_open_pops_f_minimum() {
        let manager = mgr();
        let mut space = StateSpace::new(&manager, false);
        let mut pool = NodePool::new();
        let a = pool.add(-1, None, Cost::new(5), 0);
        let b = pool.add(-1, None, Cost::new(1), 0);
        space.push_open(&pool, a);
        space.push_open(&pool, b);
        assert_eq!(space.next_open(), Some(b));
        assert_eq!(space.next_open(), Some(a));
        assert_eq!(space.next_open(), None);
    }

    #[test]
    fn detaching_from_f_also_detaches_from_g() {
        let manager = mgr();
        let mut space = StateSpace::new(&manager, false);
        let mut pool = NodePool::new();
        let a = pool.add(-1, None, Cost::new(2), 0);
        space.push_open(&pool, a);
        space.next_open();
        space.drain_stale_g();
        assert!(space.open_by_g.is_empty());
    }

    #[test]
    fn close_merges_into_all_closed() {
        let manager = mgr();
        let mut space = StateSpace::new(&manager, false);
        let mut pool = NodePool::new();
        let id = pool.add_init(manager.mk_true(), 0);
        space.close(&manager, &mut pool, id);
        assert_eq!(space.all_closed(), &manager.mk_true());
    }

    #[test]
    fn remove_closed_states_subtracts_all_closed_without_by_g() {
        let manager = mgr();
        let mut space = StateSpace::new(&manager, false);
        let mut pool = NodePool::new();
        let id = pool.add_init(manager.mk_true(), 0);
        space.close(&manager, &mut pool, id);
        let s = manager.mk_true();
        let remaining = space.remove_closed_states(&manager, &s, 0);
        assert!(manager.is_false(&remaining));
    }

    #[test]
    fn remove_closed_states_respects_g_bucket_when_tracked() {
        let manager = mgr();
        let mut space = StateSpace::new(&manager, true);
        let mut pool = NodePool::new();
        let far = pool.add(-1, None, Cost::new(10), 0);
        pool.add_bdd(far, manager.mk_true());
        space.close(&manager, &mut pool, far);
        let s = manager.mk_true();
        // nothing closed at or below cost 5 yet.
        let remaining = space.remove_closed_states(&manager, &s, 5);
        assert_eq!(remaining, s);
    }
}
