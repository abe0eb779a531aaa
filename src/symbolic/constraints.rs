//! Constraint collections derived from the mutex/mgroup structures, built
//! with the And-with-limit merge strategy already used by
//! [`crate::bdd::BddManager::and_limited`].

use crate::bdd::limits::Budget;
use crate::bdd::{Bdd, BddManager};
use crate::fdr::mutex::{MutexGroups, MutexPairs};
use crate::symbolic::variables::SymbolicVariables;

/// Which search direction a constraint collection targets: fw-mutex pairs
/// build the **fw** collection, bw-mutex pairs build the **bw** one;
/// mgroup membership differs between the two (see [`build`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Fw,
    Bw,
}

/// A collection of BDDs, each conjoined into a target state set one at a
/// time (`Apply-Fw` / `Apply-Bw`). Built by greedily merging pairwise under
/// a node/time budget so the collection stays as small as the budget
/// allows without ever exceeding it.
#[derive(Debug, Clone, Default)]
pub struct ConstraintCollection {
    bdds: Vec<Bdd>,
}

impl ConstraintCollection {
    pub fn new() -> Self {
        ConstraintCollection { bdds: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.bdds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bdds.is_empty()
    }

    pub fn bdds(&self) -> &[Bdd] {
        &self.bdds
    }

    /// Greedily merges `bdd` into the existing bucket list: tries an
    /// And-with-limit against each bucket in turn, keeping the merge the
    /// first time it stays within `budget`; appends as a new bucket if no
    /// merge succeeds.
    fn add_merging(&mut self, manager: &BddManager, bdd: Bdd, budget: Budget) {
        for slot in &mut self.bdds {
            if let Some(merged) = manager.and_limited(slot, &bdd, budget) {
                *slot = merged;
                return;
            }
        }
        self.bdds.push(bdd);
    }

    /// `Apply-Fw` / `Apply-Bw`: conjoins every bucket into `target`, in
    /// bucket order.
    pub fn apply(&self, manager: &BddManager, target: &Bdd) -> Bdd {
        let mut result = target.clone();
        for b in &self.bdds {
            result = manager.and(&result, b);
        }
        result
    }

    /// `ApplyBwLimit`: same as [`Self::apply`], but aborts as soon as the
    /// time budget in `budget` expires, returning the *original* `target`
    /// unmodified rather than a partially-conjoined one.
    pub fn apply_limited(&self, manager: &BddManager, target: &Bdd, budget: Budget) -> Option<Bdd> {
        let mut result = target.clone();
        for b in &self.bdds {
            if budget.time.is_expired() {
                return None;
            }
            result = manager.and(&result, b);
        }
        if budget.time.is_expired() {
            None
        } else {
            Some(result)
        }
    }
}

/// Builds the constraint collection for `direction` out of `mutex` and
/// `mgroups`, merging pairwise under `budget`.
///
/// - **Fw** collection: one BDD `¬(pre(f1) ∧ pre(f2))` per fw-mutex pair,
///   plus the disjunction of pre-BDDs for every exactly-one mgroup.
/// - **Bw** collection: same, but over bw-mutex pairs, plus every
///   fam-and-goal mgroup that is not itself exactly-one.
pub fn build(
    vars: &SymbolicVariables,
    manager: &BddManager,
    mutex: &MutexPairs,
    mgroups: &MutexGroups,
    direction: Direction,
    budget: Budget,
) -> ConstraintCollection {
    let mut collection = ConstraintCollection::new();

    for (a, b, flags) in mutex.iter() {
        let matches = match direction {
            Direction::Fw => flags.fw,
            Direction::Bw => flags.bw,
        };
        if matches {
            let bdd = vars.create_mutex_pre(manager, a, b);
            collection.add_merging(manager, bdd, budget);
        }
    }

    for group in mgroups.iter() {
        let include = match direction {
            Direction::Fw => group.is_exactly_one,
            Direction::Bw => group.is_fam_group && group.is_goal && !group.is_exactly_one,
        };
        if include {
            let bdd = vars.create_exactly_one_mgroup_pre(manager, &group.facts);
            collection.add_merging(manager, bdd, budget);
        }
    }

    collection
}

/// Per-group caches used by the transition builder to trim a single
/// operator locally, without invoking the whole collection (/// last paragraph).
pub struct GroupConstraintCache {
    /// `mutex_bdd[g]`: conjunction of every mutex-pair BDD whose facts both
    /// belong to group `g`.
    mutex_bdd: Vec<Bdd>,
    /// `mgroup_bdd[g]`: the exactly-one disjunction BDD of group `g` itself
    /// (identity if `g` isn't exactly-one).
    mgroup_bdd: Vec<Bdd>,
}

impl GroupConstraintCache {
    pub fn build(vars: &SymbolicVariables, manager: &BddManager, mutex: &MutexPairs, mgroups: &MutexGroups) -> Self {
        let mut mutex_bdd = vec![manager.mk_true(); vars.groups().len()];
        for (a, b, flags) in mutex.iter() {
            if !flags.any() {
                continue;
            }
            let (Some(ga), Some(gb)) = (vars.group_of(a), vars.group_of(b)) else {
                continue;
            };
            if ga.id == gb.id {
                let bdd = vars.create_mutex_pre(manager, a, b);
                mutex_bdd[ga.id] = manager.and(&mutex_bdd[ga.id], &bdd);
            }
        }

        let mut mgroup_bdd = vec![manager.mk_true(); vars.groups().len()];
        for group in mgroups.iter() {
            if !group.is_exactly_one {
                continue;
            }
            if let Some(g) = group.facts.first().and_then(|&f| vars.group_of(f)) {
                mgroup_bdd[g.id] = vars.create_exactly_one_mgroup_pre(manager, &group.facts);
            }
        }

        GroupConstraintCache { mutex_bdd, mgroup_bdd }
    }

    pub fn mutex_bdd(&self, group_id: usize) -> &Bdd {
        &self.mutex_bdd[group_id]
    }

    pub fn mgroup_bdd(&self, group_id: usize) -> &Bdd {
        &self.mgroup_bdd[group_id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdd::limits::Budget;
    use crate::bdd::BddManager;
    use crate::fdr::model::FactId;

    fn fixture() -> (BddManager, SymbolicVariables, MutexPairs, MutexGroups) {
        let manager = BddManager::new(8, 4, 1024);
        let groups = vec![vec![FactId(0), FactId(1)], vec![FactId(2), FactId(3)]];
        let vars = SymbolicVariables::new(&manager, groups);
        let mut mutex = MutexPairs::new();
        mutex.add(FactId(1), FactId(3), true, false);
        let mut mgroups = MutexGroups::new();
        mgroups.add(vec![FactId(0), FactId(1)]).is_exactly_one = true;
        (manager, vars, mutex, mgroups)
    }

    #[test]
    fn fw_collection_picks_up_fw_mutex_and_exactly_one() {
        let (manager, vars, mutex, mgroups) = fixture();
        let coll = build(&vars, &manager, &mutex, &mgroups, Direction::Fw, Budget::unbounded());
        assert_eq!(coll.len(), 2);
    }

    #[test]
    fn bw_collection_ignores_fw_only_mutex() {
        let (manager, vars, mutex, mgroups) = fixture();
        let coll = build(&vars, &manager, &mutex, &mgroups, Direction::Bw, Budget::unbounded());
        assert!(coll.is_empty());
    }

    #[test]
    fn apply_conjoins_every_bucket() {
        let (manager, vars, mutex, mgroups) = fixture();
        let coll = build(&vars, &manager, &mutex, &mgroups, Direction::Fw, Budget::unbounded());
        let both_true = manager.and(vars.pre(FactId(1)), vars.pre(FactId(3)));
        let tightened = coll.apply(&manager, &both_true);
        assert!(manager.is_false(&tightened));
    }

    #[test]
    fn apply_limited_aborts_without_corrupting_target_past_deadline() {
        let (manager, vars, mutex, mgroups) = fixture();
        let coll = build(&vars, &manager, &mutex, &mgroups, Direction::Fw, Budget::unbounded());
        let target = manager.mk_true();
        let expired = Budget::new(
            crate::bdd::limits::NodeLimit::unbounded(),
            crate::bdd::limits::TimeLimit::from_secs(0.0),
        );
        std::thread::sleep(std::time::Duration::from_millis(1));
        assert!(coll.apply_limited(&manager, &target, expired).is_none());
    }
}
