//! Fixed-point disambiguation: tightens a set of facts to a
//! superset that must hold in any state consistent with it, using
//! exactly-one mutex groups and pairwise mutexes. Used both while building
//! the FDR model (forgetting-operator generation) and while
//! tightening the goal before backward search.

use bit_set::BitSet;

use crate::fdr::model::FactId;
use crate::fdr::mutex::{MutexGroups, MutexPairs};

/// Outcome of one [`Disambiguator::disambiguate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisambiguateResult {
    /// No change: the set was already closed under the mgroup/mutex rules.
    Unchanged,
    /// Facts were added; contains the final, tightened fact set.
    Added(Vec<FactId>),
    /// An exactly-one mgroup had zero allowed facts left: the input set is
    /// provably mutex (no consistent state can contain it).
    Mutex,
}

/// Precomputed bitsets over a fixed fact universe, built once per mutex
/// table / mgroup collection and reused across every `disambiguate` call.
pub struct Disambiguator {
    fact_count: usize,
    exactly_one_groups: Vec<Vec<FactId>>,
    /// `not_mutex_fact[f]` is the bitset of facts `g` such that `f` and `g`
    /// are *not* mutex in the requested direction(s) (includes `f` itself).
    not_mutex_fact: Vec<BitSet>,
}

impl Disambiguator {
    /// `fw`/`bw` select which mutex-pair flavour counts as "mutex" for this
    /// disambiguator; callers typically pass `(true, false)` for a
    /// forward-search context and `(false, true)` for a backward one.
    pub fn new(fact_count: usize, mgroups: &MutexGroups, mutex: &MutexPairs, fw: bool, bw: bool) -> Self {
        let exactly_one_groups: Vec<Vec<FactId>> = mgroups
            .iter()
            .filter(|g| g.is_exactly_one)
            .map(|g| g.facts.clone())
            .collect();

        let mut not_mutex_fact = Vec::with_capacity(fact_count);
        for f in 0..fact_count {
            let mut bs = BitSet::with_capacity(fact_count);
            for g in 0..fact_count {
                let flags = mutex.get(FactId(f), FactId(g));
                let is_mutex = (fw && flags.fw) || (bw && flags.bw);
                if !is_mutex {
                    bs.insert(g);
                }
            }
            not_mutex_fact.push(bs);
        }

        Disambiguator {
            fact_count,
            exactly_one_groups,
            not_mutex_fact,
        }
    }

    /// True when `candidate` is pairwise-compatible with every fact in
    /// `facts` under the mutex flavour(s) this disambiguator was built with.
    /// Unlike [`Disambiguator::disambiguate`], this never consults mgroup
    /// membership, so it is safe to call with a `candidate` that belongs to
    /// the very mgroup being tested against `facts`.
    pub fn compatible_with(&self, facts: &[FactId], candidate: FactId) -> bool {
        let compatible = &self.not_mutex_fact[candidate.0];
        facts.iter().all(|f| compatible.contains(f.0))
    }

    /// Tightens `facts` to a fixed point. When `only_disjunct_mgroups` is
    /// true, a group already intersecting `S` is skipped
    /// (it can't contribute a new fact, only confirm one already present).
    pub fn disambiguate(&self, facts: &[FactId], only_disjunct_mgroups: bool) -> DisambiguateResult {
        let mut s = BitSet::with_capacity(self.fact_count);
        for &f in facts {
            s.insert(f.0);
        }

        let mut changed_any = false;
        loop {
            let mut changed = false;
            for group in &self.exactly_one_groups {
                let intersects = group.iter().any(|f| s.contains(f.0));
                if only_disjunct_mgroups && intersects {
                    continue;
                }

                let allowed: Vec<FactId> = group
                    .iter()
                    .copied()
                    .filter(|f| {
                        let mut compatible = self.not_mutex_fact[f.0].clone();
                        compatible.intersect_with(&s);
                        compatible.len() == s.len()
                    })
                    .collect();

                if allowed.is_empty() {
                    return DisambiguateResult::Mutex;
                } else if allowed.len() == 1 && !s.contains(allowed[0].0) {
                    s.insert(allowed[0].0);
                    changed = true;
                    changed_any = true;
                }
            }
            if !changed {
                break;
            }
        }

        if changed_any {
            let mut out: Vec<FactId> = s.iter().map(FactId).collect();
            out.sort_by_key(|f| f.0);
            DisambiguateResult::Added(out)
        } else {
            DisambiguateResult::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(n: usize) -> FactId {
        FactId(n)
    }

    #[test]
    fn singleton_group_gets_added() {
        // facts 0,1 form an exactly-one group; 2 is mutex with 1.
        let mut mgroups = MutexGroups::new();
        mgroups.add(vec![f(0), f(1)]).is_exactly_one = true;
        let mut mutex = MutexPairs::new();
        mutex.add(f(1), f(2), true, true);
        let d = Disambiguator::new(3, &mgroups, &mutex, true, true);

        // S = {2}: group {0,1} doesn't intersect S, and 1 is ruled out by
        // mutex with 2, leaving only 0 allowed -> 0 gets added.
        match d.disambiguate(&[f(2)], true) {
            DisambiguateResult::Added(facts) => assert_eq!(facts, vec![f(0), f(2)]),
            other => panic!("expected Added, got {other:?}"),
        }
    }

    #[test]
    fn fully_ruled_out_group_is_mutex() {
        let mut mgroups = MutexGroups::new();
        mgroups.add(vec![f(0), f(1)]).is_exactly_one = true;
        let mut mutex = MutexPairs::new();
        mutex.add(f(0), f(2), true, true);
        mutex.add(f(1), f(2), true, true);
        let d = Disambiguator::new(3, &mgroups, &mutex, true, true);
        assert_eq!(d.disambiguate(&[f(2)], true), DisambiguateResult::Mutex);
    }

    #[test]
    fn already_closed_set_is_unchanged() {
        let mgroups = MutexGroups::new();
        let mutex = MutexPairs::new();
        let d = Disambiguator::new(2, &mgroups, &mutex, true, true);
        assert_eq!(d.disambiguate(&[f(0)], true), DisambiguateResult::Unchanged);
    }

    #[test]
    fn intersecting_group_is_skipped_when_only_disjunct() {
        let mut mgroups = MutexGroups::new();
        mgroups.add(vec![f(0), f(1)]).is_exactly_one = true;
        let mutex = MutexPairs::new();
        let d = Disambiguator::new(2, &mgroups, &mutex, true, true);
        // S already contains 0, which is in the group: skip it, no change.
        assert_eq!(d.disambiguate(&[f(0)], true), DisambiguateResult::Unchanged);
    }

    #[test]
    fn compatible_with_ignores_mgroup_membership() {
        // 0 and 1 share an exactly-one group, and are also flagged mutex:
        // compatible_with must still report them incompatible directly,
        // without trying to "fix" the set via the group.
        let mut mgroups = MutexGroups::new();
        mgroups.add(vec![f(0), f(1)]).is_exactly_one = true;
        let mut mutex = MutexPairs::new();
        mutex.add(f(0), f(1), true, true);
        let d = Disambiguator::new(2, &mgroups, &mutex, true, true);
        assert!(!d.compatible_with(&[f(0)], f(1)));
        assert!(d.compatible_with(&[f(0)], f(0)));
    }
}
