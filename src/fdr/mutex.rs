//! Mutex pairs and mutex groups: exactly-one fact groups and pairwise
//! fw/bw mutex flags over the fact universe.

use std::collections::HashMap;

use fxhash::FxHashMap;

use super::model::FactId;

/// Unordered pair of distinct facts, stored with the smaller id first so
/// that `(a, b)` and `(b, a)` hash identically.
fn pair_key(a: FactId, b: FactId) -> (FactId, FactId) {
    if a.0 <= b.0 {
        (a, b)
    } else {
        (b, a)
    }
}

/// Direction a mutex pair holds in: discovered against a forward search (an
/// operator's effects can never reach both facts at once), a backward
/// search (symmetric notion from the goal), or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutexFlags {
    pub fw: bool,
    pub bw: bool,
}

impl MutexFlags {
    pub fn none() -> Self {
        MutexFlags { fw: false, bw: false }
    }

    pub fn any(&self) -> bool {
        self.fw || self.bw
    }
}

/// `pddl_mutex_pairs`: a fact×fact table keyed by unordered pair, recording
/// for each present pair whether it holds in the forward and/or backward
/// direction.
#[derive(Debug, Clone, Default)]
pub struct MutexPairs {
    table: FxHashMap<(FactId, FactId), MutexFlags>,
}

impl MutexPairs {
    pub fn new() -> Self {
        MutexPairs {
            table: FxHashMap::default(),
        }
    }

    pub fn add(&mut self, a: FactId, b: FactId, fw: bool, bw: bool) {
        if a == b {
            return;
        }
        let key = pair_key(a, b);
        let entry = self.table.entry(key).or_insert_with(MutexFlags::none);
        entry.fw |= fw;
        entry.bw |= bw;
    }

    pub fn get(&self, a: FactId, b: FactId) -> MutexFlags {
        if a == b {
            return MutexFlags::none();
        }
        self.table
            .get(&pair_key(a, b))
            .copied()
            .unwrap_or_else(MutexFlags::none)
    }

    pub fn is_fw_mutex(&self, a: FactId, b: FactId) -> bool {
        self.get(a, b).fw
    }

    pub fn is_bw_mutex(&self, a: FactId, b: FactId) -> bool {
        self.get(a, b).bw
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Iterates every present pair together with its flags, in unspecified
    /// order.
    pub fn iter(&self) -> impl Iterator<Item = (FactId, FactId, MutexFlags)> + '_ {
        self.table.iter().map(|(&(a, b), &flags)| (a, b, flags))
    }

    /// True iff some fact of `set` is mutex (in the requested direction)
    /// with `fact`: `mutex-set-against-set` specialised to a single fact.
    pub fn fact_mutex_with_any(&self, fact: FactId, set: &[FactId], fw: bool, bw: bool) -> bool {
        set.iter().any(|&other| {
            let flags = self.get(fact, other);
            (fw && flags.fw) || (bw && flags.bw)
        })
    }

    /// True iff some fact of `a` is mutex (in the requested direction) with
    /// some fact of `b` (`mutex-set-against-set`).
    pub fn set_mutex_with_set(&self, a: &[FactId], b: &[FactId], fw: bool, bw: bool) -> bool {
        a.iter().any(|&f| self.fact_mutex_with_any(f, b, fw, bw))
    }

    /// Rewrites every fact id through `remap`, dropping pairs that mention a
    /// fact the map has no entry for (mirrors [`MutexGroups::remap_facts`]).
    pub fn remap_facts(&self, remap: &HashMap<FactId, FactId>) -> MutexPairs {
        let mut out = MutexPairs::new();
        for (a, b, flags) in self.iter() {
            if let (Some(&na), Some(&nb)) = (remap.get(&a), remap.get(&b)) {
                out.add(na, nb, flags.fw, flags.bw);
            }
        }
        out
    }
}

/// `pddl_mgroup`: a set of facts known to be pairwise mutex.
#[derive(Debug, Clone)]
pub struct MutexGroup {
    pub facts: Vec<FactId>,
    /// True if this group is "exactly-one": the initial state and every
    /// reachable state sets exactly one of its facts.
    pub is_exactly_one: bool,
    /// True if this group was derived as a fam-group (a family of mutually
    /// exclusive atoms found by the external LP-based mutex-group finder).
    pub is_fam_group: bool,
    /// True if this group has non-empty intersection with the goal.
    pub is_goal: bool,
}

impl MutexGroup {
    pub fn new(facts: Vec<FactId>) -> Self {
        MutexGroup {
            facts,
            is_exactly_one: false,
            is_fam_group: false,
            is_goal: false,
        }
    }

    pub fn contains(&self, fact: FactId) -> bool {
        self.facts.contains(&fact)
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

/// `pddl_mgroups`: an append-only collection of mutex groups.
#[derive(Debug, Clone, Default)]
pub struct MutexGroups {
    groups: Vec<MutexGroup>,
}

impl MutexGroups {
    pub fn new() -> Self {
        MutexGroups { groups: Vec::new() }
    }

    pub fn add(&mut self, facts: Vec<FactId>) -> &mut MutexGroup {
        self.groups.push(MutexGroup::new(facts));
        self.groups.last_mut().unwrap()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutexGroup> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// `pddlMGroupsSortUniq`: sorts each group's fact list and removes
    /// duplicate groups. Per-group flags are not reset.
    pub fn sort_uniq(&mut self) {
        for g in &mut self.groups {
            g.facts.sort_by_key(|f| f.0);
            g.facts.dedup();
        }
        self.groups.sort_by(|a, b| a.facts.iter().map(|f| f.0).cmp(b.facts.iter().map(|f| f.0)));
        self.groups.dedup_by(|a, b| a.facts == b.facts);
    }

    /// `pddlMGroupsSortBySizeDesc`.
    pub fn sort_by_size_desc(&mut self) {
        self.groups.sort_by(|a, b| b.len().cmp(&a.len()));
    }

    /// Sets `is_goal` on every group that intersects `goal_facts`, returning
    /// how many groups were flagged (`pddlMGroupsSetGoal`).
    pub fn set_goal_flags(&mut self, goal_facts: &[FactId]) -> usize {
        let mut count = 0;
        for g in &mut self.groups {
            g.is_goal = g.facts.iter().any(|f| goal_facts.contains(f));
            if g.is_goal {
                count += 1;
            }
        }
        count
    }

    pub fn num_exactly_one(&self) -> usize {
        self.groups.iter().filter(|g| g.is_exactly_one).count()
    }

    /// `pddlMGroupsGatherExactlyOneFacts`.
    pub fn gather_exactly_one_facts(&self) -> Vec<FactId> {
        let mut out: Vec<FactId> = self
            .groups
            .iter()
            .filter(|g| g.is_exactly_one)
            .flat_map(|g| g.facts.iter().copied())
            .collect();
        out.sort_by_key(|f| f.0);
        out.dedup();
        out
    }

    /// `pddlMGroupsEssentialFacts`: facts that belong to exactly one group
    /// in the whole collection.
    pub fn essential_facts(&self) -> Vec<FactId> {
        let mut occurrences: HashMap<FactId, usize> = HashMap::new();
        for g in &self.groups {
            for &f in &g.facts {
                *occurrences.entry(f).or_insert(0) += 1;
            }
        }
        let mut out: Vec<FactId> = occurrences
            .into_iter()
            .filter(|&(_, count)| count == 1)
            .map(|(f, _)| f)
            .collect();
        out.sort_by_key(|f| f.0);
        out
    }

    /// `pddlMGroupsExtractCoverLargest`: greedily pick non-overlapping
    /// groups, largest first, until every fact mentioned by some group is
    /// covered.
    pub fn extract_cover_largest(&self) -> Vec<MutexGroup> {
        let mut sorted: Vec<&MutexGroup> = self.groups.iter().collect();
        sorted.sort_by(|a, b| b.len().cmp(&a.len()));
        self.extract_cover(sorted)
    }

    /// `pddlMGroupsExtractCoverEssential`: same as above but groups holding
    /// an essential fact are prioritised ahead of size.
    pub fn extract_cover_essential(&self) -> Vec<MutexGroup> {
        let essential: std::collections::HashSet<FactId> =
            self.essential_facts().into_iter().collect();
        let mut sorted: Vec<&MutexGroup> = self.groups.iter().collect();
        sorted.sort_by(|a, b| {
            let a_ess = a.facts.iter().any(|f| essential.contains(f));
            let b_ess = b.facts.iter().any(|f| essential.contains(f));
            b_ess.cmp(&a_ess).then(b.len().cmp(&a.len()))
        });
        self.extract_cover(sorted)
    }

    fn extract_cover(&self, candidates: Vec<&MutexGroup>) -> Vec<MutexGroup> {
        let mut covered = std::collections::HashSet::new();
        let mut cover = Vec::new();
        for g in candidates {
            if g.facts.iter().any(|f| covered.contains(f)) {
                continue;
            }
            covered.extend(g.facts.iter().copied());
            cover.push(g.clone());
        }
        cover
    }

    /// Number of facts covered by at least one group (`pddlMGroupsNumCoveredFacts`).
    pub fn num_covered_facts(&self) -> usize {
        let mut covered = std::collections::HashSet::new();
        for g in &self.groups {
            covered.extend(g.facts.iter().copied());
        }
        covered.len()
    }

    /// `pddlMGroupsRemoveSmall`: drops groups with `size` or fewer facts.
    pub fn remove_small(&mut self, size: usize) {
        self.groups.retain(|g| g.len() > size);
    }

    /// Rewrites every fact id through `remap` (e.g. after the causal-graph
    /// variable ordering renumbers facts), dropping any fact the map has no
    /// entry for. Flags are kept untouched, matching `pddlMGroupsReduce`'s
    /// documented behaviour.
    pub fn remap_facts(&mut self, remap: &HashMap<FactId, FactId>) {
        for g in &mut self.groups {
            g.facts = g.facts.iter().filter_map(|f| remap.get(f).copied()).collect();
        }
    }

    /// `pddlMGroupsRemoveSubsets`: drops a group if some other group in the
    /// collection is a strict superset of its fact set.
    pub fn remove_subsets(&mut self) {
        let facts: Vec<std::collections::BTreeSet<FactId>> = self
            .groups
            .iter()
            .map(|g| g.facts.iter().copied().collect())
            .collect();
        let keep: Vec<bool> = facts
            .iter()
            .enumerate()
            .map(|(i, fi)| {
                !facts
                    .iter()
                    .enumerate()
                    .any(|(j, fj)| i != j && fi.is_subset(fj) && fi.len() < fj.len())
            })
            .collect();
        let mut kept = Vec::new();
        for (g, keep) in self.groups.drain(..).zip(keep) {
            if keep {
                kept.push(g);
            }
        }
        self.groups = kept;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn f(n: usize) -> FactId {
        FactId(n)
    }

    #[test]
    fn mutex_pairs_are_unordered() {
        let mut m = MutexPairs::new();
        m.add(f(1), f(2), true, false);
        assert!(m.is_fw_mutex(f(1), f(2)));
        assert!(m.is_fw_mutex(f(2), f(1)));
        assert!(!m.is_bw_mutex(f(1), f(2)));
    }

    #[test]
    fn self_pairs_are_never_mutex() {
        let mut m = MutexPairs::new();
        m.add(f(1), f(1), true, true);
        assert!(!m.is_fw_mutex(f(1), f(1)));
        assert_eq!(m.len(), 0);
    }

    #[test]
    fn set_mutex_with_set_checks_direction() {
        let mut m = MutexPairs::new();
        m.add(f(1), f(3), false, true);
        assert!(m.set_mutex_with_set(&[f(1), f(2)], &[f(3)], false, true));
        assert!(!m.set_mutex_with_set(&[f(1), f(2)], &[f(3)], true, false));
    }

    #[test]
    fn sort_uniq_dedups_identical_groups() {
        let mut mg = MutexGroups::new();
        mg.add(vec![f(2), f(1)]);
        mg.add(vec![f(1), f(2)]);
        mg.sort_uniq();
        assert_eq!(mg.len(), 1);
        assert_eq!(mg.iter().next().unwrap().facts, vec![f(1), f(2)]);
    }

    #[test]
    fn goal_flags_mark_intersecting_groups() {
        let mut mg = MutexGroups::new();
        mg.add(vec![f(1), f(2)]);
        mg.add(vec![f(3), f(4)]);
        let count = mg.set_goal_flags(&[f(2)]);
        assert_eq!(count, 1);
        assert!(mg.iter().next().unwrap().is_goal);
        assert!(!mg.iter().nth(1).unwrap().is_goal);
    }

    #[test]
    fn extract_cover_largest_prefers_bigger_groups_first() {
        let mut mg = MutexGroups::new();
        mg.add(vec![f(1), f(2)]);
        mg.add(vec![f(1), f(2), f(3)]);
        let cover = mg.extract_cover_largest();
        assert_eq!(cover.len(), 1);
        assert_eq!(cover[0].len(), 3);
    }

    #[test]
    fn essential_facts_appear_in_exactly_one_group() {
        let mut mg = MutexGroups::new();
        mg.add(vec![f(1), f(2)]);
        mg.add(vec![f(2), f(3)]);
        let ess = mg.essential_facts();
        assert_eq!(ess, vec![f(1), f(3)]);
    }

    #[test]
    fn remove_subsets_drops_strict_subset_groups() {
        let mut mg = MutexGroups::new();
        mg.add(vec![f(1), f(2)]);
        mg.add(vec![f(1), f(2), f(3)]);
        mg.remove_subsets();
        assert_eq!(mg.len(), 1);
        assert_eq!(mg.iter().next().unwrap().len(), 3);
    }
}
