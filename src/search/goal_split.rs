//! Goal splitting by potential heuristic: turns the goal
//! fact set into a list of `(h, BDD)` pairs whose BDDs' disjunction equals
//! the original goal, grouping facts of equal potential so that backward
//! search can be seeded with several distinct initial h-values.

use std::collections::HashMap;

use ordered_float::OrderedFloat;

use crate::bdd::{Bdd, BddManager};
use crate::error::{SymbolicError, SymbolicResult};
use crate::fdr::model::FactId;
use crate::fdr::mutex::MutexGroups;
use crate::symbolic::disambiguation::Disambiguator;
use crate::symbolic::variables::SymbolicVariables;

/// One seed for backward search: the heuristic value assigned to every
/// state in `bdd`.
#[derive(Debug, Clone)]
pub struct GoalSplit {
    pub h: i64,
    pub bdd: Bdd,
}

type PotentialMap = HashMap<OrderedFloat<f64>, Bdd>;

fn merge_maps(manager: &BddManager, a: &PotentialMap, b: &PotentialMap) -> PotentialMap {
    let mut out = PotentialMap::new();
    for (&k1, bd1) in a {
        for (&k2, bd2) in b {
            let key = OrderedFloat(k1.into_inner() + k2.into_inner());
            let bdd = manager.and(bd1, bd2);
            out.entry(key)
                .and_modify(|existing| *existing = manager.or(existing, &bdd))
                .or_insert(bdd);
        }
    }
    out
}

/// Balanced-tree reduction of several maps into one, as used for the
/// transition merger  and reused here for step 3.
fn reduce_maps(manager: &BddManager, mut maps: Vec<PotentialMap>) -> PotentialMap {
    if maps.is_empty() {
        return PotentialMap::new();
    }
    loop {
        if maps.len() == 1 {
            return maps.pop().unwrap();
        }
        let mut next = Vec::with_capacity(maps.len().div_ceil(2));
        let mut iter = maps.drain(..);
        loop {
            match (iter.next(), iter.next()) {
                (Some(a), Some(b)) => next.push(merge_maps(manager, &a, &b)),
                (Some(a), None) => next.push(a),
                (None, _) => break,
            }
        }
        maps = next;
    }
}

/// Splits the goal fact set by potential. `potential(fact)` supplies the
/// linear potential value of a fact (an external LP solver's job --
/// this function only consumes the resulting map). `disambig` is used to
/// rule out facts of a non-intersecting mgroup that are mutex with the goal.
/// `base_h` is the overall initial h-value the split contributes on top of.
pub fn split_goal(
    manager: &BddManager,
    vars: &SymbolicVariables,
    mgroups: &MutexGroups,
    disambig: &Disambiguator,
    goal_facts: &[FactId],
    potential: &dyn Fn(FactId) -> f64,
    base_h: i64,
) -> SymbolicResult<Vec<GoalSplit>> {
    let mut maps = Vec::new();

    for group in mgroups.iter().filter(|g| g.is_exactly_one) {
        let intersect: Vec<FactId> = group.facts.iter().copied().filter(|f| goal_facts.contains(f)).collect();
        let candidates: Vec<FactId> = if !intersect.is_empty() {
            intersect
        } else {
            // M doesn't intersect the goal: disambiguate it against the goal
            // by dropping the facts that are mutex with some goal fact.
            group.facts.iter().copied().filter(|&f| disambig.compatible_with(goal_facts, f)).collect()
        };

        if candidates.is_empty() {
            return Err(SymbolicError::TaskUnsolvable(
                "an exactly-one mgroup has no fact consistent with the goal".into(),
            ));
        }

        let mut map = PotentialMap::new();
        for &fact in &candidates {
            let key = OrderedFloat(potential(fact));
            map.entry(key)
                .and_modify(|bdd| *bdd = manager.or(bdd, vars.pre(fact)))
                .or_insert_with(|| vars.pre(fact).clone());
        }
        maps.push(map);
    }

    let final_map = if maps.is_empty() {
        let mut whole = PotentialMap::new();
        whole.insert(OrderedFloat(0.0), vars.create_state(manager, goal_facts));
        whole
    } else {
        reduce_maps(manager, maps)
    };

    let eps = 1e-9;
    let mut splits: Vec<GoalSplit> = final_map
        .into_iter()
        .map(|(key, bdd)| {
            let h = base_h + (-key.into_inner() - eps).ceil() as i64;
            GoalSplit { h, bdd }
        })
        .collect();
    splits.sort_by_key(|s| s.h);
    Ok(splits)
}
