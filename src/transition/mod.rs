//! The transition builder: per-operator BDD construction,
//! pairwise merging of same-(cost, heuristic-change) transitions under a
//! node/time budget, and the `image`/`pre_image` operators the search
//! engine drives, built on top of the façade in [`crate::bdd`].

use crate::bdd::limits::Budget;
use crate::bdd::{Bdd, BddManager, Var};
use crate::fdr::model::{FactId, FdrTask, Operator};
use crate::fdr::mutex::MutexPairs;
use crate::symbolic::disambiguation::{DisambiguateResult, Disambiguator};
use crate::symbolic::variables::SymbolicVariables;

/// `pddl_cost`: an operator cost plus a tie-breaking tag that keeps
/// zero-cost transitions from collapsing into a single bucket with
/// positive-cost ones during search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cost {
    pub hard: i64,
    pub zero_cost_tag: i64,
}

impl Cost {
    pub fn new(hard: i64) -> Self {
        Cost {
            hard,
            zero_cost_tag: if hard == 0 { 1 } else { 0 },
        }
    }

    pub fn combine(self, other: Cost) -> Cost {
        Cost {
            hard: self.hard + other.hard,
            zero_cost_tag: self.zero_cost_tag.max(other.zero_cost_tag),
        }
    }
}

/// The outcome of preparing a single operator (steps 1-4).
#[derive(Debug, Clone)]
pub struct OperatorPrep {
    pub op_id: usize,
    pub pre: Vec<FactId>,
    pub neg_pre: Vec<FactId>,
    pub eff: Vec<FactId>,
    pub neg_eff: Vec<FactId>,
    pub dead: bool,
}

fn facts_of(task: &FdrTask, state: &crate::fdr::model::PartialState) -> Vec<FactId> {
    state.iter().map(|(v, val)| task.fact_id(v, val)).collect()
}

/// Prepares operator `op_id` of `task`. `use_op_constr` toggles computing
/// `neg_pre` and the fw-mutex extension of `neg_eff` (step 3).
pub fn prepare_operator(
    op_id: usize,
    op: &Operator,
    task: &FdrTask,
    disambig: &Disambiguator,
    mutex: &MutexPairs,
    use_op_constr: bool,
) -> OperatorPrep {
    let raw_pre = facts_of(task, &op.pre);
    let pre = match disambig.disambiguate(&raw_pre, true) {
        DisambiguateResult::Mutex => {
            return OperatorPrep {
                op_id,
                pre: raw_pre,
                neg_pre: Vec::new(),
                eff: Vec::new(),
                neg_eff: Vec::new(),
                dead: true,
            };
        }
        DisambiguateResult::Added(tightened) => tightened,
        DisambiguateResult::Unchanged => raw_pre,
    };

    let add = facts_of(task, &op.eff);
    let eff: Vec<FactId> = add.iter().copied().filter(|f| !pre.contains(f)).collect();

    // del(o): for every variable the effect changes whose precondition
    // value is known, the precondition's fact is deleted.
    let del: Vec<FactId> = op
        .eff
        .variables()
        .filter_map(|v| op.pre.get(v).map(|val| task.fact_id(v, val)))
        .collect();

    let mut neg_eff: Vec<FactId> = del
        .into_iter()
        .filter(|f| !mutex.fact_mutex_with_any(*f, &pre, true, true))
        .collect();

    let mut neg_pre = Vec::new();
    if use_op_constr {
        let universe = 0..task.fact_count();
        neg_pre = universe
            .clone()
            .map(FactId)
            .filter(|&f| !pre.contains(&f) && mutex.fact_mutex_with_any(f, &pre, false, true))
            .collect();

        let extra_neg_eff: Vec<FactId> = (0..task.fact_count())
            .map(FactId)
            .filter(|&f| {
                !neg_pre.contains(&f) && mutex.fact_mutex_with_any(f, &eff, true, false)
            })
            .collect();
        for f in extra_neg_eff {
            if !neg_eff.contains(&f) {
                neg_eff.push(f);
            }
        }
    }

    let dead = neg_pre.iter().any(|f| pre.contains(f)) || neg_eff.iter().any(|f| eff.contains(f));

    OperatorPrep {
        op_id,
        pre,
        neg_pre,
        eff,
        neg_eff,
        dead,
    }
}

/// A single transition BDD: the union of the transition relations of one or
/// more operators over a common set of effect groups.
#[derive(Debug, Clone)]
pub struct TransitionBdd {
    pub bdd: Bdd,
    pub effect_groups: Vec<usize>,
    pub pre_cube: Vec<Var>,
    pub eff_cube: Vec<Var>,
    pub cost: Cost,
    /// Operators folded into this transition BDD, for plan reconstruction.
    pub operator_ids: Vec<usize>,
}

/// A list of transition BDDs sharing the same operator cost and heuristic
/// change.
#[derive(Debug, Clone)]
pub struct TransitionGroup {
    pub cost: Cost,
    pub heur_change: i64,
    pub transitions: Vec<TransitionBdd>,
}

fn effect_groups_of(vars: &SymbolicVariables, eff: &[FactId], neg_eff: &[FactId]) -> Vec<usize> {
    let mut groups: Vec<usize> = eff
        .iter()
        .chain(neg_eff.iter())
        .filter_map(|&f| vars.group_of(f).map(|g| g.id))
        .collect();
    groups.sort_unstable();
    groups.dedup();
    groups
}

/// Builds the single-operator transition BDD: conjunction of the pre-BDDs
/// of `pre`, negated pre-BDDs of `neg_pre`, eff-BDDs of `eff`, negated
/// eff-BDDs of `neg_eff` ("Per-operator BDD").
fn build_operator_bdd(manager: &BddManager, vars: &SymbolicVariables, prep: &OperatorPrep) -> Bdd {
    let mut bdd = manager.mk_true();
    for &f in &prep.pre {
        bdd = manager.and(&bdd, vars.pre(f));
    }
    for &f in &prep.neg_pre {
        bdd = manager.and(&bdd, &manager.not(vars.pre(f)));
    }
    for &f in &prep.eff {
        bdd = manager.and(&bdd, vars.eff(f));
    }
    for &f in &prep.neg_eff {
        bdd = manager.and(&bdd, &manager.not(vars.eff(f)));
    }
    bdd
}

/// Merges two transition BDDs sharing the same cost class (/// "Two transition BDDs... merged as"). Pads each side's missing effect
/// groups with the other's bi-implication (frame axiom), then Ors under the
/// node budget; returns `None` if the Or overran it.
fn merge_pair(
    manager: &BddManager,
    vars: &SymbolicVariables,
    a: &TransitionBdd,
    b: &TransitionBdd,
    budget: Budget,
) -> Option<TransitionBdd> {
    let mut a_bdd = a.bdd.clone();
    let mut b_bdd = b.bdd.clone();

    for g in &b.effect_groups {
        if !a.effect_groups.contains(g) {
            let group = &vars.groups()[*g];
            a_bdd = manager.and(&a_bdd, &vars.create_biimp(manager, group));
        }
    }
    for g in &a.effect_groups {
        if !b.effect_groups.contains(g) {
            let group = &vars.groups()[*g];
            b_bdd = manager.and(&b_bdd, &vars.create_biimp(manager, group));
        }
    }

    let merged = manager.or_limited(&a_bdd, &b_bdd, budget)?;
    let mut effect_groups = a.effect_groups.clone();
    effect_groups.extend(b.effect_groups.iter().copied());
    effect_groups.sort_unstable();
    effect_groups.dedup();

    let mut pre_cube = a.pre_cube.clone();
    for v in &b.pre_cube {
        if !pre_cube.contains(v) {
            pre_cube.push(*v);
        }
    }
    let mut eff_cube = a.eff_cube.clone();
    for v in &b.eff_cube {
        if !eff_cube.contains(v) {
            eff_cube.push(*v);
        }
    }

    let mut operator_ids = a.operator_ids.clone();
    operator_ids.extend(b.operator_ids.iter().copied());

    Some(TransitionBdd {
        bdd: merged,
        effect_groups,
        pre_cube,
        eff_cube,
        cost: a.cost,
        operator_ids,
    })
}

/// Balanced-tree merge of one cost class's transitions: pair 0&1, 2&3, ...
/// and recurse; items whose merge fails the budget fall into the result
/// unmerged.
fn merge_class(manager: &BddManager, vars: &SymbolicVariables, mut items: Vec<TransitionBdd>, budget: Budget) -> Vec<TransitionBdd> {
    loop {
        if items.len() < 2 {
            return items;
        }
        let mut next = Vec::with_capacity(items.len().div_ceil(2));
        let mut iter = items.drain(..);
        loop {
            match (iter.next(), iter.next()) {
                (Some(a), Some(b)) => match merge_pair(manager, vars, &a, &b, budget) {
                    Some(merged) => next.push(merged),
                    None => {
                        next.push(a);
                        next.push(b);
                    }
                },
                (Some(a), None) => {
                    next.push(a);
                }
                (None, _) => break,
            }
        }
        if next.len() == items.len() || next.len() == 1 {
            return next;
        }
        items = next;
    }
}

/// Heuristic-change function: maps an operator to how much it changes the
/// value of a fixed heuristic estimate (e.g. a potential heuristic used to
/// seed the search). The plain builder uses a constant-zero function.
pub type HeurChangeFn<'a> = dyn Fn(usize) -> i64 + 'a;

/// Builds the full list of transition groups for `task`, partitioned first
/// by `(cost, heur_change)` and, within a partition, merged by the balanced
/// tree strategy above.
pub fn build_transitions(
    manager: &BddManager,
    vars: &SymbolicVariables,
    task: &FdrTask,
    disambig: &Disambiguator,
    mutex: &MutexPairs,
    use_op_constr: bool,
    heur_change: &HeurChangeFn,
    merge_budget: Budget,
) -> Vec<TransitionGroup> {
    let mut singles: Vec<(Cost, i64, TransitionBdd)> = Vec::new();

    for (op_id, op) in task.operators.iter().enumerate() {
        let prep = prepare_operator(op_id, op, task, disambig, mutex, use_op_constr);
        if prep.dead {
            continue;
        }
        let bdd = build_operator_bdd(manager, vars, &prep);
        let effect_groups = effect_groups_of(vars, &prep.eff, &prep.neg_eff);
        let pre_cube: Vec<Var> = effect_groups
            .iter()
            .flat_map(|&g| vars.groups()[g].pre_vars.iter().copied())
            .collect();
        let eff_cube: Vec<Var> = effect_groups
            .iter()
            .flat_map(|&g| vars.groups()[g].eff_vars.iter().copied())
            .collect();
        let cost = Cost::new(op.cost as i64);
        let hc = heur_change(op_id);
        singles.push((
            cost,
            hc,
            TransitionBdd {
                bdd,
                effect_groups,
                pre_cube,
                eff_cube,
                cost,
                operator_ids: vec![op_id],
            },
        ));
    }

    // Sort by (cost, heur_change) so every maximal equal-key run is
    // contiguous, matching 's top-level sort key (truncated to
    // the fields this builder can express without a name/pre/eff total
    // order, which the merge itself makes irrelevant to correctness).
    singles.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut groups = Vec::new();
    let mut i = 0;
    while i < singles.len() {
        let (cost, hc) = (singles[i].0, singles[i].1);
        let mut j = i;
        let mut run = Vec::new();
        while j < singles.len() && singles[j].0 == cost && singles[j].1 == hc {
            run.push(singles[j].2.clone());
            j += 1;
        }
        let merged = merge_class(manager, vars, run, merge_budget);
        groups.push(TransitionGroup {
            cost,
            heur_change: hc,
            transitions: merged,
        });
        i = j;
    }

    groups
}

/// `image(T, s)`: existentially quantifies the pre-variables of `T`'s
/// effect groups out of `s ∧ T.bdd`, then swaps eff-vars back onto pre-vars
/// so the result lives in the pre-variable space again. Non-effect groups
/// have no corresponding eff bit in `bdd`, so their value survives the swap
/// unexamined (last paragraph).
pub fn image(manager: &BddManager, transition: &TransitionBdd, state: &Bdd) -> Bdd {
    let conj = manager.and(state, &transition.bdd);
    let quantified = manager.exists(&conj, &transition.pre_cube);
    manager.swap_vars(&quantified, &transition.eff_cube, &transition.pre_cube)
}

/// `pre_image(T, s)`: same, but the conjunction quantifies the eff cube and
/// swaps the other way.
pub fn pre_image(manager: &BddManager, transition: &TransitionBdd, state: &Bdd) -> Bdd {
    // `state` is expressed in pre-variables; bring it into eff-variables
    // first so it can be conjoined with `bdd`'s eff side, mirroring
    // `image`'s roles swapped.
    let state_in_eff = manager.swap_vars(state, &transition.pre_cube, &transition.eff_cube);
    let conj = manager.and(&state_in_eff, &transition.bdd);
    manager.exists(&conj, &transition.eff_cube)
}

/// Bounded variants honouring a node/time budget, returning `None` on
/// overrun ("Suspension points").
pub fn image_limited(manager: &BddManager, transition: &TransitionBdd, state: &Bdd, budget: Budget) -> Option<Bdd> {
    let conj = manager.and_limited(state, &transition.bdd, budget)?;
    let quantified = manager.exists(&conj, &transition.pre_cube);
    Some(manager.swap_vars(&quantified, &transition.eff_cube, &transition.pre_cube))
}

pub fn pre_image_limited(manager: &BddManager, transition: &TransitionBdd, state: &Bdd, budget: Budget) -> Option<Bdd> {
    let state_in_eff = manager.swap_vars(state, &transition.pre_cube, &transition.eff_cube);
    let conj = manager.and_limited(&state_in_eff, &transition.bdd, budget)?;
    Some(manager.exists(&conj, &transition.eff_cube))
}
