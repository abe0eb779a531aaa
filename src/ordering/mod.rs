//! Causal-graph variable ordering. Builds a directed,
//! weighted graph over FDR variables, orders it by SCC plus a greedy
//! minimum-incoming-weight elimination, then polishes the result with
//! random-restart simulated annealing.

use std::collections::{HashMap, HashSet};

use petgraph::algo;
use petgraph::graph::DiGraph;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::fdr::model::{FactId, FdrTask, Operator, PartialState, Variable, VariableInfo};
use crate::fdr::mutex::{MutexGroups, MutexPairs};

/// Tunables for [`order_variables`], matching the constants named in
/// #[derive(Debug, Clone, Copy)]
pub struct OrderingConfig {
    pub include_eff_eff_edges: bool,
    pub goal_bonus: i64,
    pub restarts: usize,
    pub iterations: usize,
    pub seed: u64,
}

impl Default for OrderingConfig {
    fn default() -> Self {
        OrderingConfig {
            include_eff_eff_edges: false,
            goal_bonus: 100_000,
            restarts: 20,
            iterations: 50_000,
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct WeightedEdge {
    from: usize,
    to: usize,
    weight: i64,
}

fn causal_edges(task: &FdrTask, include_eff_eff: bool) -> Vec<WeightedEdge> {
    let mut weights: HashMap<(usize, usize), i64> = HashMap::new();
    for op in &task.operators {
        let pre_vars: Vec<usize> = op.pre.variables().map(Variable::id).collect();
        let eff_vars: Vec<usize> = op.eff.variables().map(Variable::id).collect();
        for &u in &pre_vars {
            for &v in &eff_vars {
                if u != v {
                    *weights.entry((u, v)).or_insert(0) += 1;
                }
            }
        }
        if include_eff_eff {
            for &u in &eff_vars {
                for &v in &eff_vars {
                    if u != v {
                        *weights.entry((u, v)).or_insert(0) += 1;
                    }
                }
            }
        }
    }
    weights
        .into_iter()
        .map(|((from, to), weight)| WeightedEdge { from, to, weight })
        .collect()
}

fn edge_cost(pos: &[usize], edges: &[WeightedEdge]) -> i64 {
    edges
        .iter()
        .map(|e| {
            let d = pos[e.from] as i64 - pos[e.to] as i64;
            d * d * e.weight
        })
        .sum()
}

/// Step (b): within one SCC, repeatedly pop the variable whose incoming
/// weight (restricted to the still-remaining variables of the SCC) is
/// smallest, with `goal_bonus` subtracted for goal variables so they get
/// popped -- and therefore placed -- early.
fn greedy_pop(scc_vars: &[usize], edges: &[WeightedEdge], goal_vars: &HashSet<usize>, goal_bonus: i64) -> Vec<usize> {
    let mut remaining: HashSet<usize> = scc_vars.iter().copied().collect();
    let mut order = Vec::with_capacity(scc_vars.len());
    while !remaining.is_empty() {
        let mut best: Option<(usize, i64)> = None;
        for &v in &remaining {
            let incoming: i64 = edges
                .iter()
                .filter(|e| e.to == v && remaining.contains(&e.from))
                .map(|e| e.weight)
                .sum();
            let bonus = if goal_vars.contains(&v) { goal_bonus } else { 0 };
            let effective = incoming - bonus;
            if best.map_or(true, |(_, best_w)| effective < best_w) {
                best = Some((v, effective));
            }
        }
        let (picked, _) = best.expect("remaining is non-empty");
        remaining.remove(&picked);
        order.push(picked);
    }
    order
}

/// Step (c): random-restart simulated annealing minimising
/// `sum_{u->v} (pos(v)-pos(u))^2 * weight(u,v)`.
fn simulated_annealing(initial: Vec<usize>, edges: &[WeightedEdge], config: &OrderingConfig) -> Vec<usize> {
    let nb = initial.len();
    if nb < 2 || edges.is_empty() {
        return initial;
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best_order = initial.clone();
    let mut best_cost = {
        let mut pos = vec![0usize; nb];
        for (i, &v) in best_order.iter().enumerate() {
            pos[v] = i;
        }
        edge_cost(&pos, edges)
    };

    for restart in 0..config.restarts {
        let mut order = initial.clone();
        if restart > 0 {
            order.shuffle(&mut rng);
        }
        let mut pos = vec![0usize; nb];
        for (i, &v) in order.iter().enumerate() {
            pos[v] = i;
        }
        let mut cost = edge_cost(&pos, edges);
        let mut temperature = 1.0_f64;
        let cooling = 0.999_f64;

        for _ in 0..config.iterations {
            let i = rng.gen_range(0..nb);
            let j = rng.gen_range(0..nb);
            if i == j {
                continue;
            }
            order.swap(i, j);
            pos[order[i]] = i;
            pos[order[j]] = j;
            let new_cost = edge_cost(&pos, edges);
            let delta = new_cost - cost;
            let accept = delta <= 0 || rng.gen::<f64>() < (-(delta as f64) / temperature).exp();
            if accept {
                cost = new_cost;
            } else {
                order.swap(i, j);
                pos[order[i]] = i;
                pos[order[j]] = j;
            }
            temperature *= cooling;
        }

        if cost < best_cost {
            best_cost = cost;
            best_order = order;
        }
    }

    best_order
}

/// Step (d): moves every variable not backward-reachable from a goal
/// variable (following edges against their direction, i.e. "can this
/// variable's effects eventually influence the goal") to the tail, keeping
/// the relative order of both groups.
fn move_unreachable_to_tail(order: &mut Vec<usize>, edges: &[WeightedEdge], goal_vars: &HashSet<usize>) {
    let mut reachable: HashSet<usize> = goal_vars.clone();
    let mut stack: Vec<usize> = goal_vars.iter().copied().collect();
    while let Some(v) = stack.pop() {
        for e in edges.iter().filter(|e| e.to == v) {
            if reachable.insert(e.from) {
                stack.push(e.from);
            }
        }
    }

    let mut head = Vec::with_capacity(order.len());
    let mut tail = Vec::new();
    for &v in order.iter() {
        if reachable.contains(&v) {
            head.push(v);
        } else {
            tail.push(v);
        }
    }
    head.extend(tail);
    *order = head;
}

/// Computes the final variable permutation for `task`: `result[i]` is the
/// *old* variable that should occupy new position `i`.
pub fn order_variables(task: &FdrTask, config: &OrderingConfig) -> Vec<Variable> {
    let nb = task.nb_variables();
    let edges = causal_edges(task, config.include_eff_eff_edges);
    let goal_vars: HashSet<usize> = task.goal.variables().map(Variable::id).collect();

    let mut graph = DiGraph::<usize, i64>::new();
    let nodes: Vec<_> = (0..nb).map(|i| graph.add_node(i)).collect();
    for e in &edges {
        graph.add_edge(nodes[e.from], nodes[e.to], e.weight);
    }

    let sccs = algo::tarjan_scc(&graph);
    let mut order = Vec::with_capacity(nb);
    for scc in &sccs {
        let scc_vars: Vec<usize> = scc.iter().map(|&idx| graph[idx]).collect();
        order.extend(greedy_pop(&scc_vars, &edges, &goal_vars, config.goal_bonus));
    }

    let mut order = simulated_annealing(order, &edges, config);
    move_unreachable_to_tail(&mut order, &edges, &goal_vars);

    order.into_iter().map(Variable).collect()
}

/// Applies a variable permutation to `task`, renumbering variables,
/// rewriting every operator/initial-state/goal reference, and returning the
/// old-fact-id -> new-fact-id map so the caller can renumber a mutex table
/// and mgroup collection the same way (last sentence).
pub fn apply_order(task: &FdrTask, order: &[Variable]) -> (FdrTask, HashMap<FactId, FactId>) {
    let mut old_to_new_var = vec![0usize; order.len()];
    for (new_id, old_var) in order.iter().enumerate() {
        old_to_new_var[old_var.id()] = new_id;
    }

    let variables: Vec<VariableInfo> = order.iter().map(|v| task.variables[v.id()].clone()).collect();

    let remap_var = |v: Variable| Variable(old_to_new_var[v.id()]);
    let remap_state = |s: &PartialState| PartialState::from_pairs(s.iter().map(|(v, val)| (remap_var(v), val)));

    let initial_state = remap_state(&task.initial_state);
    let goal = remap_state(&task.goal);
    let operators: Vec<Operator> = task
        .operators
        .iter()
        .map(|op| Operator {
            name: op.name.clone(),
            cost: op.cost,
            pre: remap_state(&op.pre),
            eff: remap_state(&op.eff),
            cond_eff: op
                .cond_eff
                .iter()
                .map(|ce| crate::fdr::model::CondEffect {
                    pre: remap_state(&ce.pre),
                    eff: remap_state(&ce.eff),
                })
                .collect(),
        })
        .collect();

    let new_task = FdrTask::new(variables, initial_state, goal, operators);

    let mut fact_remap = HashMap::new();
    for old_var in order {
        let new_var = remap_var(*old_var);
        for val in 0..task.variables[old_var.id()].domain_size() as i32 {
            let old_fact = task.fact_id(*old_var, val);
            let new_fact = new_task.fact_id(new_var, val);
            fact_remap.insert(old_fact, new_fact);
        }
    }

    (new_task, fact_remap)
}

/// Convenience wrapper applying [`apply_order`] followed by renumbering a
/// mutex table and mgroup collection through the same fact map.
pub fn reorder(
    task: &FdrTask,
    mutex: &MutexPairs,
    mgroups: &MutexGroups,
    config: &OrderingConfig,
) -> (FdrTask, MutexPairs, MutexGroups) {
    let order = order_variables(task, config);
    let (new_task, fact_remap) = apply_order(task, &order);
    let new_mutex = mutex.remap_facts(&fact_remap);
    let mut new_mgroups = mgroups.clone();
    new_mgroups.remap_facts(&fact_remap);
    (new_task, new_mutex, new_mgroups)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_task() -> FdrTask {
        // a -> b -> c causal chain, goal on c.
        let variables = vec![
            VariableInfo { name: "a".into(), values: vec!["0".into(), "1".into()] },
            VariableInfo { name: "b".into(), values: vec!["0".into(), "1".into()] },
            VariableInfo { name: "c".into(), values: vec!["0".into(), "1".into()] },
        ];
        let (a, b, c) = (Variable(0), Variable(1), Variable(2));
        let op_ab = Operator {
            name: "a_to_b".into(),
            cost: 1,
            pre: PartialState::from_pairs([(a, 1)]),
            eff: PartialState::from_pairs([(b, 1)]),
            cond_eff: vec![],
        };
        let op_bc = Operator {
            name: "b_to_c".into(),
            cost: 1,
            pre: PartialState::from_pairs([(b, 1)]),
            eff: PartialState::from_pairs([(c, 1)]),
            cond_eff: vec![],
        };
        FdrTask::new(
            variables,
            PartialState::from_pairs([(a, 1), (b, 0), (c, 0)]),
            PartialState::from_pairs([(c, 1)]),
            vec![op_ab, op_bc],
        )
    }

    #[test]
    fn causal_edges_capture_pre_to_eff_links() {
        let task = chain_task();
        let edges = causal_edges(&task, false);
        assert!(edges.iter().any(|e| e.from == 0 && e.to == 1));
        assert!(edges.iter().any(|e| e.from == 1 && e.to == 2));
    }

    #[test]
    fn goal_variable_is_reachable_and_kept_in_head() {
        let task = chain_task();
        let edges = causal_edges(&task, false);
        let goal_vars: HashSet<usize> = task.goal.variables().map(Variable::id).collect();
        let mut order = vec![0usize, 1, 2];
        move_unreachable_to_tail(&mut order, &edges, &goal_vars);
        // every variable here is backward-reachable from c (the goal);
        // nothing should move to the tail.
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn disconnected_variable_moves_to_tail() {
        let mut task = chain_task();
        task.variables.push(VariableInfo { name: "d".into(), values: vec!["0".into(), "1".into()] });
        // no operator and no goal touches `d`.
        let edges = causal_edges(&task, false);
        let goal_vars: HashSet<usize> = task.goal.variables().map(Variable::id).collect();
        let mut order = vec![3usize, 0, 1, 2];
        move_unreachable_to_tail(&mut order, &edges, &goal_vars);
        assert_eq!(*order.last().unwrap(), 3);
    }

    #[test]
    fn apply_order_renumbers_facts_consistently() {
        let task = chain_task();
        let order = vec![Variable(2), Variable(1), Variable(0)];
        let (new_task, remap) = apply_order(&task, &order);
        assert_eq!(new_task.nb_variables(), 3);
        // old fact (var 2 aka goal var c, value 1) should now live at new
        // variable 0.
        let old_fact = task.fact_id(Variable(2), 1);
        let new_fact = remap[&old_fact];
        assert_eq!(new_task.fact_of(new_fact).0, Variable(0));
    }

    #[test]
    fn order_variables_produces_a_full_permutation() {
        let task = chain_task();
        let config = OrderingConfig { restarts: 1, iterations: 50, ..Default::default() };
        let order = order_variables(&task, &config);
        let mut ids: Vec<usize> = order.iter().map(Variable::id).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
