//! The symbolic search engine: the uni-directional and
//! bi-directional search loops, merging of equal-priority frontier nodes,
//! the bound-based termination rule, and plan reconstruction by backward
//! image intersection.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::bdd::limits::{Budget, NodeLimit, TimeLimit};
use crate::bdd::{Bdd, BddManager};
use crate::fdr::model::{FactId, FdrTask, PartialState, Variable};
use crate::search::goal_split::GoalSplit;
use crate::search::node::{NodeId, SymbolicNode};
use crate::search::pool::NodePool;
use crate::search::state_space::StateSpace;
use crate::symbolic::constraints::ConstraintCollection;
use crate::transition::{image, image_limited, pre_image, pre_image_limited, TransitionGroup};

/// A heuristic value large enough that no reachable task could legitimately
/// produce it; used as the "this branch is a dead end" sentinel for
/// `heur = n.heur ⊕ tr.heur_change` (step 7).
const HEUR_DEAD_END: i64 = i64::MAX / 4;

/// Which end of the task a [`DirectionSearch`] is rooted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Fw,
    Bw,
}

/// The outcome of a search call. `Fail` and `AbortTimeLimit` are kept as
/// distinct variants rather than collapsed into one generic failure, so
/// callers can tell a proof of unsolvability from a budget exhaustion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchOutcome {
    PlanFound,
    PlanNotExist,
    Continue,
    AbortTimeLimit,
    Fail,
}

/// A cost-optimal operator sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub operators: Vec<usize>,
    pub cost: i64,
}

impl Plan {
    pub fn empty() -> Self {
        Plan { operators: Vec::new(), cost: 0 }
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

/// Outcome of a single [`DirectionSearch::step`] call.
enum StepOutcome {
    /// The node was processed (expanded or discarded as empty); no goal hit.
    Advanced,
    /// The open list emptied without a goal hit: this direction alone
    /// proves `PlanNotExist`.
    OpenEmpty,
    /// This direction's per-step time budget tripped; the direction is now
    /// disabled for the remainder of the search (`StepTimeLimit`).
    TimedOut,
    /// A uni-directional goal check succeeded: `node`'s BDD intersects the
    /// fixed target, and `witness` is that (non-empty) intersection.
    GoalHit { node: NodeId, witness: Bdd },
    /// A bi-directional meet was found against `other_closed`: `node`'s BDD
    /// intersects some already-closed node of the other direction. The
    /// caller still has to scan the other side's closed tree to find which
    /// specific node(s) actually intersect and whether the pairing improves
    /// the bound.
    Meet { node: NodeId },
}

/// One direction's private search state: its own transition set, constraint
/// collection, node pool, and open/closed bookkeeping.
pub struct DirectionSearch<'a> {
    manager: &'a BddManager,
    task: &'a FdrTask,
    direction: Direction,
    transitions: &'a [TransitionGroup],
    constraints: Option<&'a ConstraintCollection>,
    step_time_limit_secs: f64,
    log_every_step: bool,
    pool: NodePool,
    space: StateSpace,
    disabled: bool,
    generated: u64,
    expanded: u64,
    expanded_bdd_node_total: u64,
}

impl<'a> DirectionSearch<'a> {
    pub fn new(
        manager: &'a BddManager,
        task: &'a FdrTask,
        direction: Direction,
        transitions: &'a [TransitionGroup],
        constraints: Option<&'a ConstraintCollection>,
        track_closed_by_g: bool,
        step_time_limit_secs: f64,
        log_every_step: bool,
    ) -> Self {
        DirectionSearch {
            manager,
            task,
            direction,
            transitions,
            constraints,
            step_time_limit_secs,
            log_every_step,
            pool: NodePool::new(),
            space: StateSpace::new(manager, track_closed_by_g),
            disabled: false,
            generated: 0,
            expanded: 0,
            expanded_bdd_node_total: 0,
        }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    pub fn is_open_empty(&self) -> bool {
        self.space.is_open_empty()
    }

    pub fn min_open_f(&self) -> Option<i64> {
        self.space.min_open_f()
    }

    pub fn set_bound(&mut self, bound: i64) {
        self.space.bound = bound;
    }

    pub fn bound(&self) -> i64 {
        self.space.bound
    }

    pub fn all_closed(&self) -> &Bdd {
        self.space.all_closed()
    }

    pub fn stats(&self) -> (u64, u64, f64) {
        let avg = if self.expanded == 0 {
            0.0
        } else {
            self.expanded_bdd_node_total as f64 / self.expanded as f64
        };
        (self.generated, self.expanded, avg)
    }

    /// `AddInit`: seeds a root carrying an already-known BDD and h-value.
    pub fn seed(&mut self, bdd: Bdd, h: i64) -> NodeId {
        let id = self.pool.add_init(bdd, h);
        self.space.push_open(&self.pool, id);
        info!(dir = ?self.direction, init_h_value = h, "init_h_value");
        id
    }

    /// Seeds one root per [`GoalSplit`]: backward search
    /// treats each piece as a separate initial node with its own h-offset.
    pub fn seed_splits(&mut self, splits: Vec<GoalSplit>) -> Vec<NodeId> {
        splits
            .into_iter()
            .map(|s| {
                info!(dir = ?self.direction, h = s.h, bdd_size = self.manager.size(&s.bdd), "goal_split");
                self.seed(s.bdd, s.h)
            })
            .collect()
    }

    fn apply_constraints(&self, bdd: &Bdd) -> Bdd {
        match self.constraints {
            Some(c) => c.apply(self.manager, bdd),
            None => bdd.clone(),
        }
    }

    /// `image`/`pre_image` of a whole transition *group* ('s
    /// "transition group": a list of transition BDDs sharing the same cost
    /// class): the union of each member's individual image.
    fn group_step(&self, group: &TransitionGroup, state: &Bdd, budget: Budget) -> Option<Bdd> {
        let mut acc = self.manager.mk_false();
        for t in &group.transitions {
            let piece = match self.direction {
                Direction::Fw => image_limited(self.manager, t, state, budget),
                Direction::Bw => pre_image_limited(self.manager, t, state, budget),
            }?;
            acc = self.manager.or(&acc, &piece);
        }
        Some(acc)
    }

    /// Builds `id`'s BDD if missing, walking the parent chain (merged nodes
    /// recurse over every collected sibling) and applying constraints plus
    /// closed-state subtraction exactly once, 's "`n.bdd`
    /// is freshly constructed at most once and cached". Returns `Ok(false)`
    /// when the reduced BDD is empty (a dead end to discard, not an error),
    /// and `Err(())` when `budget`'s deadline tripped mid-build (    /// `StepTimeLimit`, recovered by the caller, never propagated).
    fn ensure_bdd(&mut self, id: NodeId, budget: Budget) -> Result<bool, ()> {
        if let Some(bdd) = self.pool.get(id).bdd.clone() {
            return Ok(!self.manager.is_false(&bdd));
        }

        let node = self.pool.get(id).clone();
        if node.is_merged() {
            let mut acc = self.manager.mk_false();
            for pid in node.parent_ids.clone() {
                if self.ensure_bdd(pid, budget)? {
                    let b = self.pool.get(pid).bdd.clone().unwrap();
                    acc = self.manager.or(&acc, &b);
                }
            }
            let non_empty = !self.manager.is_false(&acc);
            self.pool.add_bdd(id, acc);
            return Ok(non_empty);
        }

        if budget.time.is_expired() {
            return Err(());
        }
        let parent_id = node.parent_id as NodeId;
        if !self.ensure_bdd(parent_id, Budget::unbounded())? {
            self.pool.add_bdd(id, self.manager.mk_false());
            return Ok(false);
        }
        let parent_bdd = self.pool.get(parent_id).bdd.clone().unwrap();
        let trans_id = node.trans_id.expect("non-root, non-merged node carries a trans_id");
        let group = &self.transitions[trans_id];

        let Some(mut raw) = self.group_step(group, &parent_bdd, budget) else {
            return Err(());
        };
        raw = self.apply_constraints(&raw);
        raw = self.space.remove_closed_states(self.manager, &raw, node.cost.hard);
        let non_empty = !self.manager.is_false(&raw);
        self.expanded_bdd_node_total += self.manager.size(&raw) as u64;
        self.pool.add_bdd(id, raw);
        Ok(non_empty)
    }

    fn step_budget(&self) -> Budget {
        // Forward search ignores `step_time_limit` -- only backward honours it.
        if self.direction == Direction::Bw && self.step_time_limit_secs > 0.0 {
            Budget::new(NodeLimit::unbounded(), TimeLimit::from_secs(self.step_time_limit_secs))
        } else {
            Budget::unbounded()
        }
    }

    /// `expand(n)` (step 7): creates one child per
    /// transition group whose resulting `(cost, f)` stays under `bound`.
    fn expand(&mut self, n: NodeId) {
        let node = self.pool.get(n).clone();
        let bound = self.space.bound;
        for (idx, group) in self.transitions.iter().enumerate() {
            let cost = node.cost.combine(group.cost);
            if cost.hard >= bound {
                continue;
            }
            let heur = node.heur + group.heur_change;
            if heur >= HEUR_DEAD_END {
                continue;
            }
            let f = cost.hard + heur.max(0);
            if f >= bound {
                continue;
            }
            let child = self.pool.add(n as isize, Some(idx), cost, heur);
            self.space.push_open(&self.pool, child);
            self.generated += 1;
        }
    }

    /// Merge-next-open (step 9): while the node now sitting
    /// at the top of `open_by_f` shares `n`'s `(cost, heur)`, fold it (and
    /// every further match) into one merged node.
    fn merge_next_open(&mut self, n: NodeId) {
        let (n_cost, n_heur) = {
            let nd = self.pool.get(n);
            (nd.cost, nd.heur)
        };
        let mut collected = Vec::new();
        loop {
            let Some((id, cost, heur)) = self.space.peek_open() else { break };
            if cost != n_cost || heur != n_heur {
                break;
            }
            self.space.next_open();
            collected.push(id);
        }
        match collected.len() {
            0 => {}
            1 => self.space.push_open(&self.pool, collected[0]),
            _ => {
                let mut merged_bdd = self.manager.mk_false();
                for &id in &collected {
                    if self.ensure_bdd(id, Budget::unbounded()).unwrap_or(false) {
                        let b = self.pool.get(id).bdd.clone().unwrap();
                        merged_bdd = self.manager.or(&merged_bdd, &b);
                    }
                }
                let merged = self.pool.add_merged(collected, n_cost, n_heur, merged_bdd);
                self.space.push_open(&self.pool, merged);
            }
        }
    }

    /// One step of the loop, specialised per `goal_kind`:
    /// either a fixed uni-directional target, or the other direction's
    /// `all_closed` BDD for the bi-directional meet check.
    fn step(&mut self, other_closed: Option<&Bdd>, uni_target: Option<&Bdd>) -> StepOutcome {
        if self.disabled {
            return StepOutcome::OpenEmpty;
        }
        let Some(n) = self.space.next_open() else {
            return StepOutcome::OpenEmpty;
        };

        let budget = self.step_budget();
        match self.ensure_bdd(n, budget) {
            Err(()) => {
                self.disabled = true;
                return StepOutcome::TimedOut;
            }
            Ok(false) => {
                self.space.close(self.manager, &mut self.pool, n);
                return StepOutcome::Advanced;
            }
            Ok(true) => {}
        }

        let node_bdd = self.pool.get(n).bdd.clone().unwrap();

        if let Some(target) = uni_target {
            let inter = self.manager.and(&node_bdd, target);
            if !self.manager.is_false(&inter) {
                return StepOutcome::GoalHit { node: n, witness: inter };
            }
        }

        let met = match other_closed {
            Some(closed) => !self.manager.is_false(&self.manager.and(&node_bdd, closed)),
            None => false,
        };

        let node = self.pool.get(n).clone();
        let f = node.f_value();
        if self.log_every_step {
            info!(
                dir = ?self.direction, g = node.cost.hard, zero_cost_tag = node.cost.zero_cost_tag, h = node.heur, f,
                generated = self.generated, closed = self.space.closed_ids().count(),
                bound = self.space.bound, cur_state_bdd_size = self.manager.size(&node_bdd),
                "step"
            );
        }
        if f <= self.space.bound {
            self.expand(n);
        }
        self.space.close(self.manager, &mut self.pool, n);
        self.merge_next_open(n);
        self.expanded += 1;

        if met {
            // The caller (`run_bidirectional`) still has to walk the other
            // direction's closed tree to find which node(s) actually
            // intersect `n`'s BDD and whether the pairing improves the bound.
            StepOutcome::Meet { node: n }
        } else {
            StepOutcome::Advanced
        }
    }

    /// Decodes a [`crate::bdd::Cube`] into a total fact assignment: one fact
    /// per [`crate::symbolic::variables::FactGroup`], defaulting to the
    /// group's first fact when the cube leaves it unconstrained (every
    /// stored BDD is a subset of `valid_states`, so this default essentially
    /// never triggers in practice).
    fn decode_full(&self, vars: &crate::symbolic::variables::SymbolicVariables, cube: &crate::bdd::Cube) -> PartialState {
        let mut facts = Vec::with_capacity(vars.groups().len());
        for group in vars.groups() {
            let fact = vars.fact_from_bdd_cube(group, cube).unwrap_or(group.facts[0]);
            facts.push(fact);
        }
        let pairs: Vec<(Variable, i32)> = facts.iter().map(|&f| self.task.fact_of(f)).collect();
        PartialState::from_pairs(pairs)
    }

    /// Finds which of a merged node's original siblings is consistent with
    /// `target` (a singleton state BDD), so reconstruction can keep
    /// following a concrete `(trans_id, parent_id)` pair.
    fn pick_merged_branch(&mut self, node: &SymbolicNode, target: &Bdd) -> NodeId {
        for &pid in &node.parent_ids {
            if self.ensure_bdd(pid, Budget::unbounded()).unwrap_or(false) {
                let b = self.pool.get(pid).bdd.clone().unwrap();
                if !self.manager.is_false(&self.manager.and(&b, target)) {
                    return pid;
                }
            }
        }
        node.parent_ids[0]
    }

    /// Walks from `start` up to its root, reconstructing the chronological
    /// `(before, after, transition-group)` edge list.
    /// `seed` is a singleton BDD pinning the state at `start`.
    fn reconstruct_edges(
        &mut self,
        vars: &crate::symbolic::variables::SymbolicVariables,
        start: NodeId,
        seed: &Bdd,
    ) -> (PartialState, Vec<(PartialState, PartialState, usize)>) {
        let mut cube_bdd = seed.clone();
        let mut state = self.decode_full(vars, &self.manager.pick_one_cube(&cube_bdd).expect("seed is non-empty"));
        let mut node_id = start;
        let mut edges = Vec::new();

        loop {
            let node = self.pool.get(node_id).clone();
            if node.is_merged() {
                node_id = self.pick_merged_branch(&node, &cube_bdd);
                continue;
            }
            if node.is_root() {
                break;
            }
            let trans_id = node.trans_id.expect("non-root node carries a trans_id");
            let group = &self.transitions[trans_id];
            let parent_id = node.parent_id as NodeId;
            self.ensure_bdd(parent_id, Budget::unbounded()).ok();
            let parent_bdd = self.pool.get(parent_id).bdd.clone().unwrap_or_else(|| self.manager.mk_false());

            let mut found = None;
            for (i, tb) in group.transitions.iter().enumerate() {
                let pred = match self.direction {
                    Direction::Fw => pre_image(self.manager, tb, &cube_bdd),
                    Direction::Bw => image(self.manager, tb, &cube_bdd),
                };
                let inter = self.manager.and(&pred, &parent_bdd);
                if !self.manager.is_false(&inter) {
                    found = Some((inter, i));
                    break;
                }
            }
            let (pred_bdd, tb_idx) = found.expect("a transition producing this node must invert onto its parent");
            let pred_cube = self.manager.pick_one_cube(&pred_bdd).expect("non-empty by construction");
            let pred_state = self.decode_full(vars, &pred_cube);

            let marker = tb_idx_marker(trans_id, tb_idx);
            let edge = match self.direction {
                Direction::Fw => (pred_state.clone(), state.clone(), marker),
                Direction::Bw => (state.clone(), pred_state.clone(), marker),
            };
            edges.push(edge);

            cube_bdd = pred_bdd;
            state = pred_state;
            node_id = parent_id;
        }

        if self.direction == Direction::Fw {
            edges.reverse();
        }
        (state, edges)
    }

    /// Translates a chronological edge list into operator ids by scanning
    /// the owning transition group's operators for one whose precondition
    /// is a subset of `before` and whose `apply` yields `after`.
    fn edges_to_plan(&self, edges: Vec<(PartialState, PartialState, usize)>) -> Vec<usize> {
        let mut ops = Vec::with_capacity(edges.len());
        for (before, after, marker) in edges {
            let (trans_id, tb_idx) = unmarker(marker);
            let tb = &self.transitions[trans_id].transitions[tb_idx];
            let op_id = tb
                .operator_ids
                .iter()
                .copied()
                .find(|&id| {
                    let op = &self.task.operators[id];
                    op.is_applicable(&before) && op.apply(&before) == after
                })
                .expect("transition group must contain the operator that produced this edge");
            ops.push(op_id);
        }
        ops
    }

    /// Uni-directional reconstruction: `found` is the node
    /// whose BDD intersected the fixed target, `witness` that intersection.
    pub fn reconstruct_uni(&mut self, vars: &crate::symbolic::variables::SymbolicVariables, found: NodeId, witness: &Bdd) -> Plan {
        let (_, edges) = self.reconstruct_edges(vars, found, witness);
        let cost = self.pool.get(found).cost.hard;
        Plan { operators: self.edges_to_plan(edges), cost }
    }

    /// One half of a bi-directional reconstruction: `node` sits at the
    /// meeting point, `seed` pins the shared meeting state.
    pub fn reconstruct_half(&mut self, vars: &crate::symbolic::variables::SymbolicVariables, node: NodeId, seed: &Bdd) -> Vec<usize> {
        let (_, edges) = self.reconstruct_edges(vars, node, seed);
        self.edges_to_plan(edges)
    }
}

/// Packs `(trans_id, tb_idx)` into one `usize` so [`DirectionSearch::reconstruct_edges`]
/// can carry a single marker through the generic edge tuple; `tb_idx` never
/// exceeds a handful of entries per group, so 16 bits is ample.
fn tb_idx_marker(trans_id: usize, tb_idx: usize) -> usize {
    (trans_id << 16) | tb_idx
}

fn unmarker(marker: usize) -> (usize, usize) {
    (marker >> 16, marker & 0xFFFF)
}

/// Runs a single-direction search to completion against a fixed target BDD
/// (the goal, for a forward search; the initial state, for a backward one).
pub fn run_uni(search: &mut DirectionSearch, vars: &crate::symbolic::variables::SymbolicVariables, target: &Bdd, deadline: TimeLimit) -> (SearchOutcome, Option<Plan>) {
    loop {
        if deadline.is_expired() {
            return (SearchOutcome::AbortTimeLimit, None);
        }
        match search.step(None, Some(target)) {
            StepOutcome::Advanced => continue,
            StepOutcome::OpenEmpty => return (SearchOutcome::PlanNotExist, None),
            StepOutcome::TimedOut => return (SearchOutcome::AbortTimeLimit, None),
            StepOutcome::GoalHit { node, witness } => {
                let plan = search.reconstruct_uni(vars, node, &witness);
                info!(dir = ?search.direction, steps = search.expanded, cost = plan.cost, length = plan.len(), "found_plan");
                return (SearchOutcome::PlanFound, Some(plan));
            }
            StepOutcome::Meet { .. } => unreachable!("uni-directional step never requests a meet check"),
        }
    }
}

/// A candidate plan recorded during bi-directional search: which fw/bw node
/// pair met, and the resulting total cost.
struct MeetCandidate {
    fw_node: NodeId,
    bw_node: NodeId,
    cost: i64,
}

/// Runs the bi-directional loop: alternates
/// stepping `fw` and `bw` by the wall-clock scheduler, tightens `bound` on
/// every meet, and terminates once `min_open_f(fw) + min_open_f(bw) >=
/// bound` or either side empties.
pub fn run_bidirectional(
    fw: &mut DirectionSearch,
    bw: &mut DirectionSearch,
    vars: &crate::symbolic::variables::SymbolicVariables,
    deadline: TimeLimit,
) -> (SearchOutcome, Option<Plan>) {
    let mut bound = i64::MAX;
    let mut best: Option<MeetCandidate> = None;
    let mut fw_estimate = 1.0_f64;
    let mut bw_estimate = 1.0_f64;

    loop {
        if deadline.is_expired() {
            return (SearchOutcome::AbortTimeLimit, None);
        }
        if fw.is_disabled() && bw.is_disabled() {
            break;
        }
        if fw.is_open_empty() && bw.is_open_empty() {
            break;
        }
        if best.is_some() {
            let fw_f = fw.min_open_f().unwrap_or(i64::MAX);
            let bw_f = bw.min_open_f().unwrap_or(i64::MAX);
            if fw_f.saturating_add(bw_f) >= bound {
                break;
            }
        }

        let step_fw = if fw.is_disabled() || fw.is_open_empty() {
            false
        } else if bw.is_disabled() || bw.is_open_empty() {
            true
        } else {
            fw_estimate <= bw_estimate
        };

        let started = Instant::now();
        let outcome = if step_fw {
            fw.step(Some(bw.all_closed()), None)
        } else {
            bw.step(Some(fw.all_closed()), None)
        };
        let elapsed = started.elapsed().as_secs_f64().max(1e-9);

        match outcome {
            StepOutcome::Advanced => {
                if step_fw {
                    fw_estimate = elapsed;
                } else {
                    bw_estimate = elapsed;
                }
            }
            StepOutcome::TimedOut => {
                // StepTimeLimit: only backward disables itself;
                // forward is never subject to the per-step budget.
            }
            StepOutcome::OpenEmpty => {
                // that direction is done; the loop's top-level empty check
                // will end the search once both sides agree.
            }
            StepOutcome::Meet { node } => {
                let this_cost = if step_fw { fw.pool.get(node).cost.hard } else { bw.pool.get(node).cost.hard };
                let this_bdd = if step_fw { fw.pool.get(node).bdd.clone() } else { bw.pool.get(node).bdd.clone() };
                let Some(this_bdd) = this_bdd else { continue };
                // Collected up front (rather than iterated live) so the match
                // below is free to re-borrow `fw`/`bw` mutably once a pairing
                // improves the bound.
                let other_candidates: Vec<(NodeId, i64, Bdd)> = if step_fw {
                    bw.closed_ascending_ids()
                        .into_iter()
                        .filter_map(|id| bw.pool.get(id).bdd.clone().map(|b| (id, bw.pool.get(id).cost.hard, b)))
                        .collect()
                } else {
                    fw.closed_ascending_ids()
                        .into_iter()
                        .filter_map(|id| fw.pool.get(id).bdd.clone().map(|b| (id, fw.pool.get(id).cost.hard, b)))
                        .collect()
                };
                for (other_id, other_cost, other_bdd) in other_candidates {
                    let total = this_cost + other_cost;
                    if total >= bound {
                        break;
                    }
                    if fw.manager.is_false(&fw.manager.and(&this_bdd, &other_bdd)) {
                        continue;
                    }
                    bound = total;
                    best = Some(if step_fw {
                        MeetCandidate { fw_node: node, bw_node: other_id, cost: total }
                    } else {
                        MeetCandidate { fw_node: other_id, bw_node: node, cost: total }
                    });
                    fw.set_bound(bound);
                    bw.set_bound(bound);
                    break;
                }
            }
        }
    }

    match best {
        None => (SearchOutcome::PlanNotExist, None),
        Some(candidate) => {
            let fw_bdd = fw.pool.get(candidate.fw_node).bdd.clone().unwrap_or_else(|| fw.manager.mk_true());
            let bw_bdd = bw.pool.get(candidate.bw_node).bdd.clone().unwrap_or_else(|| bw.manager.mk_true());
            let meet = fw.manager.and(&fw_bdd, &bw_bdd);
            let fw_ops = fw.reconstruct_half(vars, candidate.fw_node, &meet);
            let bw_ops = bw.reconstruct_half(vars, candidate.bw_node, &meet);
            let mut operators = fw_ops;
            operators.extend(bw_ops);
            let plan = Plan { operators, cost: candidate.cost };
            info!(dir = "bidirectional", cost = plan.cost, length = plan.len(), "found_plan");
            (SearchOutcome::PlanFound, Some(plan))
        }
    }
}

impl<'a> DirectionSearch<'a> {
    fn closed_ascending_ids(&self) -> Vec<NodeId> {
        self.space.closed_ascending_by_g().collect()
    }
}

/// Re-applies a [`Plan`]'s operators from the initial state, returning the
/// full state trace (`initial, s1, s2, ..., goal`).
pub fn replay(task: &FdrTask, plan: &Plan) -> Vec<PartialState> {
    let mut trace = vec![task.initial_state.clone()];
    let mut state = task.initial_state.clone();
    for &op_id in &plan.operators {
        state = task.operators[op_id].apply(&state);
        trace.push(state.clone());
    }
    trace
}

/// `pddlSymbolicTaskCheckApplyFw`/`CheckApplyBw`-equivalent building block:
/// a fact-level mutex check of every consecutive `(state, op, next_state)`
/// triple of a replayed plan (property 9, ).
pub fn check_consistent(task: &FdrTask, mutex: &crate::fdr::mutex::MutexPairs, plan: &Plan) -> bool {
    let trace = replay(task, plan);
    for window in trace.windows(2) {
        let before = &window[0];
        let after = &window[1];
        let before_facts: Vec<FactId> = before.iter().map(|(v, val)| task.fact_id(v, val)).collect();
        let after_facts: Vec<FactId> = after.iter().map(|(v, val)| task.fact_id(v, val)).collect();
        if mutex.set_mutex_with_set(&before_facts, &before_facts, true, true) {
            return false;
        }
        if mutex.set_mutex_with_set(&after_facts, &after_facts, true, true) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdd::BddManager;
    use crate::fdr::model::{FdrTask, Operator, PartialState, Variable, VariableInfo};
    use crate::fdr::mutex::MutexGroups;
    use crate::symbolic::disambiguation::Disambiguator;
    use crate::symbolic::variables::SymbolicVariables;

    fn toggle_task() -> FdrTask {
        let variables = vec![VariableInfo { name: "switch".into(), values: vec!["off".into(), "on".into()] }];
        let v = Variable(0);
        let turn_on = Operator {
            name: "turn_on".into(),
            cost: 1,
            pre: PartialState::from_pairs([(v, 0)]),
            eff: PartialState::from_pairs([(v, 1)]),
            cond_eff: vec![],
        };
        FdrTask::new(
            variables,
            PartialState::from_pairs([(v, 0)]),
            PartialState::from_pairs([(v, 1)]),
            vec![turn_on],
        )
    }

    #[test]
    fn single_toggle_forward_search_finds_unit_cost_plan() {
        let task = toggle_task();
        let manager = BddManager::new(2, 2, 1024);
        let vars = SymbolicVariables::new(&manager, vec![vec![FactId(0), FactId(1)]]);
        let mgroups = MutexGroups::new();
        let mutex = crate::fdr::mutex::MutexPairs::new();
        let disambig = Disambiguator::new(task.fact_count(), &mgroups, &mutex, true, true);
        let groups = crate::transition::build_transitions(&manager, &vars, &task, &disambig, &mutex, false, &|_| 0, Budget::unbounded());

        let mut fw = DirectionSearch::new(&manager, &task, Direction::Fw, &groups, None, false, -1.0, false);
        let init = vars.create_state(&manager, &[task.fact_id(Variable(0), 0)]);
        fw.seed(init, 0);
        let goal = vars.create_state(&manager, &[task.fact_id(Variable(0), 1)]);

        let (outcome, plan) = run_uni(&mut fw, &vars, &goal, TimeLimit::unbounded());
        assert_eq!(outcome, SearchOutcome::PlanFound);
        let plan = plan.unwrap();
        assert_eq!(plan.cost, 1);
        assert_eq!(plan.operators, vec![0]);
    }

    #[test]
    fn already_satisfied_goal_is_found_with_empty_plan() {
        let task = toggle_task();
        let manager = BddManager::new(2, 2, 1024);
        let vars = SymbolicVariables::new(&manager, vec![vec![FactId(0), FactId(1)]]);
        let mgroups = MutexGroups::new();
        let mutex = crate::fdr::mutex::MutexPairs::new();
        let disambig = Disambiguator::new(task.fact_count(), &mgroups, &mutex, true, true);
        let groups = crate::transition::build_transitions(&manager, &vars, &task, &disambig, &mutex, false, &|_| 0, Budget::unbounded());

        let mut fw = DirectionSearch::new(&manager, &task, Direction::Fw, &groups, None, false, -1.0, false);
        let init = vars.create_state(&manager, &[task.fact_id(Variable(0), 1)]);
        fw.seed(init, 0);
        let goal = vars.create_state(&manager, &[task.fact_id(Variable(0), 1)]);

        let (outcome, plan) = run_uni(&mut fw, &vars, &goal, TimeLimit::unbounded());
        assert_eq!(outcome, SearchOutcome::PlanFound);
        assert!(plan.unwrap().is_empty());
    }

    #[test]
    fn plan_serializes_through_json() {
        let plan = Plan { operators: vec![0, 2, 1], cost: 4 };
        let json = serde_json::to_string(&plan).unwrap();
        let back: Plan = serde_json::from_str(&json).unwrap();
        assert_eq!(plan, back);
    }

    #[test]
    fn check_consistent_accepts_a_clean_toggle_plan() {
        let task = toggle_task();
        let mutex = crate::fdr::mutex::MutexPairs::new();
        let plan = Plan { operators: vec![0], cost: 1 };
        assert!(check_consistent(&task, &mutex, &plan));
    }
}
