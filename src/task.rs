//! The glue layer: wires every other
//! module into one owned [`SymbolicTask`], and exposes the configuration
//! surface through a `derive_builder`-generated builder.

use std::collections::HashMap;

use derive_builder::Builder;
use tracing::{info, warn};

use crate::bdd::limits::{Budget, NodeLimit, TimeLimit};
use crate::bdd::{Bdd, BddManager};
use crate::error::{SymbolicError, SymbolicResult};
use crate::fdr::model::{FactId, FdrTask, Variable};
use crate::fdr::mutex::{MutexGroups, MutexPairs};
use crate::ordering::{self, OrderingConfig};
use crate::search::engine::{self, Direction as SearchDirection, DirectionSearch, Plan, SearchOutcome};
use crate::search::goal_split::{split_goal, GoalSplit};
use crate::symbolic::constraints::{self, ConstraintCollection};
use crate::symbolic::disambiguation::{DisambiguateResult, Disambiguator};
use crate::symbolic::variables::SymbolicVariables;
use crate::transition::{build_transitions, TransitionGroup};

/// Per-direction tunables: one block each for forward and
/// backward search.
#[derive(Debug, Clone, Builder)]
pub struct DirectionConfig {
    #[builder(default = "true")]
    pub enabled: bool,
    #[builder(default = "100_000")]
    pub trans_merge_max_nodes: i64,
    #[builder(default = "-1.0")]
    pub trans_merge_max_time: f64,
    #[builder(default = "true")]
    pub use_constr: bool,
    #[builder(default = "false")]
    pub use_op_constr: bool,
    #[builder(default = "false")]
    pub use_pot_heur: bool,
    #[builder(default = "false")]
    pub use_pot_heur_inconsistent: bool,
    #[builder(default = "false")]
    pub use_pot_heur_sum_op_cost: bool,
    #[builder(default = "true")]
    pub use_goal_splitting: bool,
    #[builder(default = "0.0")]
    pub step_time_limit: f64,
}

impl Default for DirectionConfig {
    fn default() -> Self {
        DirectionConfigBuilder::default().build().expect("every field carries a default")
    }
}

/// Top-level configuration: the parts shared between
/// directions, plus one [`DirectionConfig`] each.
#[derive(Debug, Clone, Builder)]
pub struct SymbolicConfig {
    #[builder(default = "16_000_000")]
    pub cache_size: usize,
    #[builder(default = "100_000")]
    pub constr_max_nodes: i64,
    #[builder(default = "-1.0")]
    pub constr_max_time: f64,
    #[builder(default = "-1.0")]
    pub goal_constr_max_time: f64,
    #[builder(default = "0")]
    pub fam_groups: i64,
    #[builder(default = "false")]
    pub log_every_step: bool,
    #[builder(default = "DirectionConfig::default()")]
    pub fw: DirectionConfig,
    #[builder(default = "DirectionConfig::default()")]
    pub bw: DirectionConfig,
}

impl Default for SymbolicConfig {
    fn default() -> Self {
        SymbolicConfigBuilder::default().build().expect("every field carries a default")
    }
}

fn bits_needed(k: usize) -> usize {
    if k <= 1 {
        0
    } else {
        (usize::BITS - (k - 1).leading_zeros()) as usize
    }
}

/// Owns the whole symbolic encoding of a task: the shared [`BddManager`],
/// the reordered [`FdrTask`], its mutex/mgroup tables, variables, one
/// constraint collection and transition set per direction, and the
/// (possibly goal-constrained) initial/goal BDDs. Persisted state is
/// exactly this; a `search_*` call builds and discards its own
/// [`DirectionSearch`]es on top ("no state survives a call
/// beyond what is recorded here").
pub struct SymbolicTask {
    config: SymbolicConfig,
    manager: BddManager,
    task: FdrTask,
    mutex: MutexPairs,
    mgroups: MutexGroups,
    vars: SymbolicVariables,
    fw_constraints: Option<ConstraintCollection>,
    bw_constraints: Option<ConstraintCollection>,
    fw_transitions: Vec<TransitionGroup>,
    bw_transitions: Vec<TransitionGroup>,
    potential: Option<HashMap<FactId, f64>>,
    initial_bdd: Bdd,
    goal_bdd: Bdd,
    goal_splits: Vec<GoalSplit>,
    goal_constraint_failed: bool,
}

fn check_fact_set_solvable(disambig: &Disambiguator, facts: &[FactId], what: &str) -> SymbolicResult<()> {
    match disambig.disambiguate(facts, true) {
        DisambiguateResult::Mutex => {
            Err(SymbolicError::TaskUnsolvable(format!("{what} is intrinsically mutex under the mgroup table")))
        }
        _ => Ok(()),
    }
}

fn potential_of(potential: &Option<HashMap<FactId, f64>>, facts: &[FactId], enabled: bool) -> f64 {
    if !enabled {
        return 0.0;
    }
    match potential {
        Some(p) => facts.iter().filter_map(|f| p.get(f)).sum(),
        None => 0.0,
    }
}

/// Turns a potential sum into an h-value the way [`split_goal`] already does
/// for each of its buckets: `h = ceil(-potential - eps)`.
fn potential_to_h(potential_sum: f64) -> i64 {
    let eps = 1e-9;
    (-potential_sum - eps).ceil() as i64
}

impl SymbolicTask {
    /// Builds the full symbolic encoding of `task`:
    /// reorders variables, sizes and constructs the [`BddManager`], builds
    /// per-direction constraint collections and transition sets, and
    /// tightens the goal BDD.
    ///
    /// `mutex`/`mgroups` are the caller's already-computed mutex tables
    /// (mutex discovery is an external collaborator); `potential`
    /// is an optional external per-fact linear-potential map (also an
    /// external collaborator's output) keyed by the *un-reordered* fact ids
    /// `task` was supplied with.
    pub fn new(
        task: FdrTask,
        mutex: MutexPairs,
        mgroups: MutexGroups,
        potential: Option<HashMap<FactId, f64>>,
        config: SymbolicConfig,
    ) -> SymbolicResult<Self> {
        task.validate()?;

        let order = ordering::order_variables(&task, &OrderingConfig::default());
        let (task, fact_remap) = ordering::apply_order(&task, &order);
        let mutex = mutex.remap_facts(&fact_remap);
        let mut mgroups = mgroups;
        mgroups.remap_facts(&fact_remap);
        let potential = potential.map(|p| {
            p.into_iter().filter_map(|(f, v)| fact_remap.get(&f).map(|&nf| (nf, v))).collect::<HashMap<_, _>>()
        });

        let groups: Vec<Vec<FactId>> = (0..task.nb_variables())
            .map(|v| {
                let var = Variable(v);
                let domain = task.variables[v].domain_size();
                (0..domain).map(|val| task.fact_id(var, val as i32)).collect()
            })
            .collect();
        let total_bits: usize = groups.iter().map(|g| bits_needed(g.len())).sum();
        let manager = BddManager::new((2 * total_bits) as u16, total_bits.max(1) as u16, config.cache_size);
        let vars = SymbolicVariables::new(&manager, groups);

        let disambig = Disambiguator::new(task.fact_count(), &mgroups, &mutex, true, true);

        let initial_facts: Vec<FactId> =
            task.initial_state.iter().map(|(v, val)| task.fact_id(v, val)).collect();
        let goal_facts: Vec<FactId> = task.goal.iter().map(|(v, val)| task.fact_id(v, val)).collect();
        check_fact_set_solvable(&disambig, &initial_facts, "the initial state")?;
        check_fact_set_solvable(&disambig, &goal_facts, "the goal")?;

        let constr_budget =
            Budget::new(NodeLimit::from_signed(config.constr_max_nodes), TimeLimit::from_secs(config.constr_max_time));
        // Direction-crossed: fw-mutex pairs are pruned from
        // bw images and vice versa, so a forward search is constrained by
        // the collection built over *bw*-mutex pairs and a backward search
        // by the one built over *fw*-mutex pairs.
        let fw_constraints = config
            .fw
            .use_constr
            .then(|| constraints::build(&vars, &manager, &mutex, &mgroups, constraints::Direction::Bw, constr_budget));
        let bw_constraints = config
            .bw
            .use_constr
            .then(|| constraints::build(&vars, &manager, &mutex, &mgroups, constraints::Direction::Fw, constr_budget));

        let fw_merge_budget = Budget::new(
            NodeLimit::from_signed(config.fw.trans_merge_max_nodes),
            TimeLimit::from_secs(config.fw.trans_merge_max_time),
        );
        let bw_merge_budget = Budget::new(
            NodeLimit::from_signed(config.bw.trans_merge_max_nodes),
            TimeLimit::from_secs(config.bw.trans_merge_max_time),
        );
        let fw_heur_enabled = config.fw.use_pot_heur;
        let bw_heur_enabled = config.bw.use_pot_heur;
        let fw_potential = potential.clone();
        let bw_potential = potential.clone();
        let fw_transitions = build_transitions(
            &manager,
            &vars,
            &task,
            &disambig,
            &mutex,
            config.fw.use_op_constr,
            &|op_id| heur_change_of(&task, &fw_potential, fw_heur_enabled, op_id),
            fw_merge_budget,
        );
        let bw_transitions = build_transitions(
            &manager,
            &vars,
            &task,
            &disambig,
            &mutex,
            config.bw.use_op_constr,
            &|op_id| heur_change_of(&task, &bw_potential, bw_heur_enabled, op_id),
            bw_merge_budget,
        );

        let initial_bdd = vars.create_state(&manager, &initial_facts);
        let mut goal_bdd = vars.create_partial_state(&manager, &goal_facts);
        let mut goal_constraint_failed = false;
        if let Some(c) = &fw_constraints {
            let goal_budget = Budget::new(NodeLimit::unbounded(), TimeLimit::from_secs(config.goal_constr_max_time));
            match c.apply_limited(&manager, &goal_bdd, goal_budget) {
                Some(tightened) => goal_bdd = tightened,
                None => {
                    goal_constraint_failed = true;
                    warn!(goal_constr_max_time = config.goal_constr_max_time, "goal_constraint_tightening_timed_out");
                }
            }
        }

        let goal_splits = if config.bw.use_goal_splitting {
            let enabled = bw_heur_enabled;
            split_goal(&manager, &vars, &mgroups, &disambig, &goal_facts, &|f| potential_of(&potential, &[f], enabled), 0)?
        } else {
            Vec::new()
        };

        Ok(SymbolicTask {
            config,
            manager,
            task,
            mutex,
            mgroups,
            vars,
            fw_constraints,
            bw_constraints,
            fw_transitions,
            bw_transitions,
            potential,
            initial_bdd,
            goal_bdd,
            goal_splits,
            goal_constraint_failed,
        })
    }

    /// `GoalConstraintFailed`-equivalent task query: whether tightening the
    /// goal BDD under `goal_constr_max_time` ran out of time, in which case
    /// search continues with the raw goal.
    pub fn goal_constraint_failed(&self) -> bool {
        self.goal_constraint_failed
    }

    fn initial_h(&self) -> i64 {
        let facts: Vec<FactId> =
            self.task.initial_state.iter().map(|(v, val)| self.task.fact_id(v, val)).collect();
        potential_to_h(potential_of(&self.potential, &facts, self.config.fw.use_pot_heur))
    }

    fn log_stats(&self, search: &DirectionSearch) {
        let (generated, expanded, avg) = search.stats();
        info!(dir = ?search.direction(), generated, expanded, "expanded_bdd_nodes");
        info!(dir = ?search.direction(), avg, "avg_expanded_bdd_nodes");
    }

    /// Runs forward search alone to completion.
    pub fn search_fw(&self, deadline: TimeLimit) -> (SearchOutcome, Option<Plan>) {
        if !self.config.fw.enabled {
            return (SearchOutcome::Fail, None);
        }
        let mut fw = DirectionSearch::new(
            &self.manager,
            &self.task,
            SearchDirection::Fw,
            &self.fw_transitions,
            self.fw_constraints.as_ref(),
            false,
            self.config.fw.step_time_limit,
            self.config.log_every_step,
        );
        fw.seed(self.initial_bdd.clone(), self.initial_h());
        let result = engine::run_uni(&mut fw, &self.vars, &self.goal_bdd, deadline);
        self.log_stats(&fw);
        result
    }

    /// Runs backward search alone to completion.
    pub fn search_bw(&self, deadline: TimeLimit) -> (SearchOutcome, Option<Plan>) {
        if !self.config.bw.enabled {
            return (SearchOutcome::Fail, None);
        }
        let mut bw = DirectionSearch::new(
            &self.manager,
            &self.task,
            SearchDirection::Bw,
            &self.bw_transitions,
            self.bw_constraints.as_ref(),
            false,
            self.config.bw.step_time_limit,
            self.config.log_every_step,
        );
        if self.config.bw.use_goal_splitting {
            bw.seed_splits(self.goal_splits.clone());
        } else {
            bw.seed(self.goal_bdd.clone(), 0);
        }
        let result = engine::run_uni(&mut bw, &self.vars, &self.initial_bdd, deadline);
        self.log_stats(&bw);
        result
    }

    /// Runs both directions concurrently, falling back to
    /// the lone enabled direction when the other is disabled in `config`.
    pub fn search_fw_bw(&self, deadline: TimeLimit) -> (SearchOutcome, Option<Plan>) {
        if !self.config.fw.enabled {
            return self.search_bw(deadline);
        }
        if !self.config.bw.enabled {
            return self.search_fw(deadline);
        }
        let mut fw = DirectionSearch::new(
            &self.manager,
            &self.task,
            SearchDirection::Fw,
            &self.fw_transitions,
            self.fw_constraints.as_ref(),
            true,
            self.config.fw.step_time_limit,
            self.config.log_every_step,
        );
        let mut bw = DirectionSearch::new(
            &self.manager,
            &self.task,
            SearchDirection::Bw,
            &self.bw_transitions,
            self.bw_constraints.as_ref(),
            true,
            self.config.bw.step_time_limit,
            self.config.log_every_step,
        );
        fw.seed(self.initial_bdd.clone(), self.initial_h());
        if self.config.bw.use_goal_splitting {
            bw.seed_splits(self.goal_splits.clone());
        } else {
            bw.seed(self.goal_bdd.clone(), 0);
        }
        let result = engine::run_bidirectional(&mut fw, &mut bw, &self.vars, deadline);
        self.log_stats(&fw);
        self.log_stats(&bw);
        result
    }

    /// `pddlSymbolicTaskCheckApplyFw`-equivalent: true
    /// when no two facts of `facts` are fw-mutex.
    pub fn check_apply_fw(&self, facts: &[FactId]) -> bool {
        !self.mutex.set_mutex_with_set(facts, facts, true, false)
    }

    /// `pddlSymbolicTaskCheckApplyBw`-equivalent.
    pub fn check_apply_bw(&self, facts: &[FactId]) -> bool {
        !self.mutex.set_mutex_with_set(facts, facts, false, true)
    }

    /// `pddlSymbolicTaskCheckPlan`-equivalent: replays `plan` from the
    /// initial state and checks every intermediate state against the mutex
    /// table (property 9).
    pub fn check_plan(&self, plan: &Plan) -> bool {
        engine::check_consistent(&self.task, &self.mutex, plan)
    }

    pub fn config(&self) -> &SymbolicConfig {
        &self.config
    }

    pub fn fdr_task(&self) -> &FdrTask {
        &self.task
    }
}

/// The per-operator heuristic delta fed to [`build_transitions`]: the
/// potential lost by replacing the operator's preconditions with its
/// effects, or a flat zero when the direction's potential heuristic is
/// disabled. The exact combination formula is left to the external LP
/// solver; only the on/off toggle is specified here, see DESIGN.md.
fn heur_change_of(task: &FdrTask, potential: &Option<HashMap<FactId, f64>>, enabled: bool, op_id: usize) -> i64 {
    if !enabled {
        return 0;
    }
    let Some(p) = potential else { return 0 };
    let op = &task.operators[op_id];
    let pre_facts: Vec<FactId> = op.pre.iter().map(|(v, val)| task.fact_id(v, val)).collect();
    let eff_facts: Vec<FactId> = op.eff.iter().map(|(v, val)| task.fact_id(v, val)).collect();
    let pre_sum: f64 = pre_facts.iter().filter_map(|f| p.get(f)).sum();
    let eff_sum: f64 = eff_facts.iter().filter_map(|f| p.get(f)).sum();
    (pre_sum - eff_sum).round() as i64
}
