//! End-to-end scenarios against the public `SymbolicTask` surface: flat
//! `#[test] fn name() { assert_eq!(solve(...), expected) }` cases built from
//! literal in-memory task constructions.

use std::collections::HashMap;

use pddl_symbolic::bdd::limits::TimeLimit;
use pddl_symbolic::bdd::BddManager;
use pddl_symbolic::fdr::model::FactId;
use pddl_symbolic::search::goal_split::split_goal;
use pddl_symbolic::symbolic::disambiguation::Disambiguator;
use pddl_symbolic::symbolic::variables::SymbolicVariables;
use pddl_symbolic::{
    DirectionConfig, FdrTask, FdrVariable, MutexGroups, MutexPairs, Operator, PartialState,
    SearchOutcome, SymbolicConfig, SymbolicTask,
};

fn var(name: &str, values: &[&str]) -> pddl_symbolic::fdr::model::VariableInfo {
    pddl_symbolic::fdr::model::VariableInfo {
        name: name.to_string(),
        values: values.iter().map(|s| s.to_string()).collect(),
    }
}

fn op(name: &str, cost: u32, pre: &[(usize, i32)], eff: &[(usize, i32)]) -> Operator {
    Operator {
        name: name.to_string(),
        cost,
        pre: PartialState::from_pairs(pre.iter().map(|&(v, val)| (FdrVariable(v), val))),
        eff: PartialState::from_pairs(eff.iter().map(|&(v, val)| (FdrVariable(v), val))),
        cond_eff: Vec::new(),
    }
}

fn build(
    task: FdrTask,
    mutex: MutexPairs,
    mgroups: MutexGroups,
    config: SymbolicConfig,
) -> SymbolicTask {
    // install a subscriber so `cargo test -- --nocapture` surfaces the
    // `expanded_bdd_nodes`/`avg_expanded_bdd_nodes` events `log_stats` emits.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    SymbolicTask::new(task, mutex, mgroups, None, config).expect("task should build")
}

/// S1: a single boolean switch, init off, goal on. Expect the unit-cost
/// `turn_on` plan.
#[test]
fn single_toggle_finds_the_unit_cost_plan() {
    let variables = vec![var("switch", &["off", "on"])];
    let initial = PartialState::from_pairs([(FdrVariable(0), 0)]);
    let goal = PartialState::from_pairs([(FdrVariable(0), 1)]);
    let operators = vec![
        op("turn_on", 1, &[(0, 0)], &[(0, 1)]),
        op("turn_off", 1, &[(0, 1)], &[(0, 0)]),
    ];
    let task = FdrTask::new(variables, initial, goal, operators);
    let symbolic = build(task, MutexPairs::new(), MutexGroups::new(), SymbolicConfig::default());

    let (outcome, plan) = symbolic.search_fw_bw(TimeLimit::unbounded());
    assert_eq!(outcome, SearchOutcome::PlanFound);
    let plan = plan.unwrap();
    assert_eq!(plan.cost, 1);
    assert_eq!(plan.len(), 1);
    assert!(symbolic.check_plan(&plan));
}

/// S2: two independent switches, both starting off and both required on.
/// Any interleaving of the two unit-cost flips is optimal at cost 2.
#[test]
fn two_independent_toggles_need_exactly_one_flip_each() {
    let variables = vec![var("a", &["off", "on"]), var("b", &["off", "on"])];
    let initial = PartialState::from_pairs([(FdrVariable(0), 0), (FdrVariable(1), 0)]);
    let goal = PartialState::from_pairs([(FdrVariable(0), 1), (FdrVariable(1), 1)]);
    let operators = vec![
        op("turn_on_a", 1, &[(0, 0)], &[(0, 1)]),
        op("turn_on_b", 1, &[(1, 0)], &[(1, 1)]),
    ];
    let task = FdrTask::new(variables, initial, goal, operators);
    let symbolic = build(task, MutexPairs::new(), MutexGroups::new(), SymbolicConfig::default());

    let (outcome, plan) = symbolic.search_fw_bw(TimeLimit::unbounded());
    assert_eq!(outcome, SearchOutcome::PlanFound);
    let plan = plan.unwrap();
    assert_eq!(plan.cost, 2);
    assert_eq!(plan.len(), 2);
    assert!(symbolic.check_plan(&plan));
}

/// S3: mutex discovery matters. A package can be `load`ed, `move`d while
/// loaded, or `unload`ed; the cheap `move` (cost 2) gets a package from a to
/// b directly, while `load`/`unload` (cost 1 each) only ever move the
/// carrier, not the package itself -- so the cost-optimal plan is `[move]`,
/// not the naive `[load, move, unload]` (cost 4).
#[test]
fn cost_optimal_search_prefers_the_cheaper_plan_over_the_naive_one() {
    let variables = vec![
        var("carrier", &["unloaded", "loaded"]),
        var("at", &["a", "b"]),
    ];
    let initial = PartialState::from_pairs([(FdrVariable(0), 0), (FdrVariable(1), 0)]);
    let goal = PartialState::from_pairs([(FdrVariable(1), 1)]);
    let operators = vec![
        op("load", 1, &[(0, 0)], &[(0, 1)]),
        op("unload", 1, &[(0, 1)], &[(0, 0)]),
        op("move", 2, &[(1, 0)], &[(1, 1)]),
    ];
    let task = FdrTask::new(variables, initial, goal, operators);
    let symbolic = build(task, MutexPairs::new(), MutexGroups::new(), SymbolicConfig::default());

    let (outcome, plan) = symbolic.search_fw_bw(TimeLimit::unbounded());
    assert_eq!(outcome, SearchOutcome::PlanFound);
    let plan = plan.unwrap();
    assert_eq!(plan.cost, 2);
    assert_eq!(plan.len(), 1);
}

/// S4: a delivery task layered on top of S3's load/move/unload fragment.
/// Expects the plan `[load, move, deliver]` at cost 4, and separately
/// exercises the goal-splitting-by-potential machinery directly: an
/// exactly-one `{at_a, at_b}` mgroup disjoint from the goal is disambiguated
/// into two potential-tagged pieces.
#[test]
fn goal_splitting_by_potential_separates_at_a_from_at_b() {
    let variables = vec![
        var("carrier", &["unloaded", "loaded"]),
        var("at", &["a", "b"]),
        var("pkg", &["at_a", "at_b"]),
    ];
    let initial =
        PartialState::from_pairs([(FdrVariable(0), 0), (FdrVariable(1), 0), (FdrVariable(2), 0)]);
    let goal = PartialState::from_pairs([(FdrVariable(2), 1)]);
    let operators = vec![
        op("load", 1, &[(0, 0), (1, 0)], &[(0, 1)]),
        op("unload", 1, &[(0, 1)], &[(0, 0)]),
        op("move", 2, &[(1, 0)], &[(1, 1)]),
        op("deliver", 1, &[(0, 1), (1, 1), (2, 0)], &[(2, 1)]),
    ];
    let task = FdrTask::new(variables, initial, goal, operators);
    let symbolic = build(task, MutexPairs::new(), MutexGroups::new(), SymbolicConfig::default());

    let (outcome, plan) = symbolic.search_fw_bw(TimeLimit::unbounded());
    assert_eq!(outcome, SearchOutcome::PlanFound);
    let plan = plan.unwrap();
    assert_eq!(plan.cost, 4);
    assert_eq!(plan.len(), 3);

    // unloaded=0, loaded=1, at_a=2, at_b=3, pkg_at_a=4, pkg_at_b=5
    let manager = BddManager::new(6, 6, 1024);
    let vars = SymbolicVariables::new(
        &manager,
        vec![
            vec![FactId(0), FactId(1)],
            vec![FactId(2), FactId(3)],
            vec![FactId(4), FactId(5)],
        ],
    );
    let mut mgroups = MutexGroups::new();
    mgroups.add(vec![FactId(0), FactId(1)]).is_exactly_one = true;
    mgroups.add(vec![FactId(2), FactId(3)]).is_exactly_one = true;
    mgroups.add(vec![FactId(4), FactId(5)]).is_exactly_one = true;

    let potential = |f: FactId| match f.0 {
        2 => -1.0,
        _ => 0.0,
    };
    let disambig = Disambiguator::new(6, &mgroups, &MutexPairs::new(), true, true);
    let splits =
        split_goal(&manager, &vars, &mgroups, &disambig, &[FactId(5)], &potential, 0).expect("goal splits");
    assert_eq!(splits.len(), 2);

    let at_a_piece = splits.iter().find(|s| s.h == 1).expect("at_a piece with h=1");
    let at_b_piece = splits.iter().find(|s| s.h == 0).expect("at_b piece with h=0");
    assert_eq!(manager.and(&at_a_piece.bdd, vars.pre(FactId(2))), at_a_piece.bdd);
    assert!(manager.is_false(&manager.and(&at_a_piece.bdd, vars.pre(FactId(3)))));
    assert_eq!(manager.and(&at_b_piece.bdd, vars.pre(FactId(3))), at_b_piece.bdd);
    assert!(manager.is_false(&manager.and(&at_b_piece.bdd, vars.pre(FactId(2)))));
}

/// S5: a goal that demands two facts flagged mutex by an exactly-one
/// mgroup. The goal BDD tightens to false during construction, and a
/// backward search seeded from it (with goal splitting disabled, so the
/// conjunctive goal is used verbatim rather than disjoined per mgroup)
/// reports `PlanNotExist` without ever finding a path.
#[test]
fn goal_requiring_two_mutex_facts_is_unsolvable() {
    let variables = vec![
        var("switch", &["off", "on"]),
        var("a", &["a_off", "a_on"]),
        var("b", &["b_off", "b_on"]),
    ];
    let initial =
        PartialState::from_pairs([(FdrVariable(0), 1), (FdrVariable(1), 1), (FdrVariable(2), 0)]);
    let goal = PartialState::from_pairs([(FdrVariable(1), 1), (FdrVariable(2), 1)]);
    let operators = vec![
        op("turn_off", 1, &[(0, 1)], &[(0, 0)]),
        op("turn_on", 1, &[(0, 0)], &[(0, 1)]),
        op("set_b", 1, &[(0, 0)], &[(2, 1)]),
    ];
    let task = FdrTask::new(variables, initial, goal, operators);

    // a_on = FactId(3), b_on = FactId(5); flagged mutex both directions, and
    // grouped into an exactly-one mgroup together, per the S5 setup.
    let mut mutex = MutexPairs::new();
    mutex.add(FactId(3), FactId(5), true, true);
    let mut mgroups = MutexGroups::new();
    mgroups.add(vec![FactId(3), FactId(5)]).is_exactly_one = true;

    let mut config = SymbolicConfig::default();
    config.bw.use_goal_splitting = false;

    let symbolic = build(task, mutex, mgroups, config);
    assert!(!symbolic.goal_constraint_failed());

    let (outcome, plan) = symbolic.search_bw(TimeLimit::unbounded());
    assert_eq!(outcome, SearchOutcome::PlanNotExist);
    assert!(plan.is_none());
}

/// S6: ten independent boolean switches, all starting off and all required
/// on. Bi-directional search alternates forward and backward steps and must
/// meet in the middle, producing the optimal ten-step, cost-10 plan.
#[test]
fn bidirectional_search_meets_in_the_middle_on_a_ten_switch_chain() {
    const N: usize = 10;
    let variables: Vec<_> = (0..N).map(|i| var(&format!("switch_{i}"), &["off", "on"])).collect();
    let initial = PartialState::from_pairs((0..N).map(|i| (FdrVariable(i), 0)));
    let goal = PartialState::from_pairs((0..N).map(|i| (FdrVariable(i), 1)));
    let operators: Vec<_> = (0..N)
        .map(|i| op(&format!("turn_on_{i}"), 1, &[(i, 0)], &[(i, 1)]))
        .collect();
    let task = FdrTask::new(variables, initial, goal, operators);
    let symbolic = build(task, MutexPairs::new(), MutexGroups::new(), SymbolicConfig::default());

    let (outcome, plan) = symbolic.search_fw_bw(TimeLimit::unbounded());
    assert_eq!(outcome, SearchOutcome::PlanFound);
    let plan = plan.unwrap();
    assert_eq!(plan.cost, N as i64);
    assert_eq!(plan.len(), N);
    assert!(symbolic.check_plan(&plan));
}

/// A direction explicitly disabled in config falls back cleanly and still
/// finds the optimal plan through the lone enabled direction.
#[test]
fn disabled_forward_direction_falls_back_to_backward_search() {
    let variables = vec![var("switch", &["off", "on"])];
    let initial = PartialState::from_pairs([(FdrVariable(0), 0)]);
    let goal = PartialState::from_pairs([(FdrVariable(0), 1)]);
    let operators = vec![op("turn_on", 1, &[(0, 0)], &[(0, 1)])];
    let task = FdrTask::new(variables, initial, goal, operators);

    let mut config = SymbolicConfig::default();
    config.fw = DirectionConfig { enabled: false, ..DirectionConfig::default() };

    let symbolic = build(task, MutexPairs::new(), MutexGroups::new(), config);
    let (outcome, plan) = symbolic.search_fw_bw(TimeLimit::unbounded());
    assert_eq!(outcome, SearchOutcome::PlanFound);
    assert_eq!(plan.unwrap().cost, 1);
}

/// Sanity check that a potential map passed to `SymbolicTask::new` is keyed
/// by the caller's original (pre-reordering) fact ids: supplying an entry
/// for a fact that exists must not break construction.
#[test]
fn construction_accepts_an_external_potential_map() {
    let variables = vec![var("switch", &["off", "on"])];
    let initial = PartialState::from_pairs([(FdrVariable(0), 0)]);
    let goal = PartialState::from_pairs([(FdrVariable(0), 1)]);
    let operators = vec![op("turn_on", 1, &[(0, 0)], &[(0, 1)])];
    let task = FdrTask::new(variables, initial, goal, operators);

    let mut potential = HashMap::new();
    potential.insert(FactId(1), -2.0);

    let symbolic =
        SymbolicTask::new(task, MutexPairs::new(), MutexGroups::new(), Some(potential), SymbolicConfig::default())
            .expect("task should build with a potential map");
    let (outcome, plan) = symbolic.search_fw(TimeLimit::unbounded());
    assert_eq!(outcome, SearchOutcome::PlanFound);
    assert_eq!(plan.unwrap().cost, 1);
}
