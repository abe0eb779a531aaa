//! FDR variables, partial states and operators.

use std::collections::BTreeMap;

/// An FDR variable, identified by a dense 0-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Variable(pub usize);

impl Variable {
    pub fn id(self) -> usize {
        self.0
    }
}

/// One FDR variable's metadata: its name and the names of its values.
#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub name: String,
    pub values: Vec<String>,
}

impl VariableInfo {
    pub fn domain_size(&self) -> usize {
        self.values.len()
    }
}

/// A flat, globally-unique fact identifier: `(Variable, value)` pairs are
/// numbered densely across all variables so that mutex/mgroup structures
/// (component 6) can index them with a single integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactId(pub usize);

/// An order-invariant partial assignment `{var -> val}`. Two partial states
/// with the same assignments compare equal regardless of the order their
/// facts were inserted in -- `BTreeMap` gives us that for free.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialState(BTreeMap<usize, i32>);

impl PartialState {
    pub fn new() -> Self {
        PartialState(BTreeMap::new())
    }

    pub fn from_pairs<I: IntoIterator<Item = (Variable, i32)>>(pairs: I) -> Self {
        let mut s = PartialState::new();
        for (v, val) in pairs {
            s.set(v, val);
        }
        s
    }

    pub fn set(&mut self, var: Variable, val: i32) {
        self.0.insert(var.id(), val);
    }

    pub fn unset(&mut self, var: Variable) {
        self.0.remove(&var.id());
    }

    pub fn get(&self, var: Variable) -> Option<i32> {
        self.0.get(&var.id()).copied()
    }

    pub fn is_set(&self, var: Variable) -> bool {
        self.0.contains_key(&var.id())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Variable, i32)> + '_ {
        self.0.iter().map(|(&v, &val)| (Variable(v), val))
    }

    pub fn variables(&self) -> impl Iterator<Item = Variable> + '_ {
        self.0.keys().map(|&v| Variable(v))
    }

    /// True iff every fact of `self` holds in `state` (a total assignment
    /// represented the same way a partial one is).
    pub fn is_consistent_with(&self, state: &PartialState) -> bool {
        self.0.iter().all(|(&v, &val)| state.0.get(&v) == Some(&val))
    }

    /// Writes every fact of `self` onto a copy of `base`, returning the
    /// result (`pddlFDRPartStateApplyToState`).
    pub fn apply_to(&self, base: &PartialState) -> PartialState {
        let mut out = base.clone();
        for (&v, &val) in &self.0 {
            out.0.insert(v, val);
        }
        out
    }

    /// `self \ other`: removes every assignment of `self` that `other` also
    /// makes (`pddlFDRPartStateMinus`).
    pub fn minus(&mut self, other: &PartialState) {
        self.0.retain(|v, val| other.0.get(v) != Some(val));
    }
}

/// A conditional effect: `pre` must hold in the *original* state (not the
/// one being built up by prior effects) for `eff` to be applied. The search
/// core requires this list be empty on every operator it consumes:
/// conditional effects must be compiled away upstream.
#[derive(Debug, Clone)]
pub struct CondEffect {
    pub pre: PartialState,
    pub eff: PartialState,
}

/// An FDR operator ("Operator").
#[derive(Debug, Clone)]
pub struct Operator {
    pub name: String,
    pub cost: u32,
    pub pre: PartialState,
    pub eff: PartialState,
    pub cond_eff: Vec<CondEffect>,
}

impl Operator {
    pub fn is_applicable(&self, state: &PartialState) -> bool {
        self.pre.is_consistent_with(state)
    }

    /// `apply(state)`: write `eff` over a copy of `state`, then for every
    /// conditional effect whose `pre` is consistent with the *original*
    /// `state`, write its effect too.
    pub fn apply(&self, state: &PartialState) -> PartialState {
        let mut out = self.eff.apply_to(state);
        for ce in &self.cond_eff {
            if ce.pre.is_consistent_with(state) {
                out = ce.eff.apply_to(&out);
            }
        }
        out
    }
}

/// The finished FDR task this crate consumes ("External
/// interfaces"): variables with named values, an initial state, a goal
/// partial state and an operator list. `has_conditional_effects` must be
/// false for the symbolic search core to accept the task.
#[derive(Debug, Clone)]
pub struct FdrTask {
    pub variables: Vec<VariableInfo>,
    pub initial_state: PartialState,
    pub goal: PartialState,
    pub operators: Vec<Operator>,
    /// `fact_offset[v]` is the `FactId` of value 0 of variable `v`; value
    /// `val` of variable `v` is `FactId(fact_offset[v] + val as usize)`.
    fact_offset: Vec<usize>,
    fact_count: usize,
}

impl FdrTask {
    pub fn new(
        variables: Vec<VariableInfo>,
        initial_state: PartialState,
        goal: PartialState,
        operators: Vec<Operator>,
    ) -> Self {
        let mut fact_offset = Vec::with_capacity(variables.len());
        let mut next = 0usize;
        for v in &variables {
            fact_offset.push(next);
            next += v.domain_size();
        }
        FdrTask {
            variables,
            initial_state,
            goal,
            operators,
            fact_offset,
            fact_count: next,
        }
    }

    pub fn nb_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn fact_count(&self) -> usize {
        self.fact_count
    }

    pub fn fact_id(&self, var: Variable, val: i32) -> FactId {
        FactId(self.fact_offset[var.id()] + val as usize)
    }

    pub fn fact_of(&self, id: FactId) -> (Variable, i32) {
        // fact_offset is sorted ascending; find the owning variable by
        // binary search over offsets.
        let v = match self.fact_offset.binary_search(&id.0) {
            Ok(v) => v,
            Err(next) => next - 1,
        };
        (Variable(v), (id.0 - self.fact_offset[v]) as i32)
    }

    pub fn has_conditional_effects(&self) -> bool {
        self.operators.iter().any(|o| !o.cond_eff.is_empty())
    }

    /// `S \ {facts not satisfied by the initial/goal}`-style well-formedness
    /// check used before search starts (boundary property 10's
    /// dual: reject a task the core cannot search).
    pub fn validate(&self) -> crate::SymbolicResult<()> {
        if self.has_conditional_effects() {
            return Err(crate::SymbolicError::InvalidConfig(
                "symbolic search requires conditional effects to be compiled away".into(),
            ));
        }
        Ok(())
    }
}

/// Transition Normal Form rewriting strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TnfStrategy {
    /// Extend every operator's precondition with a "prevail" fact for every
    /// variable mentioned in its effect but not its precondition.
    PrevailToEff,
    /// Enumerate every disambiguation of the pre/effect mismatch, producing
    /// one operator per combination.
    MultiplyOps,
}

/// Rewrites every operator of `task` into Transition Normal Form: every
/// variable mentioned anywhere in an operator is mentioned in both its
/// precondition and its effect.
pub fn to_transition_normal_form(task: &FdrTask, strategy: TnfStrategy) -> FdrTask {
    let mut operators = Vec::with_capacity(task.operators.len());
    for op in &task.operators {
        let mentioned: Vec<Variable> = op
            .pre
            .variables()
            .chain(op.eff.variables())
            .collect::<std::collections::BTreeSet<_>>()
            .into_iter()
            .collect();
        let missing_from_eff: Vec<Variable> = mentioned
            .iter()
            .copied()
            .filter(|v| op.pre.is_set(*v) && !op.eff.is_set(*v))
            .collect();

        match strategy {
            TnfStrategy::PrevailToEff => {
                // prevail facts become no-op effects: eff[v] := pre[v].
                let mut eff = op.eff.clone();
                for v in missing_from_eff {
                    eff.set(v, op.pre.get(v).unwrap());
                }
                operators.push(Operator {
                    name: op.name.clone(),
                    cost: op.cost,
                    pre: op.pre.clone(),
                    eff,
                    cond_eff: op.cond_eff.clone(),
                });
            }
            TnfStrategy::MultiplyOps => {
                // Prevail facts still become no-op effects: eff[v] := pre[v].
                let mut eff = op.eff.clone();
                for &v in &missing_from_eff {
                    eff.set(v, op.pre.get(v).unwrap());
                }

                // Variables the effect sets but the precondition doesn't:
                // the operator could have applied from any value of that
                // variable's domain. Enumerate every such combination and
                // produce one concrete operator per disambiguation, rather
                // than picking an arbitrary originating value.
                let missing_from_pre: Vec<Variable> = mentioned
                    .iter()
                    .copied()
                    .filter(|v| op.eff.is_set(*v) && !op.pre.is_set(*v))
                    .collect();

                if missing_from_pre.is_empty() {
                    operators.push(Operator {
                        name: op.name.clone(),
                        cost: op.cost,
                        pre: op.pre.clone(),
                        eff,
                        cond_eff: op.cond_eff.clone(),
                    });
                } else {
                    let mut combos: Vec<PartialState> = vec![op.pre.clone()];
                    for &v in &missing_from_pre {
                        let domain = task.variables[v.id()].domain_size();
                        let mut next = Vec::with_capacity(combos.len() * domain);
                        for base in &combos {
                            for val in 0..domain as i32 {
                                let mut pre = base.clone();
                                pre.set(v, val);
                                next.push(pre);
                            }
                        }
                        combos = next;
                    }
                    for (i, pre) in combos.into_iter().enumerate() {
                        operators.push(Operator {
                            name: format!("{}#{i}", op.name),
                            cost: op.cost,
                            pre,
                            eff: eff.clone(),
                            cond_eff: op.cond_eff.clone(),
                        });
                    }
                }
            }
        }
    }
    FdrTask::new(
        task.variables.clone(),
        task.initial_state.clone(),
        task.goal.clone(),
        operators,
    )
}

/// Deletes the given variables, facts of now-removed variables, and
/// operators, returning a task with dense ids. `del_facts` is accepted for
/// symmetry with `del_vars` but is a no-op here: removing
/// a variable already removes every fact that belonged to it.
pub fn reduce(
    task: &FdrTask,
    del_vars: &[Variable],
    _del_facts: &[FactId],
    del_ops: &[usize],
) -> FdrTask {
    let del_vars: std::collections::BTreeSet<usize> = del_vars.iter().map(|v| v.id()).collect();
    let del_ops: std::collections::BTreeSet<usize> = del_ops.iter().copied().collect();

    let mut remap = vec![None; task.variables.len()];
    let mut variables = Vec::new();
    for (old, info) in task.variables.iter().enumerate() {
        if del_vars.contains(&old) {
            continue;
        }
        remap[old] = Some(Variable(variables.len()));
        variables.push(info.clone());
    }

    let remap_state = |s: &PartialState| {
        PartialState::from_pairs(s.iter().filter_map(|(v, val)| {
            remap[v.id()].map(|nv| (nv, val))
        }))
    };

    let initial_state = remap_state(&task.initial_state);
    let goal = remap_state(&task.goal);

    let mut operators = Vec::new();
    for (id, op) in task.operators.iter().enumerate() {
        if del_ops.contains(&id) {
            continue;
        }
        operators.push(Operator {
            name: op.name.clone(),
            cost: op.cost,
            pre: remap_state(&op.pre),
            eff: remap_state(&op.eff),
            cond_eff: op
                .cond_eff
                .iter()
                .map(|ce| CondEffect {
                    pre: remap_state(&ce.pre),
                    eff: remap_state(&ce.eff),
                })
                .collect(),
        });
    }

    FdrTask::new(variables, initial_state, goal, operators)
}
