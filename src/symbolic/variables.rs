//! BDD encoding of fact groups: each group of mutually-exclusive facts gets
//! its own block of BDD variables, in both "pre" and "eff" flavours.

use fxhash::FxHashMap;

use crate::bdd::{Bdd, BddManager, Cube, Var};
use crate::fdr::model::FactId;

/// One fact group: an ordered list of mutually-exclusive facts (its values),
/// plus the BDD variables allocated to encode which value holds, in both
/// the pre- and eff-variable flavours.
#[derive(Debug, Clone)]
pub struct FactGroup {
    pub id: usize,
    pub facts: Vec<FactId>,
    pub pre_vars: Vec<Var>,
    pub eff_vars: Vec<Var>,
}

impl FactGroup {
    pub fn nb_bits(&self) -> usize {
        self.pre_vars.len()
    }

    pub fn value_of(&self, fact: FactId) -> Option<usize> {
        self.facts.iter().position(|&f| f == fact)
    }
}

fn bits_needed(k: usize) -> usize {
    if k <= 1 {
        0
    } else {
        (usize::BITS - (k - 1).leading_zeros()) as usize
    }
}

/// The symbolic variable layout plus the per-fact pre/eff BDDs it implies.
/// Construction takes the group collection already ordered 
/// (variable ordering): groups are encoded in the order given, and within a
/// group its pre/eff bits are interleaved `(pre0, eff0, pre1, eff1, ...)`.
pub struct SymbolicVariables {
    groups: Vec<FactGroup>,
    fact_group: FxHashMap<FactId, usize>,
    pre_bdd: FxHashMap<FactId, Bdd>,
    eff_bdd: FxHashMap<FactId, Bdd>,
    valid_states: Bdd,
}

impl SymbolicVariables {
    /// `groups` lists, for every group in ordering order, its facts
    /// (including a synthetic "none-of-those" fact id if added
    /// one upstream). Allocates `2 * sum(ceil(log2 k))` BDD variables from
    /// `manager`, which must have been constructed with at least that many.
    pub fn new(manager: &BddManager, groups: Vec<Vec<FactId>>) -> Self {
        let mut ordinal = 0usize;
        let mut built = Vec::with_capacity(groups.len());
        let mut fact_group = FxHashMap::default();
        let mut pre_bdd = FxHashMap::default();
        let mut eff_bdd = FxHashMap::default();

        for (gid, facts) in groups.into_iter().enumerate() {
            let nbits = bits_needed(facts.len());
            let mut pre_vars = Vec::with_capacity(nbits);
            let mut eff_vars = Vec::with_capacity(nbits);
            for _ in 0..nbits {
                pre_vars.push(manager.var(ordinal));
                ordinal += 1;
                eff_vars.push(manager.var(ordinal));
                ordinal += 1;
            }

            for (val, &fact) in facts.iter().enumerate() {
                fact_group.insert(fact, gid);
                pre_bdd.insert(fact, Self::literal_conjunction(manager, &pre_vars, val));
                eff_bdd.insert(fact, Self::literal_conjunction(manager, &eff_vars, val));
            }

            built.push(FactGroup {
                id: gid,
                facts,
                pre_vars,
                eff_vars,
            });
        }

        let mut valid_states = manager.mk_true();
        for g in &built {
            let mut group_disj = manager.mk_false();
            for &fact in &g.facts {
                group_disj = manager.or(&group_disj, &pre_bdd[&fact]);
            }
            valid_states = manager.and(&valid_states, &group_disj);
        }

        SymbolicVariables {
            groups: built,
            fact_group,
            pre_bdd,
            eff_bdd,
            valid_states,
        }
    }

    fn literal_conjunction(manager: &BddManager, vars: &[Var], value: usize) -> Bdd {
        let mut bdd = manager.mk_true();
        for (i, &v) in vars.iter().enumerate() {
            let bit_set = (value >> i) & 1 == 1;
            let lit = if bit_set { manager.mk_var(v) } else { manager.mk_not_var(v) };
            bdd = manager.and(&bdd, &lit);
        }
        bdd
    }

    pub fn groups(&self) -> &[FactGroup] {
        &self.groups
    }

    pub fn group_of(&self, fact: FactId) -> Option<&FactGroup> {
        self.fact_group.get(&fact).map(|&gid| &self.groups[gid])
    }

    pub fn pre(&self, fact: FactId) -> &Bdd {
        &self.pre_bdd[&fact]
    }

    pub fn eff(&self, fact: FactId) -> &Bdd {
        &self.eff_bdd[&fact]
    }

    pub fn valid_states(&self) -> &Bdd {
        &self.valid_states
    }

    /// `create_state(set)`: conjunction of the pre-BDDs of the given facts.
    pub fn create_state(&self, manager: &BddManager, facts: &[FactId]) -> Bdd {
        let mut bdd = manager.mk_true();
        for &f in facts {
            bdd = manager.and(&bdd, self.pre(f));
        }
        bdd
    }

    /// `create_partial_state(set)`: `create_state(set)` intersected with
    /// `valid_states`, so the result can only describe consistent states.
    pub fn create_partial_state(&self, manager: &BddManager, facts: &[FactId]) -> Bdd {
        manager.and(&self.create_state(manager, facts), &self.valid_states)
    }

    /// `create_biimp(group)`: the frame axiom for a group untouched by a
    /// transition -- conjunction over the group's bits of `pre_bit <-> eff_bit`.
    pub fn create_biimp(&self, manager: &BddManager, group: &FactGroup) -> Bdd {
        let mut bdd = manager.mk_true();
        for (&p, &e) in group.pre_vars.iter().zip(group.eff_vars.iter()) {
            let p_lit = manager.mk_var(p);
            let e_lit = manager.mk_var(e);
            bdd = manager.and(&bdd, &manager.xnor(&p_lit, &e_lit));
        }
        bdd
    }

    /// `create_mutex_pre(f1, f2)` = `¬(pre(f1) ∧ pre(f2))`.
    pub fn create_mutex_pre(&self, manager: &BddManager, f1: FactId, f2: FactId) -> Bdd {
        manager.not(&manager.and(self.pre(f1), self.pre(f2)))
    }

    /// `create_exactly_one_mgroup_pre(set)` = disjunction of the listed
    /// facts' pre-BDDs.
    pub fn create_exactly_one_mgroup_pre(&self, manager: &BddManager, facts: &[FactId]) -> Bdd {
        let mut bdd = manager.mk_false();
        for &f in facts {
            bdd = manager.or(&bdd, self.pre(f));
        }
        bdd
    }

    /// `create_exactly_one_mgroup_eff(set)`: same, over the eff-BDDs.
    pub fn create_exactly_one_mgroup_eff(&self, manager: &BddManager, facts: &[FactId]) -> Bdd {
        let mut bdd = manager.mk_false();
        for &f in facts {
            bdd = manager.or(&bdd, self.eff(f));
        }
        bdd
    }

    /// Decodes a ternary cube produced by [`BddManager::pick_one_cube`] into
    /// the fact of `group` whose value matches the cube's bits over the
    /// group's pre variables. `None` if the cube leaves a bit unconstrained
    /// or does not match any of the group's values.
    pub fn fact_from_bdd_cube(&self, group: &FactGroup, cube: &Cube) -> Option<FactId> {
        let mut value = 0usize;
        for (i, &v) in group.pre_vars.iter().enumerate() {
            match cube.get(v) {
                Some(true) => value |= 1 << i,
                Some(false) => {}
                None => return None,
            }
        }
        group.facts.get(value).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bdd::BddManager;

    fn vars_for(groups: Vec<Vec<FactId>>) -> (BddManager, SymbolicVariables) {
        let total_bits: usize = groups.iter().map(|g| bits_needed(g.len())).sum();
        let manager = BddManager::new((2 * total_bits) as u16, 2 * total_bits as u16, 1024);
        let vars = SymbolicVariables::new(&manager, groups);
        (manager, vars)
    }

    #[test]
    fn two_value_group_allocates_one_bit_pair() {
        let (_, vars) = vars_for(vec![vec![FactId(0), FactId(1)]]);
        let g = &vars.groups()[0];
        assert_eq!(g.nb_bits(), 1);
    }

    #[test]
    fn valid_states_accepts_every_group_value() {
        let (m, vars) = vars_for(vec![vec![FactId(0), FactId(1), FactId(2)]]);
        let any_value = m.or(&m.or(vars.pre(FactId(0)), vars.pre(FactId(1))), vars.pre(FactId(2)));
        assert_eq!(vars.valid_states(), &any_value);
    }

    #[test]
    fn facts_of_the_same_group_are_pairwise_exclusive() {
        let (m, vars) = vars_for(vec![vec![FactId(0), FactId(1)]]);
        let both = m.and(vars.pre(FactId(0)), vars.pre(FactId(1)));
        assert!(m.is_false(&both));
    }

    #[test]
    fn mutex_pre_forbids_the_conjunction() {
        let (m, vars) = vars_for(vec![vec![FactId(0)], vec![FactId(1)]]);
        // single-value groups need zero bits; create_mutex_pre still must
        // reduce to false since both facts hold unconditionally.
        let mutex = vars.create_mutex_pre(&m, FactId(0), FactId(1));
        assert!(m.is_false(&mutex));
    }

    #[test]
    fn fact_from_cube_roundtrips() {
        let (m, vars) = vars_for(vec![vec![FactId(0), FactId(1), FactId(2), FactId(3)]]);
        let g = &vars.groups()[0];
        let cube = m.pick_one_cube(vars.pre(FactId(2))).unwrap();
        assert_eq!(vars.fact_from_bdd_cube(g, &cube), Some(FactId(2)));
    }

    #[test]
    fn create_biimp_is_true_only_when_pre_and_eff_agree() {
        let (m, vars) = vars_for(vec![vec![FactId(0), FactId(1)]]);
        let g = &vars.groups()[0];
        let biimp = vars.create_biimp(&m, g);
        let pre1_eff1 = m.and(vars.pre(FactId(1)), vars.eff(FactId(1)));
        assert_eq!(m.and(&biimp, &pre1_eff1), pre1_eff1);
        let pre1_eff0 = m.and(vars.pre(FactId(1)), vars.eff(FactId(0)));
        assert!(m.is_false(&m.and(&biimp, &pre1_eff0)));
    }
}
