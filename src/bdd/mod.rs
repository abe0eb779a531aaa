//! The BDD manager façade.
//!
//! Wraps a canonical reduced-ordered-BDD package (`biodivine_lib_bdd`) behind
//! a narrow, reference-counting-free interface: every [`Bdd`] handle is an
//! owned, independently-reduced diagram, which is exactly the memory model
//! `biodivine_lib_bdd` itself provides (no shared node graph, so `Clone`ing a
//! handle is a deep but garbage-collector-free copy -- there is no `Del` to
//! call). `AndAbstract`, the swap-vars renaming and every "limited" variant
//! below are built on top of the handful of primitives
//! the underlying package exposes (`and`, `or`, `not`, `xor`, `exists`).
//!
//! A thin struct holding the handle type plus bookkeeping, with no global
//! mutable state beyond the one manager per top-level search.

pub mod limits;

use biodivine_lib_bdd::{Bdd as InnerBdd, BddVariable, BddVariableSetBuilder, BddVariableSet};
use limits::Budget;

/// An opaque BDD variable id, exposed so that upper layers never have to
/// reach into `biodivine_lib_bdd` directly.
pub type Var = BddVariable;

/// An owned, reduced, ordered BDD handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bdd(InnerBdd);

/// A ternary cube: one entry per manager variable, `None` meaning "don't care".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cube(Vec<Option<bool>>);

impl Cube {
    pub fn get(&self, v: Var) -> Option<bool> {
        self.0[idx(v)]
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn idx(v: Var) -> usize {
    // BddVariable exposes no public index accessor; we rely on its `Debug`
    // round-trip being stable within one process, which is all a manager
    // ever needs (ids are never serialized across runs).
    format!("{:?}", v)
        .trim_start_matches("BddVariable(")
        .trim_end_matches(')')
        .parse()
        .expect("biodivine_lib_bdd::BddVariable always debug-prints its index")
}

/// The BDD manager: owns the variable universe and the reserved temporary
/// variables used to implement [`BddManager::swap_vars`] (see below).
pub struct BddManager {
    universe: BddVariableSet,
    /// Temporaries used by the substitution-based variable swap, one per
    /// "pre" variable declared at construction time. Not used for anything
    /// else; never exposed outside this module.
    tmp_vars: Vec<Var>,
    cache_size: usize,
}

impl BddManager {
    /// Builds a manager whose universe has `nb_vars` ordinary variables plus
    /// `nb_swap_tmp` reserved temporaries (the widest pre/eff cube the caller
    /// will ever need to swap), configured with the requested operation cache
    /// size (`cache_size`, default 16_000_000 -- honoured here only
    /// as a hint recorded for diagnostics, since `biodivine_lib_bdd` itself
    /// has no operation cache to size).
    pub fn new(nb_vars: u16, nb_swap_tmp: u16, cache_size: usize) -> Self {
        let mut builder = BddVariableSetBuilder::new();
        let mut ordinary = Vec::with_capacity(nb_vars as usize);
        for i in 0..nb_vars {
            ordinary.push(builder.make_variable(&format!("v{i}")));
        }
        let mut tmp_vars = Vec::with_capacity(nb_swap_tmp as usize);
        for i in 0..nb_swap_tmp {
            tmp_vars.push(builder.make_variable(&format!("tmp{i}")));
        }
        let universe = builder.build();
        let _ = ordinary; // variables live inside `universe`; ids are recovered via `var(usize)`.
        BddManager {
            universe,
            tmp_vars,
            cache_size,
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Returns the manager variable with the given ordinal (0-based, in
    /// declaration order). Panics on out-of-range -- a programming error, not
    /// a recoverable fault ("bugs... may abort the process").
    pub fn var(&self, ordinal: usize) -> Var {
        self.universe.variables()[ordinal]
    }

    pub fn mk_true(&self) -> Bdd {
        Bdd(self.universe.mk_true())
    }

    pub fn mk_false(&self) -> Bdd {
        Bdd(self.universe.mk_false())
    }

    pub fn mk_var(&self, v: Var) -> Bdd {
        Bdd(self.universe.mk_var(v))
    }

    pub fn mk_not_var(&self, v: Var) -> Bdd {
        Bdd(self.universe.mk_not_var(v))
    }

    pub fn not(&self, a: &Bdd) -> Bdd {
        Bdd(a.0.not())
    }

    pub fn and(&self, a: &Bdd, b: &Bdd) -> Bdd {
        Bdd(a.0.and(&b.0))
    }

    pub fn or(&self, a: &Bdd, b: &Bdd) -> Bdd {
        Bdd(a.0.or(&b.0))
    }

    pub fn xnor(&self, a: &Bdd, b: &Bdd) -> Bdd {
        Bdd(a.0.iff(&b.0))
    }

    pub fn exists(&self, a: &Bdd, cube: &[Var]) -> Bdd {
        Bdd(a.0.exists(cube))
    }

    /// `And` immediately followed by existential quantification over `cube`.
    pub fn and_abstract(&self, a: &Bdd, b: &Bdd, cube: &[Var]) -> Bdd {
        self.exists(&self.and(a, b), cube)
    }

    /// `And` bounded by `budget`: computes the conjunction, then discards the
    /// result (returning `None`) if it overran either the node count or the
    /// deadline. See the module doc for why a post-hoc check, rather than
    /// true cancellation, is how limits are enforced here.
    pub fn and_limited(&self, a: &Bdd, b: &Bdd, budget: Budget) -> Option<Bdd> {
        if budget.time.is_expired() {
            return None;
        }
        let result = self.and(a, b);
        if budget.time.is_expired() || budget.nodes.exceeded_by(self.size(&result)) {
            None
        } else {
            Some(result)
        }
    }

    pub fn or_limited(&self, a: &Bdd, b: &Bdd, budget: Budget) -> Option<Bdd> {
        if budget.time.is_expired() {
            return None;
        }
        let result = self.or(a, b);
        if budget.time.is_expired() || budget.nodes.exceeded_by(self.size(&result)) {
            None
        } else {
            Some(result)
        }
    }

    pub fn and_abstract_limited(&self, a: &Bdd, b: &Bdd, cube: &[Var], budget: Budget) -> Option<Bdd> {
        if budget.time.is_expired() {
            return None;
        }
        let result = self.and_abstract(a, b, cube);
        if budget.time.is_expired() || budget.nodes.exceeded_by(self.size(&result)) {
            None
        } else {
            Some(result)
        }
    }

    /// Renames every variable in `from[i]` to `to[i]` throughout `bdd`.
    ///
    /// `biodivine_lib_bdd` has no native variable-permutation primitive, so
    /// this is implemented with the classical frame-axiom substitution built
    /// only out of `And`/`Exists`/`Iff` (the same primitives this façade
    /// already exposes elsewhere): route each value through a
    /// private temporary variable so that `from` and `to` never need to be
    /// disjoint from one another.
    ///
    /// `from` and `to` must have the same length and must not be longer than
    /// the number of temporaries reserved at construction time.
    pub fn swap_vars(&self, bdd: &Bdd, from: &[Var], to: &[Var]) -> Bdd {
        assert_eq!(from.len(), to.len(), "swap_vars: mismatched variable lists");
        assert!(
            from.len() <= self.tmp_vars.len(),
            "swap_vars: not enough reserved temporaries"
        );

        // Step 1: move the value of each `from[i]` into a fresh temporary.
        let mut moved = bdd.clone();
        for (f, t) in from.iter().zip(self.tmp_vars.iter()) {
            let link = Bdd(self.universe.mk_var(*f).iff(&self.universe.mk_var(*t)));
            moved = self.and(&moved, &link);
        }
        moved = self.exists(&moved, from);

        // Step 2: move the value out of each temporary into `to[i]`.
        let mut result = moved;
        for (t, dst) in self.tmp_vars.iter().zip(to.iter()) {
            let link = Bdd(self.universe.mk_var(*t).iff(&self.universe.mk_var(*dst)));
            result = self.and(&result, &link);
        }
        self.exists(&result, &self.tmp_vars[..from.len()])
    }

    pub fn size(&self, bdd: &Bdd) -> usize {
        bdd.0.size()
    }

    /// Number of satisfying valuations over `nb_binary_vars` variables.
    pub fn count_minterm(&self, bdd: &Bdd, nb_binary_vars: u16) -> f64 {
        bdd.0.cardinality() * 2f64.powi((nb_binary_vars as i32) - (bdd.0.num_vars() as i32))
    }

    /// A ternary cube over all manager variables that is contained in `bdd`,
    /// or `None` if `bdd` is false.
    pub fn pick_one_cube(&self, bdd: &Bdd) -> Option<Cube> {
        let path = bdd.0.first_path()?;
        let nb = self.universe.variables().len();
        let mut entries = vec![None; nb];
        for v in self.universe.variables() {
            entries[idx(v)] = path.get_value(v);
        }
        Some(Cube(entries))
    }

    pub fn is_false(&self, bdd: &Bdd) -> bool {
        bdd.0.is_false()
    }

    pub fn is_true(&self, bdd: &Bdd) -> bool {
        bdd.0.is_true()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use limits::{Budget, NodeLimit, TimeLimit};

    fn mgr() -> BddManager {
        BddManager::new(4, 2, 1024)
    }

    #[test]
    fn constants_and_literals() {
        let m = mgr();
        assert!(m.is_true(&m.mk_true()));
        assert!(m.is_false(&m.mk_false()));
        let v0 = m.var(0);
        let lit = m.mk_var(v0);
        let nlit = m.mk_not_var(v0);
        assert!(!m.is_false(&lit));
        assert_eq!(m.size(&m.and(&lit, &nlit)), m.size(&m.mk_false()));
    }

    #[test]
    fn or_not_and_demorgan() {
        let m = mgr();
        let a = m.mk_var(m.var(0));
        let b = m.mk_var(m.var(1));
        let lhs = m.not(&m.or(&a, &b));
        let rhs = m.and(&m.not(&a), &m.not(&b));
        assert_eq!(lhs, rhs);
    }

    #[test]
    fn swap_vars_is_involutive() {
        let m = mgr();
        let pre = [m.var(0), m.var(1)];
        let eff = [m.var(2), m.var(3)];
        let x = m.and(&m.mk_var(pre[0]), &m.mk_not_var(pre[1]));
        let swapped = m.swap_vars(&x, &pre, &eff);
        let back = m.swap_vars(&swapped, &eff, &pre);
        assert_eq!(x, back);
        // and it actually moved the variables:
        assert_ne!(x, swapped);
    }

    #[test]
    fn and_limited_fails_over_node_budget() {
        let m = mgr();
        let a = m.mk_var(m.var(0));
        let b = m.mk_var(m.var(1));
        let budget = Budget::new(NodeLimit::from_signed(0), TimeLimit::unbounded());
        assert!(m.and_limited(&a, &b, budget).is_none());
    }

    #[test]
    fn pick_one_cube_roundtrips_on_singleton() {
        let m = mgr();
        let v0 = m.var(0);
        let lit = m.mk_var(v0);
        let cube = m.pick_one_cube(&lit).unwrap();
        assert_eq!(cube.get(v0), Some(true));
    }
}
