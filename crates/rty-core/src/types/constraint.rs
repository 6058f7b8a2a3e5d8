//! Type constraints for generic method dispatch.
//!
//! A constraint is created per call site over the method's type-argument
//! symbols. Subtype checks run "under" it record lower/upper bounds instead
//! of comparing variables; `solve` then picks a concrete type for every
//! variable: the meet of its upper bounds, or the join of its lower bounds
//! when only lowers exist, or `untyped` when nothing constrained it.
//!
//! Lifecycle: build, accumulate during argument unification, solve, read
//! solutions through `instantiate`, drop. A constraint attached to a block
//! send is solved later by the `SolveConstraint` instruction.

use super::{join_meet, Type};
use crate::global_state::GlobalState;
use crate::symbols::SymbolRef;
use rustc_hash::FxHashMap;

#[derive(Clone, Debug, Default)]
pub struct TypeConstraint {
    vars: Vec<SymbolRef>,
    uppers: FxHashMap<SymbolRef, Vec<Type>>,
    lowers: FxHashMap<SymbolRef, Vec<Type>>,
    solution: FxHashMap<SymbolRef, Type>,
    solved: bool,
}

impl TypeConstraint {
    pub fn new(vars: Vec<SymbolRef>) -> Self {
        TypeConstraint {
            vars,
            ..Default::default()
        }
    }

    /// Whether this constraint owns the given type variable.
    pub fn owns(&self, var: SymbolRef) -> bool {
        self.vars.contains(&var)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn is_solved(&self) -> bool {
        self.solved
    }

    pub fn record_upper_bound(&mut self, var: SymbolRef, bound: Type) {
        debug_assert!(!self.solved, "bound recorded after solve");
        self.uppers.entry(var).or_default().push(bound);
    }

    pub fn record_lower_bound(&mut self, var: SymbolRef, bound: Type) {
        debug_assert!(!self.solved, "bound recorded after solve");
        self.lowers.entry(var).or_default().push(bound);
    }

    /// Solve every variable. Returns false when some variable's lower bounds
    /// do not fit its uppers (the call site's arguments are inconsistent).
    pub fn solve(&mut self, gs: &GlobalState) -> bool {
        if self.solved {
            return true;
        }
        let mut ok = true;
        for &var in &self.vars {
            let uppers = self.uppers.get(&var);
            let lowers = self.lowers.get(&var);
            let solution = match (uppers, lowers) {
                (Some(ups), _) => {
                    let upper = ups
                        .iter()
                        .cloned()
                        .reduce(|a, b| join_meet::meet(gs, &a, &b))
                        .expect("non-empty upper bounds");
                    if let Some(lows) = lowers {
                        for low in lows {
                            if !super::is_subtype(gs, low, &upper) {
                                ok = false;
                            }
                        }
                    }
                    upper
                }
                (None, Some(lows)) => lows
                    .iter()
                    .cloned()
                    .reduce(|a, b| join_meet::join(gs, &a, &b))
                    .expect("non-empty lower bounds"),
                (None, None) => Type::Untyped,
            };
            self.solution.insert(var, solution);
        }
        self.solved = true;
        ok
    }

    /// The solved type for a variable; `None` for unsolved or foreign vars.
    pub fn solution_for(&self, var: SymbolRef) -> Option<&Type> {
        self.solution.get(&var)
    }
}
