//! Decision heuristics.

use partial_ref::{partial, PartialRef};

use crate::context::{AssignmentP, Context, ImplGraphP, TrailP, VsidsP};
use embersat_formula::{Lit, Var};
use crate::prop::{enqueue_assignment, Reason};

pub mod vsids;

/// Make a decision and enqueue it, picking the unassigned variable with the highest VSIDS
/// activity.
///
/// Returns `false` if no decision was made because all variables are assigned.
pub fn make_decision(
    mut ctx: partial!(Context, mut AssignmentP, mut ImplGraphP, mut TrailP, mut VsidsP),
) -> bool {
    while let Some(var) = ctx.part_mut(VsidsP).next() {
        if ctx.part(AssignmentP).var_value(var).is_none() {
            let decision = Lit::from_var(var, ctx.part(AssignmentP).last_var_value(var));

            ctx.part_mut(TrailP).new_decision_level();

            enqueue_assignment(ctx.borrow(), decision, Reason::Unit);

            return true;
        }
    }
    false
}

/// Make a variable available for future decisions.
pub fn make_available(mut ctx: partial!(Context, mut VsidsP), var: Var) {
    ctx.part_mut(VsidsP).make_available(var);
}

/// Initialize a newly allocated solver variable.
///
/// `available` is `false` for variables whose value is already forced by a unit clause, so they
/// are never picked as a decision.
pub fn initialize_var(mut ctx: partial!(Context, mut VsidsP), var: Var, available: bool) {
    if available {
        ctx.part_mut(VsidsP).make_available(var);
    }
}

/// Permanently remove a recycled solver variable from the decision heuristic.
pub fn remove_var(mut ctx: partial!(Context, mut VsidsP), var: Var) {
    ctx.part_mut(VsidsP).remove(var);
}
