//! Unit propagation.
use partial_ref::{partial, PartialRef};

use crate::context::{
    AssignmentP, BinaryClausesP, ClauseAllocP, Context, ImplGraphP, TrailP, WatchlistsP,
};

pub mod assignment;
pub mod binary;
pub mod graph;
pub mod long;
pub mod watch;

pub use assignment::{backtrack, enqueue_assignment, full_restart, restart, Assignment, Trail};
pub use binary::propagate_binary;
pub use graph::{Conflict, ImplGraph, ImplNode, Reason};
pub use long::propagate_long;
pub use watch::{Watch, Watchlists};

/// Propagate all queued assignments until a fixpoint or a conflict is reached.
pub fn propagate(
    mut ctx: partial!(
        Context,
        mut AssignmentP,
        mut ClauseAllocP,
        mut ImplGraphP,
        mut TrailP,
        mut WatchlistsP,
        BinaryClausesP,
    ),
) -> Result<(), Conflict> {
    while let Some(lit) = ctx.part_mut(TrailP).pop_queue() {
        propagate_binary(ctx.borrow(), lit)?;
        propagate_long(ctx.borrow(), lit)?;
    }

    Ok(())
}
