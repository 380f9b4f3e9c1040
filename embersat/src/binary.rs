//! Binary clauses.

use partial_ref::{partial, PartialRef};

use embersat_formula::Lit;

use crate::context::{AssignmentP, BinaryClausesP, Context};
use crate::prop::Assignment;

/// Binary clauses.
#[derive(Default)]
pub struct BinaryClauses {
    by_lit: Vec<Vec<Lit>>,
    count: usize,
}

impl BinaryClauses {
    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        self.by_lit.resize(count * 2, vec![]);
    }

    /// Add a binary clause.
    pub fn add_binary_clause(&mut self, lits: [Lit; 2]) {
        for i in 0..2 {
            self.by_lit[(!lits[i]).code()].push(lits[i ^ 1]);
        }
        self.count += 1;
    }

    /// Implications of a given literal
    pub fn implied(&self, lit: Lit) -> &[Lit] {
        &self.by_lit[lit.code()]
    }

    /// Number of binary clauses.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Remove binary clauses satisfied by the given (top level) assignment.
    ///
    /// Each stored entry at index `code` corresponds to a clause literal `!Lit::from_code(code)`.
    fn simplify(&mut self, assignment: &Assignment) {
        for code in 0..self.by_lit.len() {
            let clause_lit = !Lit::from_code(code);
            self.by_lit[code]
                .retain(|&other| !(assignment.lit_is_true(clause_lit) || assignment.lit_is_true(other)));
        }
        self.count = self.by_lit.iter().map(Vec::len).sum::<usize>() / 2;
    }
}

/// Remove binary clauses satisfied by the current top level assignment.
pub fn simplify_binary(mut ctx: partial!(Context, mut BinaryClausesP, AssignmentP)) {
    let (assignment, mut ctx) = ctx.split_part(AssignmentP);
    ctx.part_mut(BinaryClausesP).simplify(assignment);
}
