//! Boolean satisfiability solver.
use std::io;
use std::time::Instant;

use partial_ref::{IntoPartialRef, IntoPartialRefMut, PartialRef};

use log::info;
use thiserror::Error;

use embersat_dimacs::{DimacsParser, ParserError};
use embersat_formula::{CnfFormula, Lit, Var};

use crate::checker::{ProofProcessor, ProofTranscriptProcessor};
use crate::config::{SolverConfig, SolverConfigUpdate};
use crate::context::{
    config_changed, ensure_var_count, AssumptionsP, Context, ModelP, ProofP, SolverConfigP,
    SolverStateP, TmpDataP, VariablesP,
};
use crate::load::load_clause;
use crate::proof::ProofFormat;
use crate::prop::full_restart;
use crate::schedule::schedule_step;
use crate::state::SatState;
use crate::variables::{self, data::SamplingMode};

/// Errors that can occur while using a [`Solver`].
#[derive(Debug, Error)]
pub enum SolverError {
    #[error("error reading DIMACS CNF input: {0}")]
    Dimacs(#[from] ParserError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of [`Solver::solve_with_deadline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveResult {
    /// The formula is satisfiable.
    Sat,
    /// The formula is unsatisfiable (possibly under the current assumptions).
    Unsat,
    /// No result was reached before the deadline passed.
    Indeterminate,
}

/// A CDCL based SAT solver.
pub struct Solver<'a> {
    ctx: Box<Context<'a>>,
}

impl<'a> Default for Solver<'a> {
    fn default() -> Solver<'a> {
        Solver {
            ctx: Box::new(Context::default()),
        }
    }
}

impl<'a> Solver<'a> {
    /// Create a new solver.
    pub fn new() -> Solver<'a> {
        Solver::default()
    }

    /// Add a formula to the solver, using user variable names.
    pub fn add_formula(&mut self, formula: &CnfFormula) {
        for clause in formula.iter() {
            self.add_clause(clause);
        }
    }

    /// Reads and adds a formula in DIMACS CNF format.
    pub fn add_dimacs_cnf(&mut self, input: impl io::Read) -> Result<(), SolverError> {
        let formula = DimacsParser::parse(input).map_err(|err| match err.downcast::<ParserError>() {
            Ok(err) => SolverError::Dimacs(err),
            Err(err) => match err.downcast::<io::Error>() {
                Ok(err) => SolverError::Io(err),
                Err(err) => panic!("unexpected error parsing DIMACS CNF input: {}", err),
            },
        })?;

        info!(
            "Parsed formula with {} variables and {} clauses",
            formula.var_count(),
            formula.len()
        );

        self.add_formula(&formula);

        Ok(())
    }

    /// Add a clause, using user variable names.
    pub fn add_clause(&mut self, clause: &[Lit]) {
        let mut ctx = self.ctx.into_partial_ref_mut();

        ensure_var_count(ctx.borrow());

        let (tmp, mut ctx) = ctx.split_part_mut(TmpDataP);
        variables::solver_from_user_lits(ctx.borrow(), &mut tmp.lits_2, clause, false);
        let solver_lits = tmp.lits_2.clone();

        ctx.part_mut(ProofP).add_clause(&solver_lits);

        load_clause(ctx.borrow(), &solver_lits);
    }

    /// Change the assumptions used by the next call to [`Solver::solve`].
    ///
    /// Uses user variable names.
    pub fn assume(&mut self, assumptions: &[Lit]) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        crate::assumptions::set_assumptions(ctx.borrow(), assumptions);
    }

    /// Check the satisfiability of the current formula, possibly under the assumptions set by
    /// [`Solver::assume`].
    pub fn solve(&mut self) -> Result<bool, SolverError> {
        match self.solve_with_deadline(None)? {
            SolveResult::Sat => Ok(true),
            SolveResult::Unsat => Ok(false),
            SolveResult::Indeterminate => unreachable!("no deadline was given"),
        }
    }

    /// Check the satisfiability of the current formula, giving up and reporting
    /// [`SolveResult::Indeterminate`] if `deadline` passes before a result is reached.
    ///
    /// The deadline is checked between propagation rounds. On expiry the solver remains reusable
    /// and discards no previously learned clauses; a later call resumes the same search.
    pub fn solve_with_deadline(
        &mut self,
        deadline: Option<Instant>,
    ) -> Result<SolveResult, SolverError> {
        let mut ctx = self.ctx.into_partial_ref_mut();

        // A previous call left a cached verdict for the assumptions (if any) that were active
        // at the time. Re-examine rather than short-circuiting, since the caller may have
        // changed the assumptions (or, since solve clears them below, may have none anymore).
        match ctx.part(SolverStateP).sat_state {
            SatState::Sat | SatState::UnsatUnderAssumptions => {
                ctx.part_mut(SolverStateP).sat_state = SatState::Unknown;
            }
            SatState::Unknown | SatState::Unsat => {}
        }

        loop {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Ok(SolveResult::Indeterminate);
                }
            }

            if !schedule_step(ctx.borrow()) {
                break;
            }
        }

        ctx.part_mut(ProofP).solve_finished();

        let result = match ctx.part(SolverStateP).sat_state {
            SatState::Unknown => unreachable!("schedule_step returned false while still unknown"),
            SatState::Sat => SolveResult::Sat,
            SatState::Unsat | SatState::UnsatUnderAssumptions => SolveResult::Unsat,
        };

        // Assumptions apply to a single solve call only; clear them (and the decisions they
        // forced) so a later call without an intervening `assume` sees a plain solve.
        full_restart(ctx.borrow());
        ctx.part_mut(AssumptionsP).clear_assumptions();

        Ok(result)
    }

    /// Set of literals, using user variable names, that satisfy the formula.
    ///
    /// Only valid right after [`Solver::solve`] returned `Ok(true)`.
    pub fn model(&self) -> Option<Vec<Lit>> {
        let mut ctx = self.ctx.into_partial_ref();

        if ctx.part(SolverStateP).sat_state != SatState::Sat {
            return None;
        }

        let variables = ctx.part(VariablesP);
        let model = ctx.part(ModelP);

        Some(
            variables
                .user_var_iter()
                .map(|user| {
                    let global = variables.global_from_user().get(user).unwrap();
                    Lit::from_var(user, model.lit_is_true(global.positive()))
                })
                .collect(),
        )
    }

    /// Subset of the assumptions, using user variable names, that made the last call to
    /// [`Solver::solve`] return `Ok(false)`.
    ///
    /// Returns `None` unless the solver is in the unsat-under-assumptions state.
    pub fn failed_core(&self) -> Option<&[Lit]> {
        let mut ctx = self.ctx.into_partial_ref();

        if ctx.part(SolverStateP).sat_state != SatState::UnsatUnderAssumptions {
            return None;
        }

        Some(ctx.part(AssumptionsP).user_failed_core())
    }

    /// Allocate a fresh user variable.
    pub fn new_var(&mut self) -> Var {
        let mut ctx = self.ctx.into_partial_ref_mut();
        variables::new_user_var(ctx.borrow())
    }

    /// Allocate several fresh user literals at once.
    pub fn new_lits<T: FreshLits>(&mut self) -> T {
        T::new_lits(self)
    }

    /// Hide a variable, excluding it from the model and future sampling.
    pub fn hide_var(&mut self, var: Var) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        let global = variables::global_from_user(ctx.borrow(), var, false);
        variables::set_sampling_mode(ctx.borrow(), global, SamplingMode::Hide);
    }

    /// Make a previously hidden variable observable again.
    pub fn witness_var(&mut self, var: Var) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        let global = variables::global_from_user(ctx.borrow(), var, false);
        variables::set_sampling_mode(ctx.borrow(), global, SamplingMode::Witness);
    }

    /// Turn all hidden variables into witness variables and return the corresponding user
    /// variables.
    pub fn observe_internal_vars(&mut self) -> Vec<Var> {
        let mut ctx = self.ctx.into_partial_ref_mut();
        variables::observe_internal_vars(ctx.borrow())
    }

    /// Replace the solver configuration.
    pub fn set_config(&mut self, config: SolverConfig) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        *ctx.part_mut(SolverConfigP) = config;
        config_changed(ctx.borrow(), &SolverConfigUpdate::default());
    }

    /// Start writing proof steps to the given target in the given format.
    pub fn write_proof(&mut self, target: impl io::Write + 'a, format: ProofFormat) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).write_proof(target, format);
    }

    /// Stop writing proof steps.
    pub fn close_proof(&mut self) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).close_proof();
    }

    /// Enable checking proof steps as they are generated.
    pub fn enable_self_checking(&mut self) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).begin_checking();
    }

    /// Register a proof processor.
    pub fn add_proof_processor(&mut self, processor: &'a mut dyn ProofProcessor) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).add_processor(processor);
    }

    /// Register a proof transcript processor.
    pub fn add_transcript_processor(&mut self, processor: &'a mut dyn ProofTranscriptProcessor) {
        let mut ctx = self.ctx.into_partial_ref_mut();
        ctx.part_mut(ProofP).add_transcript_processor(processor);
    }
}

/// Types of fresh literal bundles that [`Solver::new_lits`] can produce.
///
/// Implemented for [`Lit`] and for tuples of up to four [`Lit`]s, each position receiving a
/// distinct fresh variable in positive polarity.
pub trait FreshLits {
    fn new_lits(solver: &mut Solver) -> Self;
}

impl FreshLits for Lit {
    fn new_lits(solver: &mut Solver) -> Self {
        solver.new_var().positive()
    }
}

impl FreshLits for (Lit, Lit) {
    fn new_lits(solver: &mut Solver) -> Self {
        (solver.new_var().positive(), solver.new_var().positive())
    }
}

impl FreshLits for (Lit, Lit, Lit) {
    fn new_lits(solver: &mut Solver) -> Self {
        (
            solver.new_var().positive(),
            solver.new_var().positive(),
            solver.new_var().positive(),
        )
    }
}

impl FreshLits for (Lit, Lit, Lit, Lit) {
    fn new_lits(solver: &mut Solver) -> Self {
        (
            solver.new_var().positive(),
            solver.new_var().positive(),
            solver.new_var().positive(),
            solver.new_var().positive(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use embersat_dimacs::write_dimacs;

    use crate::test::{sat_formula, sgen_unsat_formula};

    proptest! {
        #[test]
        fn sgen_unsat(formula in sgen_unsat_formula(1..7usize)) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve().ok(), Some(false));
        }

        #[test]
        fn sat(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve().ok(), Some(true));

            let model = solver.model().unwrap();

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }
        }

        #[test]
        fn sat_via_dimacs(formula in sat_formula(4..20usize, 10..100usize, 0.05..0.2, 0.9..1.0)) {
            let mut solver = Solver::new();

            let mut dimacs = vec![];

            write_dimacs(&mut dimacs, &formula).unwrap();

            solver.add_dimacs_cnf(&mut &dimacs[..]).unwrap();

            prop_assert_eq!(solver.solve().ok(), Some(true));

            let model = solver.model().unwrap();

            for clause in formula.iter() {
                prop_assert!(clause.iter().any(|lit| model.contains(lit)));
            }
        }

        #[test]
        fn sgen_unsat_incremental_clauses(formula in sgen_unsat_formula(1..7usize)) {
            let mut solver = Solver::new();

            let mut last_result = Some(true);

            for clause in formula.iter() {
                solver.add_clause(clause);

                let result = solver.solve().ok();
                if result != last_result {
                    prop_assert_eq!(result, Some(false));
                    prop_assert_eq!(last_result, Some(true));
                    last_result = result;
                }
            }

            prop_assert_eq!(last_result, Some(false));
        }
    }
}
