//! Proof generation.

use std::io::{sink, BufWriter, Write};

use partial_ref::{partial, PartialRef};

use embersat_checker::{Checker, ProofProcessor, ProofTranscriptProcessor};
pub use embersat_internal_proof::{clause_hash, lit_hash, ClauseHash, DeleteClauseProof, ProofStep};

use crate::context::{Context, ProofP};

pub mod drat;
mod map_step;

/// Proof formats that can be generated during solving.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ProofFormat {
    Embersat,
    Drat,
    BinaryDrat,
}

/// Proof generation.
pub struct Proof<'a> {
    format: Option<ProofFormat>,
    target: BufWriter<Box<dyn Write + 'a>>,
    checker: Option<Checker<'a>>,
    map_step: map_step::MapStep,
}

impl<'a> Default for Proof<'a> {
    fn default() -> Proof<'a> {
        Proof {
            format: None,
            target: BufWriter::new(Box::new(sink())),
            checker: None,
            map_step: map_step::MapStep::default(),
        }
    }
}

macro_rules! handle_io_errors {
    ($s:expr, $e:expr) => {{
        let res = $e;
        $s.handle_io_errors(res)
    }};
}

impl<'a> Proof<'a> {
    /// Start writing proof steps to the given target with the given format.
    pub fn write_proof(&mut self, target: impl Write + 'a, format: ProofFormat) {
        self.format = Some(format);
        self.target = BufWriter::new(Box::new(target))
    }

    /// Stop writing proof steps.
    pub fn close_proof(&mut self) {
        // We need to explicitly flush to handle IO errors.
        handle_io_errors!(self, self.target.flush());
        self.format = None;
        self.target = BufWriter::new(Box::new(sink()));
    }

    /// Begin checking proof steps as they are generated.
    pub fn begin_checking(&mut self) {
        if self.checker.is_none() {
            self.checker = Some(Checker::new())
        }
    }

    /// Called before solve returns to trigger delayed unit conflict processing.
    pub fn solve_finished(&mut self) {
        if let Some(checker) = &mut self.checker {
            use embersat_checker::internal::SelfChecker;
            checker.self_check_delayed_steps().unwrap();
            // TODO error handling
        }
    }

    /// Add a [`ProofProcessor`].
    ///
    /// See also [`Checker::add_processor`].
    pub fn add_processor(&mut self, processor: &'a mut dyn ProofProcessor) {
        self.begin_checking();
        self.checker.as_mut().unwrap().add_processor(processor);
    }

    /// Add a [`ProofTranscriptProcessor`].
    pub fn add_transcript_processor(&mut self, processor: &'a mut dyn ProofTranscriptProcessor) {
        self.begin_checking();
        self.checker
            .as_mut()
            .unwrap()
            .add_transcript_processor(processor);
    }

    /// Whether proof generation is active.
    pub fn is_active(&self) -> bool {
        self.checker.is_some() || self.format.is_some()
    }

    /// Whether clause hashes are required for steps that support them.
    pub fn clause_hashes_required(&self) -> bool {
        self.checker.is_some()
            || match self.format {
                Some(ProofFormat::Embersat) => true,
                Some(ProofFormat::Drat) | Some(ProofFormat::BinaryDrat) => false,
                None => false,
            }
    }

    /// Whether unit clauses discovered through unit propagation have to be proven.
    pub fn prove_propagated_unit_clauses(&self) -> bool {
        self.checker.is_some()
            || match self.format {
                Some(ProofFormat::Embersat) => true,
                Some(ProofFormat::Drat) | Some(ProofFormat::BinaryDrat) => false,
                None => false,
            }
    }

    /// Whether the model has to be recorded in the proof.
    pub fn models_in_proof(&self) -> bool {
        self.checker.is_some() || self.format == Some(ProofFormat::Embersat)
    }

    /// Add a step to the proof.
    ///
    /// Ignored when proof generation is disabled. The `important` flag is a hint for future
    /// proof processors that may want to batch or skip non-essential bookkeeping steps; it does
    /// not currently change what is written or checked.
    pub fn add_step<'s>(&'s mut self, _important: bool, step: &ProofStep<'s>) {
        match self.format {
            None => (),
            Some(ProofFormat::Embersat) => self.write_embersat_step(step),
            Some(ProofFormat::Drat) | Some(ProofFormat::BinaryDrat) => self.write_drat_step(step),
        }
        if let Some(checker) = &mut self.checker {
            use embersat_checker::internal::SelfChecker;
            checker.self_check_step(*step).unwrap();
            // TODO error handling
        }
    }

    /// Call when adding an external clause.
    ///
    /// This is ignored for writing proof files but required for on-the-fly checking.
    pub fn add_clause(&mut self, clause: &[embersat_formula::Lit]) {
        if let Some(checker) = &mut self.checker {
            checker.add_clause(clause).unwrap();
            // TODO error handling
        }
    }

    /// Writes a proof step in our own format.
    fn write_embersat_step<'s>(&'s mut self, step: &'s ProofStep<'s>) {
        handle_io_errors!(self, embersat_internal_proof::binary_format::write_step(&mut self.target, step));
    }

    /// Writes a proof step in DRAT or binary DRAT format.
    fn write_drat_step<'s>(&'s mut self, step: &'s ProofStep<'s>) {
        let result = match self.format {
            Some(ProofFormat::BinaryDrat) => drat::write_binary_step(&mut self.target, step),
            _ => drat::write_step(&mut self.target, step),
        };
        handle_io_errors!(self, result);
    }

    /// Handles IO errors.
    ///
    /// Right now this panics. In the future it should set an error flag that will be checked in the
    /// solver main loop to abort when proof writing failed.
    fn handle_io_errors<V, E: std::fmt::Debug>(&self, result: Result<V, E>) -> Option<V> {
        // TODO better error handling
        // on error we want to abort solving eventually but not panic
        // we also don't want to force error handling on proof generating code
        Some(result.expect("unable to write to proof file"))
    }
}

/// Add a step to the proof.
///
/// Free-function form of [`Proof::add_step`] for callers that only hold a [`Context`] reference.
pub fn add_step<'a>(
    mut ctx: partial!(Context<'a>, mut ProofP<'a>),
    important: bool,
    step: &ProofStep,
) {
    ctx.part_mut(ProofP).add_step(important, step);
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    use std::fs::File;
    use std::process::Command;

    use tempfile::TempDir;

    use embersat_dimacs::write_dimacs;
    use crate::solver::Solver;

    use crate::test::sgen_unsat_formula;

    proptest! {

        #[cfg_attr(not(test_drat_trim), ignore)]
        #[test]
        fn sgen_unsat_drat(
            formula in sgen_unsat_formula(1..7usize),
        ) {
            let mut solver = Solver::new();

            let tmp = TempDir::new()?;

            let drat_proof = tmp.path().join("proof.drat");
            let cnf_file = tmp.path().join("input.cnf");

            write_dimacs(&mut File::create(&cnf_file)?, &formula)?;

            solver.write_proof(File::create(&drat_proof)?, ProofFormat::Drat);

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve().ok(), Some(false));

            solver.close_proof();

            let output = Command::new("drat-trim")
                .arg(&cnf_file)
                .arg(&drat_proof)
                .output()?;

            prop_assert!(std::str::from_utf8(&output.stdout)?.contains("s VERIFIED"));
        }

        #[cfg_attr(not(test_drat_trim), ignore)]
        #[test]
        fn sgen_unsat_binary_drat(
            formula in sgen_unsat_formula(1..7usize),
        ) {
            let mut solver = Solver::new();

            let tmp = TempDir::new()?;

            let drat_proof = tmp.path().join("proof.bdrat");
            let cnf_file = tmp.path().join("input.cnf");

            write_dimacs(&mut File::create(&cnf_file)?, &formula)?;

            solver.write_proof(File::create(&drat_proof)?, ProofFormat::BinaryDrat);

            solver.add_formula(&formula);

            prop_assert_eq!(solver.solve().ok(), Some(false));

            solver.close_proof();

            let output = Command::new("drat-trim")
                .arg(&cnf_file)
                .arg(&drat_proof)
                .arg("-i")
                .output()?;

            prop_assert!(std::str::from_utf8(&output.stdout)?.contains("s VERIFIED"));
        }
    }
}
