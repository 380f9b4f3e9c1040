//! Proof checker for proofs generated by the Embersat SAT solver.

use std::io;

use failure::{Error, Fail};
use partial_ref::{IntoPartialRefMut, PartialRef};

use embersat_dimacs::DimacsParser;
use embersat_formula::{CnfFormula, Lit};
use embersat_internal_proof::binary_format::Parser;

pub mod context;
mod clauses;
mod hash;
pub mod internal;
mod processing;
mod rup;
mod sorted_lits;
mod state;
mod tmp;
mod transcript;
mod variables;

pub use processing::{
    CheckedProofStep, CheckedSamplingMode, CheckedUserVar, CheckerData, ProofProcessor,
    ResolutionPropagations,
};
pub use transcript::{ProofTranscriptProcessor, ProofTranscriptStep};

use context::{parts::*, Context};

/// Possible errors while checking an embersat proof.
#[derive(Debug, Fail)]
pub enum CheckerError {
    #[fail(display = "step {}: Unexpected end of proof file", step)]
    ProofIncomplete { step: u64 },
    #[fail(display = "step {}: Error reading proof file: {}", step, cause)]
    IoError {
        step: u64,
        #[cause]
        cause: io::Error,
    },
    #[fail(display = "step {}: Could not parse proof step: {}", step, cause)]
    ParseError {
        step: u64,
        #[cause]
        cause: Error,
    },
    #[fail(display = "step {}: Checking proof failed: {}", step, msg)]
    CheckFailed {
        step: u64,
        msg: String,
        debug_step: String,
    },
    #[fail(display = "Error in proof processor: {}", cause)]
    ProofProcessorError {
        #[cause]
        cause: Error,
    },
    #[doc(hidden)]
    #[fail(display = "__Nonexhaustive")]
    __Nonexhaustive,
}

impl CheckerError {
    /// Generate a CheckFailed error with an empty debug_step.
    fn check_failed(step: u64, msg: String) -> CheckerError {
        CheckerError::CheckFailed {
            step,
            msg,
            debug_step: String::new(),
        }
    }
}

/// Checks unsatisfiability proofs produced by the embersat solver.
///
/// This keeps enough of the input formula and the proof's clauses around to verify each step
/// independently, so a checked proof is a genuine certificate of unsatisfiability even if the
/// solver that produced it has a bug.
#[derive(Default)]
pub struct Checker<'a> {
    ctx: Box<Context<'a>>,
}

impl<'a> Checker<'a> {
    /// Create a new checker.
    pub fn new() -> Checker<'a> {
        Checker::default()
    }

    /// Register a proof processor.
    ///
    /// Processors are called for every checked proof step in the order they were added.
    pub fn add_processor(&mut self, processor: &'a mut dyn ProofProcessor) {
        self.ctx.processing.processors.push(processor);
    }

    /// Register a transcript processor.
    pub fn add_transcript_processor(&mut self, processor: &'a mut dyn ProofTranscriptProcessor) {
        self.ctx
            .processing
            .transcript_processors
            .push(processor);
    }

    /// Add a formula to the checker.
    pub fn add_formula(&mut self, formula: &CnfFormula) -> Result<(), CheckerError> {
        for clause in formula.iter() {
            self.add_clause(clause)?;
        }
        Ok(())
    }

    /// Add a single clause to the checker.
    pub fn add_clause(&mut self, clause: &[Lit]) -> Result<(), CheckerError> {
        let mut ctx = self.ctx.into_partial_ref_mut();
        clauses::add_clause(ctx.borrow(), clause)
    }

    /// Parse and add a DIMACS CNF formula to the checker.
    pub fn add_dimacs_cnf(&mut self, input: impl io::Read) -> Result<(), Error> {
        let parser = DimacsParser::parse_incremental(input, |parser| {
            Ok(self.add_formula(&parser.take_formula())?)
        })?;

        log::info!(
            "Parsed formula with {} variables and {} clauses",
            parser.var_count(),
            parser.clause_count()
        );

        Ok(())
    }

    /// Check a single proof step already parsed from the embersat binary proof format.
    pub fn check_step(
        &mut self,
        step: embersat_internal_proof::ProofStep,
    ) -> Result<(), CheckerError> {
        self.ctx.checker_state.step += 1;
        let mut ctx = self.ctx.into_partial_ref_mut();
        state::check_step(ctx.borrow(), step)
    }

    /// Read and check an embersat binary proof.
    ///
    /// The checker must already contain the input formula, added via [`Checker::add_formula`] or
    /// [`Checker::add_dimacs_cnf`].
    pub fn check_proof(&mut self, input: impl io::Read) -> Result<(), CheckerError> {
        let mut buffer = io::BufReader::new(input);
        let mut parser = Parser::default();

        loop {
            if self.ctx.checker_state.step % 100_000 == 0 && self.ctx.checker_state.step > 0 {
                log::info!("checking step {}k", self.ctx.checker_state.step / 1000);
            }

            let step = self.ctx.checker_state.step;
            match parser.parse_step(&mut buffer) {
                Ok(embersat_internal_proof::ProofStep::End) => {
                    self.check_step(embersat_internal_proof::ProofStep::End)?;
                    break;
                }
                Ok(parsed_step) => self.check_step(parsed_step)?,
                Err(err) => match err.downcast::<io::Error>() {
                    Ok(io_err) => {
                        if io_err.kind() == io::ErrorKind::UnexpectedEof {
                            return Err(CheckerError::ProofIncomplete { step });
                        } else {
                            return Err(CheckerError::IoError {
                                step,
                                cause: io_err,
                            });
                        }
                    }
                    Err(err) => {
                        return Err(CheckerError::ParseError { step, cause: err });
                    }
                },
            }
        }

        let mut ctx = self.ctx.into_partial_ref_mut();
        state::process_unit_conflicts(ctx.borrow())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embersat_formula::lits;
    use embersat_internal_proof::{ClauseHash, DeleteClauseProof, ProofStep};

    fn hash(lits: &[Lit]) -> ClauseHash {
        embersat_internal_proof::clause_hash(lits)
    }

    #[test]
    fn accepts_trivial_unsat_formula() {
        let mut checker = Checker::new();
        checker.add_formula(&CnfFormula::from(vec![lits![1], lits![-1]])).unwrap();

        checker
            .check_step(ProofStep::AtClause {
                redundant: false,
                clause: &[],
                propagation_hashes: &[hash(&lits![1]), hash(&lits![-1])],
            })
            .unwrap();
    }

    #[test]
    fn rejects_unjustified_clause() {
        let mut checker = Checker::new();
        checker.add_formula(&CnfFormula::from(vec![lits![1, 2]])).unwrap();

        let result = checker.check_step(ProofStep::AtClause {
            redundant: false,
            clause: &lits![3],
            propagation_hashes: &[],
        });

        assert!(result.is_err());
    }

    #[test]
    fn model_must_contain_assumptions() {
        let mut checker = Checker::new();
        checker.add_formula(&CnfFormula::from(vec![lits![1, 2]])).unwrap();

        checker
            .check_step(ProofStep::Assumptions {
                assumptions: &lits![2],
            })
            .unwrap();

        let result = checker.check_step(ProofStep::Model {
            assignment: &lits![1, -2],
        });

        assert!(result.is_err());
    }

    #[test]
    fn deletion_proof_requires_matching_tag() {
        let mut checker = Checker::new();
        checker.add_formula(&CnfFormula::from(vec![lits![1, 2]])).unwrap();

        checker
            .check_step(ProofStep::DeleteClause {
                clause: &lits![1, 2],
                proof: DeleteClauseProof::Redundant,
            })
            .unwrap();
    }
}
