//! A CDCL based SAT solver.
#[macro_use]
extern crate embersat_formula;

mod analyze_conflict;
mod assumptions;
mod binary;
mod cdcl;
mod clause;
pub mod config;
mod context;
mod decision;
mod glue;
mod load;
mod model;
mod prop;
pub mod proof;
mod schedule;
mod simplify;
mod solver;
mod state;
mod tmp;
mod variables;

mod vec_mut_scan;

#[cfg(test)]
mod test;

pub mod checker;

pub use config::SolverConfig;
pub use embersat_formula::{CnfFormula, ExtendFormula, Lit, Var};
pub use model::Model;
pub use proof::ProofFormat;
pub use solver::{SolveResult, Solver, SolverError};
