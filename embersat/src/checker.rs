//! Check unsatisfiability proofs.
//!
//! The checker itself lives in a separate crate so that proof verification can be used (and
//! trusted) independently of the solver that produced the proof.
pub use embersat_checker::{
    CheckedProofStep, CheckedSamplingMode, CheckedUserVar, Checker, CheckerData, CheckerError,
    ProofProcessor, ProofTranscriptProcessor, ProofTranscriptStep, ResolutionPropagations,
};
pub use embersat_lrat::WriteLrat;
