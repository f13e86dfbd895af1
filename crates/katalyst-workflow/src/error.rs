//! Error taxonomy for the workflow and saga engine (spec §7).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("step {step} failed: {reason}")]
    StepFailure { step: String, reason: String },

    #[error("compensation for step {step} failed: {reason}")]
    CompensationFailure { step: String, reason: String },

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}
