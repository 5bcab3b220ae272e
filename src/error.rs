//! Error taxonomy for the simulator core and the Dual-Priority synthesis
//! workbench. Library errors are structured (`thiserror`); the demo binary
//! reports them through `anyhow`.

use crate::driver::SimulationSetup;
use crate::history::FrozenHistory;
use std::sync::Arc;

/// A fatal invariant violation or an unimplemented code path raised while
/// simulating. Carries enough context to diagnose the failure after the
/// fact: the setup that produced it and the history accumulated up to the
/// point of failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SimulationError {
    #[error("simulation invariant violated: {message}")]
    InvariantViolation {
        message: String,
        setup: Box<SimulationSetup>,
        partial_history: Arc<FrozenHistory>,
    },

    #[error("not implemented: {message}")]
    NotImplemented { message: String },
}

impl SimulationError {
    pub fn invariant(
        message: impl Into<String>,
        setup: SimulationSetup,
        partial_history: Arc<FrozenHistory>,
    ) -> Self {
        SimulationError::InvariantViolation {
            message: message.into(),
            setup: Box::new(setup),
            partial_history,
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        SimulationError::NotImplemented {
            message: message.into(),
        }
    }
}

/// Recoverable failures raised while searching for a Dual-Priority policy.
/// Unlike [`SimulationError`], these are expected outcomes of a search and
/// are used to drive backtracking, not to abort the program.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DpSearchError {
    #[error("no valid promotion time exists for task {task_id} in the current search window")]
    NoValidPromotion { task_id: u64 },

    #[error("three-task fixed-point optimisation failed to converge: {reason}")]
    OptimisationFailure { reason: String },
}

/// Soft parsing failures for the six-integer task-set text format. These are
/// never panics: malformed input simply stops parsing the current block.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ParseError {
    #[error("line {line} does not match the six-integer task format: {text:?}")]
    MalformedLine { line: usize, text: String },

    #[error("task set invariant violated at line {line}: {message}")]
    InvalidTaskSet { line: usize, message: String },

    #[error("empty input, no task set to parse")]
    Empty,
}
