//! Typed errors surfaced by the orchestrator

use thiserror::Error;

/// Why a task submission was refused.
///
/// `ResourceExhausted` is reserved for capacity: it is returned if and only
/// if no unit in the pool has a spare slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("no resource unit has spare capacity")]
    ResourceExhausted,

    #[error("orchestrator is shutting down, new tasks are not admitted")]
    ShuttingDown,
}
