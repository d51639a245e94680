//! Errors raised while evaluating stylesheet expressions against a schema.
//!
//! Only contract violations are errors. Unsupported input (unknown node
//! kinds, axes or functions) is logged and handled conservatively.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Evaluation tree node {0} was evaluated before initialization")]
    Uninitialized(usize),

    #[error("Evaluation tree has no node {0}")]
    UnknownNode(usize),

    #[error("Evaluation tree node {0} ({1}) is not a node test")]
    NotANodeTest(usize, &'static str),

    #[error("Stale pending proxy {0}")]
    StaleProxy(String),
}

pub type Result<T> = std::result::Result<T, EvaluationError>;
