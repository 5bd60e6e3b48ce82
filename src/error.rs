// src/error.rs
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Failure taxonomy for the query-execution core. Everything user-facing is
/// folded into a `QueryResult`; these variants are the structured form.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("batch too large: estimated {estimated} operations, ceiling is {ceiling}")]
    BatchTooLarge { estimated: usize, ceiling: usize },
    #[error("integrity violation: {0}")]
    Integrity(String),
    #[error("unsupported query: {0}")]
    Unsupported(String),
    #[error("parse error: {0}")]
    Parse(String),
}
