use thiserror::Error;

/// Failure raised while evaluating one expression.
///
/// These never escape the engine: they are caught at the evaluator boundary
/// and rendered inline as `[Error: <message>]`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0} is not defined")]
    Reference(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Failures of the engine itself (environment and configuration).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("environment error: {0}")]
    Environment(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EvalError>;

/// Violations of the document tree's structural rules.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("hierarchy request error: {0}")]
    Hierarchy(String),

    #[error("node is not a child of the given parent")]
    NotFound,
}
