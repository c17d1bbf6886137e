//! Error types for mock construction and calls.

use std::fmt;

use contramock_lang::{EvalError, EvalErrors};
use thiserror::Error;

/// Errors returned by [`crate::Mock`] and [`crate::TypeRegistry`].
#[derive(Debug, Error)]
pub enum MockError {
    #[error("schema error: {0}")]
    Compile(EvalErrors),

    #[error("function {name:?} is not declared by this mock")]
    FunctionNotFound { name: String },

    #[error(transparent)]
    NoMatch(#[from] ResolveError),

    #[error("invalid schema for function {function}: {error}")]
    Schema { function: String, error: EvalError },

    #[error("function {function} returns {actual} values, expected {expected}")]
    ReturnCount {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("cannot decode return value {index} of function {function}: {error}")]
    Decode {
        function: String,
        index: usize,
        error: EvalError,
    },

    #[error("cannot encode {what}: {message}")]
    Encode { what: String, message: String },
}

/// Why a single overload was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureCause {
    /// The overload's call quota is used up.
    MaxCallsExceeded { max_calls: u64, attempts: u64 },
    /// The call passed a different number of arguments than the overload declares.
    ArgumentCount { expected: usize, actual: usize },
    /// The arguments do not unify with the overload, or its returns are not concrete.
    Mismatch(EvalErrors),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::MaxCallsExceeded { max_calls, attempts } => write!(
                f,
                "max calls exceeded (attempt {attempts}, limit {max_calls})"
            ),
            FailureCause::ArgumentCount { expected, actual } => {
                write!(f, "expected {expected} arguments, got {actual}")
            }
            FailureCause::Mismatch(errors) => write!(f, "{errors}"),
        }
    }
}

/// A rejected overload.
#[derive(Debug, Clone, PartialEq)]
pub struct OverloadFailure {
    /// Position of the overload in its function's declaration.
    pub index: usize,
    pub cause: FailureCause,
}

/// Every overload of a function rejected a call.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ResolveError {
    pub function: String,
    /// One entry per overload, in declaration order.
    pub failures: Vec<OverloadFailure>,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.function)?;
        for failure in &self.failures {
            write!(f, "overload {}: {}; ", failure.index, failure.cause)?;
        }
        f.write_str("no overloads matched")
    }
}
