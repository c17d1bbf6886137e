//! Evaluation errors.
//!
//! Errors distinguish *incomplete* values (not yet concrete, may still be
//! resolved by further unification) from hard failures such as conflicting
//! values. Disjunction elimination and concreteness validation depend on
//! that distinction.

use std::fmt;

use thiserror::Error;

use crate::span::Span;

/// The category of an evaluation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed schema source.
    Syntax,
    /// Two values that cannot be unified.
    Conflict,
    /// A value that is not (yet) concrete.
    Incomplete,
    /// An unresolvable reference or selector.
    Reference,
    /// A structural or evaluation cycle.
    Cycle,
    /// A field not allowed by a closed definition.
    NotAllowed,
    /// Every alternative of a disjunction failed.
    Disjunction,
    /// A value could not be converted to or from a host value.
    Decode,
}

/// An error produced while compiling or evaluating a schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct EvalError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Dotted path of the offending value (empty for the root).
    pub path: String,
    /// Human-readable message.
    pub message: String,
    /// Source location, for syntax errors.
    pub span: Option<Span>,
    /// Underlying failures, for disjunction errors.
    pub causes: Vec<EvalError>,
}

impl EvalError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: String::new(),
            message: message.into(),
            span: None,
            causes: Vec::new(),
        }
    }

    /// A syntax error at the given span.
    pub fn syntax(span: Span, message: impl Into<String>) -> Self {
        Self {
            span: Some(span),
            ..Self::new(ErrorKind::Syntax, message)
        }
    }

    /// A conflict between two values.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// A value that is not concrete.
    pub fn incomplete(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Incomplete, message)
    }

    /// A reference that cannot be resolved.
    pub fn reference(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Reference, message)
    }

    /// A decode or encode failure.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode, message)
    }

    /// Attach the path of the value this error belongs to.
    pub fn at(mut self, path: impl Into<String>) -> Self {
        if self.path.is_empty() {
            self.path = path.into();
        }
        self
    }

    /// Whether this error only reports missing concreteness.
    ///
    /// A disjunction error is incomplete only when every cause is.
    pub fn is_incomplete(&self) -> bool {
        match self.kind {
            ErrorKind::Incomplete => true,
            ErrorKind::Disjunction => {
                !self.causes.is_empty() && self.causes.iter().all(EvalError::is_incomplete)
            }
            _ => false,
        }
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.path.is_empty() {
            write!(f, "{}: ", self.path)?;
        }
        f.write_str(&self.message)?;
        if !self.causes.is_empty() {
            let causes: Vec<String> = self.causes.iter().map(|c| c.to_string()).collect();
            write!(f, " ({})", causes.join("; "))?;
        }
        Ok(())
    }
}

/// A non-empty collection of evaluation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub struct EvalErrors(pub Vec<EvalError>);

impl EvalErrors {
    /// The individual errors.
    pub fn errors(&self) -> &[EvalError] {
        &self.0
    }

    /// Whether every error only reports missing concreteness.
    pub fn is_incomplete(&self) -> bool {
        self.0.iter().all(EvalError::is_incomplete)
    }
}

impl From<EvalError> for EvalErrors {
    fn from(error: EvalError) -> Self {
        EvalErrors(vec![error])
    }
}

impl fmt::Display for EvalErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        f.write_str(&messages.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_path() {
        let err = EvalError::conflict("conflicting values \"a\" and \"b\"").at("args.0");
        assert_eq!(err.to_string(), "args.0: conflicting values \"a\" and \"b\"");
    }

    #[test]
    fn test_path_is_not_overwritten() {
        let err = EvalError::incomplete("incomplete value").at("a").at("b");
        assert_eq!(err.path, "a");
    }

    #[test]
    fn test_disjunction_incompleteness() {
        let mut err = EvalError::new(ErrorKind::Disjunction, "no disjunct matched");
        err.causes = vec![EvalError::incomplete("x"), EvalError::incomplete("y")];
        assert!(err.is_incomplete());

        err.causes.push(EvalError::conflict("z"));
        assert!(!err.is_incomplete());
    }
}
