//! Error taxonomy (§7).
//!
//! Recoverable problems accumulate into a `ValidationException`; fatal
//! problems (`InlineMethodNotFound`, `StubContainerUnresolvable`, `IOError`)
//! short-circuit the pipeline immediately as a `CompileError`.

use std::fmt;
use thiserror::Error;

/// The taxonomy of §7, realized as enum variants rather than separate
/// exception types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    #[error("preset '{0}' does not resolve to any input in scope")]
    PresetUnresolved(String),
    #[error("preset '{path}' has type {preset_kind} but input is {input_kind}")]
    PresetTypeMismatch {
        path: String,
        preset_kind: String,
        input_kind: String,
    },
    #[error("condition uses incompatible operator '{0}'")]
    ExprIncompatibleOperator(String),
    #[error("unresolved variable '{0}' in condition")]
    ExprUnresolvedVariable(String),
    #[error("expression evaluation error: {0}")]
    ExprEvalError(String),
    #[error("step '{0}' has no input")]
    StepNoInput(String),
    #[error("optional step '{0}' contains a non-optional input")]
    StepDeclaredOptional(String),
    #[error("non-optional step '{0}' contains only optional inputs")]
    StepNotDeclaredOptional(String),
    #[error("input '{0}' already declared in this scope")]
    InputAlreadyDeclared(String),
    #[error("input '{path}' redeclared with a different kind ({first} vs {second})")]
    InputTypeMismatch {
        path: String,
        first: String,
        second: String,
    },
    #[error("optional input '{0}' has no default")]
    InputOptionalNoDefault(String),
    #[error("input '{0}' is not nested within a step")]
    InputNotInStep(String),
    #[error("option value '{0}' already declared in this input")]
    OptionValueAlreadyDeclared(String),
    #[error("inline: method '{0}' not found")]
    InlineMethodNotFound(String),
    #[error("stub insertion: no enclosing variables container for '{0}'")]
    StubContainerUnresolvable(String),
    #[error("io error: {0}")]
    IoError(String),
}

impl ErrorKind {
    /// Fatal kinds abort the pipeline immediately rather than accumulating.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ErrorKind::InlineMethodNotFound(_)
                | ErrorKind::StubContainerUnresolvable(_)
                | ErrorKind::IoError(_)
        )
    }
}

/// A single accumulated error, keyed by a source-location string (the
/// node's dotted scope key, or another locator when no scope applies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ErrorKind,
    pub location: String,
}

impl ValidationError {
    pub fn new(kind: ErrorKind, location: impl Into<String>) -> Self {
        ValidationError {
            kind,
            location: location.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.kind)
    }
}

/// The ordered, message-deduplicated set of accumulated validation errors.
/// Thrown after validation completes unless `IGNORE_ERRORS` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationException {
    errors: Vec<ValidationError>,
}

impl ValidationException {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Record an error, deduplicated by its rendered message.
    pub fn push(&mut self, error: ValidationError) {
        let message = error.to_string();
        if !self.errors.iter().any(|e| e.to_string() == message) {
            self.errors.push(error);
        }
    }

    pub fn extend(&mut self, other: ValidationException) {
        for e in other.errors {
            self.push(e);
        }
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }
}

impl fmt::Display for ValidationException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        write!(f, "{}", joined)
    }
}

impl std::error::Error for ValidationException {}

/// Top-level error returned by `compile()`.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("{0}")]
    Validation(#[from] ValidationException),
    #[error("fatal: {0}")]
    Fatal(ErrorKind),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedups_by_rendered_message() {
        let mut exc = ValidationException::new();
        exc.push(ValidationError::new(
            ErrorKind::StepNoInput("s".into()),
            "~s",
        ));
        exc.push(ValidationError::new(
            ErrorKind::StepNoInput("s".into()),
            "~s",
        ));
        assert_eq!(exc.len(), 1);
    }

    #[test]
    fn fatal_kinds_are_flagged() {
        assert!(ErrorKind::IoError("x".into()).is_fatal());
        assert!(!ErrorKind::StepNoInput("x".into()).is_fatal());
    }
}
