//! Error taxonomy and the diagnostics channel.

use crate::expression::EvalError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AxisError {
    #[error("out of memory while {context}")]
    OutOfMemory { context: String },
    #[error("unit mismatch in {context}: <{left}> is not compatible with <{right}>")]
    UnitMismatch {
        context: String,
        left: String,
        right: String,
    },
    #[error("degenerate range: {message}")]
    NumericDegenerate { message: String },
    #[error("algebraic failure: {message}")]
    AlgebraicFailure { message: String },
    #[error("failed to converge: {message}")]
    ConvergenceFailure { message: String },
    #[error("no acceptable tick scheme: {message}")]
    HeuristicFailure { message: String },
    #[error("axis link cycle detected at {axis}")]
    LinkCycle { axis: String },
    #[error("link refers to missing {what}")]
    MissingAxis { what: String },
    #[error(transparent)]
    Expression(#[from] EvalError),
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
}

impl AxisError {
    pub fn out_of_memory(context: impl Into<String>) -> Self {
        Self::OutOfMemory {
            context: context.into(),
        }
    }

    pub fn unit_mismatch(
        context: impl Into<String>,
        left: impl ToString,
        right: impl ToString,
    ) -> Self {
        Self::UnitMismatch {
            context: context.into(),
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn degenerate(message: impl Into<String>) -> Self {
        Self::NumericDegenerate {
            message: message.into(),
        }
    }

    pub fn algebraic(message: impl Into<String>) -> Self {
        Self::AlgebraicFailure {
            message: message.into(),
        }
    }

    pub fn convergence(message: impl Into<String>) -> Self {
        Self::ConvergenceFailure {
            message: message.into(),
        }
    }

    pub fn heuristic(message: impl Into<String>) -> Self {
        Self::HeuristicFailure {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Collected warnings and errors. Each entry is also emitted through
/// `tracing` as it is recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.entries.push(Diagnostic {
            severity: Severity::Warning,
            message,
        });
    }

    pub fn error(&mut self, message: impl Into<String>) {
        let message = message.into();
        error!("{message}");
        self.entries.push(Diagnostic {
            severity: Severity::Error,
            message,
        });
    }

    pub fn report(&mut self, err: &AxisError) {
        match err {
            AxisError::NumericDegenerate { .. } | AxisError::MissingAxis { .. } => {
                self.warn(err.to_string())
            }
            _ => self.error(err.to_string()),
        }
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_mismatch_names_both_units() {
        let err = AxisError::unit_mismatch("x1 range", "m", "s");
        let text = err.to_string();
        assert!(text.contains("<m>") && text.contains("<s>"), "unexpected message: {text}");
    }

    #[test]
    fn diagnostics_collect_and_drain() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.warn("first");
        diagnostics.report(&AxisError::algebraic("bad"));
        assert_eq!(diagnostics.entries().len(), 2);
        assert_eq!(diagnostics.entries()[1].severity, Severity::Error);
        let drained = diagnostics.drain();
        assert_eq!(drained[0].message, "first");
        assert!(diagnostics.is_empty());
    }
}
