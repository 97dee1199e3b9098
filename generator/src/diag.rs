// diag.rs — Parsing error model
//
// Provides the error type attached to per-file parsing results and surfaced
// in the final code generation report. A `ParsingError` is either a located
// diagnostic promoted from the translation unit or a bare message (missing
// file, IO failure, configuration failure).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tu::{SourceLocation, TuDiagnostic};

/// One error recorded against a parsed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsingError {
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl ParsingError {
    /// A bare error with no source position.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Promote a non-suppressed translation-unit diagnostic.
    pub fn from_diagnostic(diagnostic: &TuDiagnostic) -> Self {
        Self {
            message: diagnostic.spelling.clone(),
            location: Some(diagnostic.location.clone()),
        }
    }
}

impl fmt::Display for ParsingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(
                f,
                "{} ({}, line {}, column {})",
                self.message,
                loc.file.display(),
                loc.line,
                loc.column
            ),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for ParsingError {}
