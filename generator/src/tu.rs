// tu.rs — Translation-unit parser seam
//
// Declares the interface refgen expects from the external C++ translation-unit
// parser: an index that turns one header plus compilation arguments into a
// cursor tree and a diagnostic set. Production builds wire a libclang-backed
// implementation; tests drive the driver through scripted backends.
//
// Preconditions: none (types and traits only).
// Postconditions: none.
// Failure modes: `TuError` when the backend cannot build a translation unit.
// Side effects: none here; implementations read the filesystem.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ── Cursor tree ────────────────────────────────────────────────────────────

/// Kind of an AST cursor, mirroring the subset of the external parser's
/// cursor kinds that refgen dispatches on. Everything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorKind {
    Namespace,
    StructDecl,
    ClassDecl,
    ClassTemplate,
    EnumDecl,
    EnumConstantDecl,
    FieldDecl,
    Method,
    FunctionDecl,
    VarDecl,
    AnnotateAttr,
    Other,
}

/// A source position as reported by the external parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

/// One node of the external parser's AST.
///
/// `spelling` is the entity name for declarations and the raw annotation
/// payload for `AnnotateAttr` cursors. `type_spelling` carries the declared
/// type for fields, variables and the return type for functions/methods.
#[derive(Debug, Clone)]
pub struct Cursor {
    pub kind: CursorKind,
    pub spelling: String,
    pub type_spelling: String,
    pub location: SourceLocation,
    pub from_main_file: bool,
    pub children: Vec<Cursor>,
}

impl Cursor {
    /// Build a cursor with no children; callers push children afterwards.
    pub fn new(kind: CursorKind, spelling: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            kind,
            spelling: spelling.into(),
            type_spelling: String::new(),
            location,
            from_main_file: true,
            children: Vec::new(),
        }
    }
}

// ── Diagnostics ────────────────────────────────────────────────────────────

/// Severity of a diagnostic emitted by the external parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

/// A single diagnostic from the translation unit.
#[derive(Debug, Clone)]
pub struct TuDiagnostic {
    pub severity: Severity,
    pub spelling: String,
    pub location: SourceLocation,
}

/// The external parser's output for one header: the root cursor of the AST
/// and every diagnostic raised while building it.
#[derive(Debug, Clone)]
pub struct TranslationUnit {
    pub root: Cursor,
    pub diagnostics: Vec<TuDiagnostic>,
}

// ── Errors ─────────────────────────────────────────────────────────────────

/// The backend could not produce a translation unit at all.
#[derive(Debug)]
pub struct TuError {
    pub file: PathBuf,
    pub reason: String,
}

impl fmt::Display for TuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to initialize translation unit for file: {} ({})",
            self.file.display(),
            self.reason
        )
    }
}

impl std::error::Error for TuError {}

// ── Backend traits ─────────────────────────────────────────────────────────

/// One parsing handle. Indexes are not shared across tasks: each `FileParser`
/// copy owns a fresh index, which is the whole isolation contract.
pub trait TuIndex: Send {
    fn parse_translation_unit(
        &mut self,
        file: &Path,
        args: &[String],
    ) -> Result<TranslationUnit, TuError>;
}

/// Factory for indexes. Shared read-only across the worker pool.
pub trait TuBackend: Send + Sync {
    fn create_index(&self) -> Box<dyn TuIndex>;
}
