// parser.rs — File parsing driver over the translation-unit seam
//
// Thin adapter around the external translation-unit parser with three entry
// points: `prepare_for_parsing` (diagnostic-only pre-parse enumerating the
// generated macros a file is missing), `parse_ignore_errors` (lenient parse,
// diagnostics discarded) and `parse_fail_on_errors` (strict parse, filtered
// diagnostics promoted to result errors).
//
// Each parser copy owns a private index: cloning a FileParser recreates the
// index from the backend, so tasks never share mutable parser state.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::diag::ParsingError;
use crate::entity::{
    EnumInfo, FileParsingResult, FunctionInfo, NamespaceInfo, StructClassInfo, VariableInfo,
};
use crate::settings::{split_macro_pattern, MacroCodeGenUnitSettings, ParsingSettings};
use crate::tu::{CursorKind, TranslationUnit, TuBackend, TuIndex};

const UNKNOWN_TYPE_PREFIX: &str = "unknown type name '";

/// Canonicalise when possible; a file that cannot be canonicalised (not yet
/// existing, permission) keeps its given spelling.
fn sanitize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn same_file(a: &Path, b: &Path) -> bool {
    a == b || sanitize_path(a) == sanitize_path(b)
}

pub struct FileParser {
    backend: Arc<dyn TuBackend>,
    index: Box<dyn TuIndex>,
    settings: Arc<ParsingSettings>,
}

impl Clone for FileParser {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            // A fresh index per copy: this is the whole isolation contract.
            index: self.backend.create_index(),
            settings: self.settings.clone(),
        }
    }
}

impl FileParser {
    pub fn new(backend: Arc<dyn TuBackend>, settings: Arc<ParsingSettings>) -> Self {
        let index = backend.create_index();
        Self {
            backend,
            index,
            settings,
        }
    }

    pub fn settings(&self) -> &ParsingSettings {
        &self.settings
    }

    // ── Entry points ───────────────────────────────────────────────────────

    /// Diagnostic-only pre-parse: run the translation unit with the real
    /// compilation flags, discard the cursor tree, and collect the generated
    /// macro names the file references but does not yet see defined.
    ///
    /// A file that cannot be parsed at all contributes an empty set; the
    /// subsequent parse step surfaces the genuine error.
    pub fn prepare_for_parsing(
        &mut self,
        file: &Path,
        unit_settings: &MacroCodeGenUnitSettings,
    ) -> BTreeSet<String> {
        let mut pending = BTreeSet::new();

        if !file.is_file() {
            return pending;
        }
        let arguments = self.settings.compilation_arguments();
        match self.index.parse_translation_unit(file, &arguments) {
            Ok(unit) => {
                // Genuine errors are not this step's business.
                let _ = filter_diagnostics(file, &unit, unit_settings, &mut pending);
            }
            Err(error) => {
                tracing::warn!(file = %file.display(), %error, "pre-parse failed");
            }
        }

        pending
    }

    /// Parse the file and fill the result, discarding every diagnostic.
    pub fn parse_ignore_errors(&mut self, file: &Path) -> FileParsingResult {
        let mut result = FileParsingResult::new(&sanitize_path(file));

        if !file.is_file() {
            result
                .errors
                .push(ParsingError::message(format!(
                    "File {} doesn't exist.",
                    file.display()
                )));
            return result;
        }

        let arguments = self.settings.compilation_arguments();
        match self.index.parse_translation_unit(file, &arguments) {
            Ok(unit) => {
                self.log_diagnostics(&unit);
                walk_translation_unit(&unit, &mut result);
            }
            Err(error) => {
                result.errors.push(ParsingError::message(error.to_string()));
            }
        }

        result
    }

    /// Parse the file, promoting every filtered diagnostic to a result
    /// error. On any surviving error the cursor tree is not walked.
    pub fn parse_fail_on_errors(
        &mut self,
        file: &Path,
        unit_settings: &MacroCodeGenUnitSettings,
    ) -> FileParsingResult {
        let mut result = FileParsingResult::new(&sanitize_path(file));

        if !file.is_file() {
            result
                .errors
                .push(ParsingError::message(format!(
                    "File {} doesn't exist.",
                    file.display()
                )));
            return result;
        }

        let arguments = self.settings.compilation_arguments();
        let unit = match self.index.parse_translation_unit(file, &arguments) {
            Ok(unit) => unit,
            Err(error) => {
                result.errors.push(ParsingError::message(error.to_string()));
                return result;
            }
        };

        // Pending macros found here are transient: only the pre-parse step's
        // output drives the define-append round.
        let mut pending = BTreeSet::new();
        match filter_diagnostics(file, &unit, unit_settings, &mut pending) {
            Err(config_error) => {
                result.errors.push(config_error);
            }
            Ok(errors) if !errors.is_empty() => {
                result.errors = errors;
            }
            Ok(_) => {
                self.log_diagnostics(&unit);
                walk_translation_unit(&unit, &mut result);
            }
        }

        result
    }

    fn log_diagnostics(&self, unit: &TranslationUnit) {
        if !self.settings.log_tu_diagnostics || unit.diagnostics.is_empty() {
            return;
        }
        for diagnostic in &unit.diagnostics {
            tracing::debug!(
                severity = ?diagnostic.severity,
                file = %diagnostic.location.file.display(),
                line = diagnostic.location.line,
                "{}",
                diagnostic.spelling
            );
        }
    }
}

// ── Diagnostic filtering ────────────────────────────────────────────────────

/// Classify every diagnostic of `unit` as expected (a missing generated
/// macro, added to `pending` and suppressed) or genuine (promoted to a
/// `ParsingError`). Diagnostics located outside `file` are never promoted.
///
/// Returns `Err` when the class footer macro pattern cannot be split: a
/// configuration error that fails the whole file with no retry.
fn filter_diagnostics(
    file: &Path,
    unit: &TranslationUnit,
    unit_settings: &MacroCodeGenUnitSettings,
    pending: &mut BTreeSet<String>,
) -> Result<Vec<ParsingError>, ParsingError> {
    let (footer_left, footer_right) =
        split_macro_pattern(&unit_settings.class_footer_macro_pattern).ok_or_else(|| {
            ParsingError::message("failed to split class footer macro pattern")
        })?;
    let file_footer_macro = unit_settings.header_file_footer_macro(file);

    let mut errors = Vec::new();

    for diagnostic in &unit.diagnostics {
        if !same_file(&diagnostic.location.file, file) {
            continue;
        }

        if let Some(unknown_type) = unknown_type_name(&diagnostic.spelling) {
            if Some(unknown_type) == file_footer_macro.as_deref() {
                pending.insert(unknown_type.to_string());
                continue;
            }
            if unknown_type.contains(&footer_left) && unknown_type.contains(&footer_right) {
                pending.insert(unknown_type.to_string());
                continue;
            }
        }

        errors.push(ParsingError::from_diagnostic(diagnostic));
    }

    Ok(errors)
}

/// Extract `X` from a spelling of the form `unknown type name 'X'`.
fn unknown_type_name(spelling: &str) -> Option<&str> {
    let start = spelling.find(UNKNOWN_TYPE_PREFIX)? + UNKNOWN_TYPE_PREFIX.len();
    let rest = &spelling[start..];
    let end = rest.find('\'')?;
    Some(&rest[..end])
}

// ── Cursor walk ─────────────────────────────────────────────────────────────

/// Dispatch file-scope cursors to the per-entity parsers. Only cursors that
/// originate in the main file are kept; unrecognised kinds are silently
/// skipped. Outer back references are refreshed once the walk completes.
fn walk_translation_unit(unit: &TranslationUnit, result: &mut FileParsingResult) {
    for cursor in &unit.root.children {
        if !cursor.from_main_file {
            continue;
        }
        match cursor.kind {
            CursorKind::Namespace => {
                if let Some(parsed) = NamespaceInfo::from_cursor(cursor, &mut result.errors) {
                    result.namespaces.push(parsed);
                }
            }
            CursorKind::StructDecl => {
                if let Some(parsed) = StructClassInfo::from_cursor(cursor, &mut result.errors) {
                    result.structs.push(parsed);
                }
            }
            CursorKind::ClassDecl | CursorKind::ClassTemplate => {
                if let Some(parsed) = StructClassInfo::from_cursor(cursor, &mut result.errors) {
                    result.classes.push(parsed);
                }
            }
            CursorKind::EnumDecl => {
                if let Some(parsed) = EnumInfo::from_cursor(cursor, &mut result.errors) {
                    result.enums.push(parsed);
                }
            }
            CursorKind::FunctionDecl => {
                if let Some(parsed) = FunctionInfo::from_cursor(cursor, &mut result.errors) {
                    result.functions.push(parsed);
                }
            }
            CursorKind::VarDecl => {
                if let Some(parsed) = VariableInfo::from_cursor(cursor, &mut result.errors) {
                    result.variables.push(parsed);
                }
            }
            _ => {}
        }
    }

    result.refresh_outer_entities();
}

// ── Tests ───────────────────────────────────────────────────────────────────
