// settings.rs — Parsing and code generation settings
//
// Three settings groups: `ParsingSettings` (compilation arguments handed to
// the external translation-unit parser), `MacroCodeGenUnitSettings` (output
// directory and macro name patterns), and `CodeGenManagerSettings` (which
// files and directories to process). A `GeneratorConfig` aggregates all of
// them for JSON config-file loading; the CLI overrides individual fields.
//
// Macro name patterns contain a single `#...#` placeholder. The split of a
// pattern is the text before the first `#` and the text after the last `#`;
// substitution and split are exact inverses.

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::entity::EntityKind;

// ── Pattern split ───────────────────────────────────────────────────────────

/// Split a macro pattern around its `#...#` placeholder.
///
/// Returns the text before the first `#` and after the last `#`, or `None`
/// when the pattern has no placeholder at all or both sides are empty.
pub fn split_macro_pattern(pattern: &str) -> Option<(String, String)> {
    let first = pattern.find('#')?;
    let last = pattern.rfind('#')?;
    let left = pattern[..first].to_string();
    let right = pattern[last + 1..].to_string();
    if left.is_empty() && right.is_empty() {
        return None;
    }
    Some((left, right))
}

/// Substitute `ident` for the pattern's placeholder.
pub fn substitute_macro_pattern(pattern: &str, ident: &str) -> Option<String> {
    let (left, right) = split_macro_pattern(pattern)?;
    Some(format!("{left}{ident}{right}"))
}

/// Map every byte outside `[A-Za-z0-9_]` to `_` so the result is a valid
/// macro identifier fragment.
pub fn sanitize_identifier(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

// ── Parsing settings ────────────────────────────────────────────────────────

/// Define injected into every translation unit so headers can detect the
/// generator's parsing pass.
pub const PARSING_DEFINE: &str = "REFGEN_PARSING";

/// Settings forwarded to the external translation-unit parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingSettings {
    /// Extra compilation flags, passed through verbatim and never interpreted.
    pub compilation_flags: Vec<String>,
    pub include_directories: Vec<PathBuf>,
    /// Strict engine when true, lenient fixed-iteration engine when false.
    pub fail_on_tu_errors: bool,
    /// Log every raw translation-unit diagnostic after a successful parse.
    pub log_tu_diagnostics: bool,
    /// Prefix of the annotation macros defined in the entity-macros file.
    pub annotation_macro_prefix: String,
}

impl Default for ParsingSettings {
    fn default() -> Self {
        Self {
            compilation_flags: Vec::new(),
            include_directories: Vec::new(),
            fail_on_tu_errors: true,
            log_tu_diagnostics: false,
            annotation_macro_prefix: "REFL_".to_string(),
        }
    }
}

impl ParsingSettings {
    /// Assemble the final argument vector for the translation-unit parser.
    /// The skip-function-bodies / incomplete / keep-going trio is mandatory;
    /// user flags come last so they can override defaults.
    pub fn compilation_arguments(&self) -> Vec<String> {
        let mut args = vec![
            "-xc++".to_string(),
            "--skip-function-bodies".to_string(),
            "--incomplete-translation-unit".to_string(),
            "--keep-going".to_string(),
            format!("-D{PARSING_DEFINE}"),
        ];
        for dir in &self.include_directories {
            args.push(format!("-I{}", dir.display()));
        }
        args.extend(self.compilation_flags.iter().cloned());
        args
    }

    /// One-time initialisation log of the effective argument set.
    pub fn init(&self) {
        tracing::info!(
            arguments = %self.compilation_arguments().join(" "),
            "translation-unit compilation arguments"
        );
    }

    /// Name of the annotation macro for one entity kind, e.g. `REFL_CLASS`.
    pub fn annotation_macro(&self, kind: EntityKind) -> String {
        format!(
            "{}{}",
            self.annotation_macro_prefix,
            kind.annotation_tag().to_ascii_uppercase()
        )
    }
}

// ── Code generation unit settings ───────────────────────────────────────────

/// Output location and macro patterns for the macro code generation unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroCodeGenUnitSettings {
    pub output_directory: PathBuf,
    /// Pattern of the generated header's file name, placeholder = source stem.
    pub generated_header_file_name_pattern: String,
    /// Pattern of per-class footer macros, placeholder = qualified class name.
    pub class_footer_macro_pattern: String,
    /// Pattern of the per-file footer macro, placeholder = source stem.
    pub header_file_footer_macro_pattern: String,
    /// Name of the shared entity-macros file emitted once per run.
    pub entity_macros_filename: String,
}

impl Default for MacroCodeGenUnitSettings {
    fn default() -> Self {
        Self {
            output_directory: PathBuf::from("generated"),
            generated_header_file_name_pattern: "#FILENAME#.gen.h".to_string(),
            class_footer_macro_pattern: "#CLASSFULLNAME#_GENERATED".to_string(),
            header_file_footer_macro_pattern: "File_#FILENAME#_GENERATED".to_string(),
            entity_macros_filename: "EntityMacros.h".to_string(),
        }
    }
}

impl MacroCodeGenUnitSettings {
    fn source_stem(source_file: &Path) -> String {
        source_file
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// File name of the generated header for `source_file`.
    pub fn generated_header_file_name(&self, source_file: &Path) -> Option<String> {
        substitute_macro_pattern(
            &self.generated_header_file_name_pattern,
            &Self::source_stem(source_file),
        )
    }

    /// Full path of the generated header for `source_file`.
    pub fn generated_header_path(&self, source_file: &Path) -> Option<PathBuf> {
        self.generated_header_file_name(source_file)
            .map(|name| self.output_directory.join(name))
    }

    /// The per-file footer macro name for `source_file`.
    pub fn header_file_footer_macro(&self, source_file: &Path) -> Option<String> {
        substitute_macro_pattern(
            &self.header_file_footer_macro_pattern,
            &sanitize_identifier(&Self::source_stem(source_file)),
        )
    }

    /// The class footer macro name for a qualified class name.
    pub fn class_footer_macro(&self, class_qualified_name: &str) -> Option<String> {
        substitute_macro_pattern(
            &self.class_footer_macro_pattern,
            &sanitize_identifier(class_qualified_name),
        )
    }

    /// Path of the shared entity-macros file.
    pub fn entity_macros_path(&self) -> PathBuf {
        self.output_directory.join(&self.entity_macros_filename)
    }
}

// ── Manager settings ────────────────────────────────────────────────────────

/// Which sources the manager scans for files to process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeGenManagerSettings {
    pub to_process_files: Vec<PathBuf>,
    pub to_process_directories: Vec<PathBuf>,
    pub ignored_files: BTreeSet<PathBuf>,
    pub ignored_directories: BTreeSet<PathBuf>,
    pub supported_extensions: BTreeSet<String>,
}

impl CodeGenManagerSettings {
    pub fn with_default_extensions() -> Self {
        let mut settings = Self::default();
        settings.supported_extensions.insert("h".to_string());
        settings.supported_extensions.insert("hpp".to_string());
        settings
    }
}

// ── Config file ─────────────────────────────────────────────────────────────

/// Aggregate configuration loadable from a JSON file. Every field is
/// optional; the CLI merges its own overrides on top.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub parsing: Option<ParsingSettings>,
    pub code_gen_unit: Option<MacroCodeGenUnitSettings>,
    pub manager: Option<CodeGenManagerSettings>,
    pub iteration_count: Option<u8>,
    pub worker_count: Option<usize>,
}

/// Failure while loading a config file.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        message: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "cannot read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, message } => {
                write!(f, "cannot parse config {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl GeneratorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&source).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_around_placeholder() {
        assert_eq!(
            split_macro_pattern("File_#FILENAME#_GENERATED"),
            Some(("File_".to_string(), "_GENERATED".to_string()))
        );
    }

    #[test]
    fn split_with_empty_left_side() {
        assert_eq!(
            split_macro_pattern("#CLASSFULLNAME#_GENERATED"),
            Some((String::new(), "_GENERATED".to_string()))
        );
    }

    #[test]
    fn split_without_placeholder_fails() {
        assert_eq!(split_macro_pattern("NO_PLACEHOLDER"), None);
    }

    #[test]
    fn split_with_bare_placeholder_fails() {
        // Nothing on either side: the macro name would be indistinguishable
        // from an arbitrary identifier.
        assert_eq!(split_macro_pattern("#CLASSFULLNAME#"), None);
    }

    #[test]
    fn substitute_round_trips_with_split() {
        let pattern = "File_#X#_GENERATED";
        let (left, right) = split_macro_pattern(pattern).unwrap();
        let produced = substitute_macro_pattern(pattern, "MyFile").unwrap();
        assert_eq!(produced, format!("{left}MyFile{right}"));
        assert!(produced.starts_with(&left) && produced.ends_with(&right));
    }

    #[test]
    fn sanitize_replaces_non_identifier_bytes() {
        assert_eq!(sanitize_identifier("app::Widget"), "app__Widget");
        assert_eq!(sanitize_identifier("my-file.v2"), "my_file_v2");
    }

    #[test]
    fn generated_header_naming() {
        let settings = MacroCodeGenUnitSettings {
            output_directory: PathBuf::from("/out"),
            ..Default::default()
        };
        assert_eq!(
            settings.generated_header_path(Path::new("/src/A.h")),
            Some(PathBuf::from("/out/A.gen.h"))
        );
        assert_eq!(
            settings.header_file_footer_macro(Path::new("/src/A.h")),
            Some("File_A_GENERATED".to_string())
        );
        assert_eq!(
            settings.class_footer_macro("app::Widget"),
            Some("app__Widget_GENERATED".to_string())
        );
    }

    #[test]
    fn compilation_arguments_keep_mandatory_flags_first() {
        let mut settings = ParsingSettings::default();
        settings.include_directories.push(PathBuf::from("/inc"));
        settings.compilation_flags.push("-std=c++17".to_string());
        let args = settings.compilation_arguments();
        assert_eq!(args[0], "-xc++");
        assert!(args.contains(&"--keep-going".to_string()));
        assert!(args.contains(&"-I/inc".to_string()));
        assert_eq!(args.last().unwrap(), "-std=c++17");
    }

    #[test]
    fn annotation_macro_names() {
        let settings = ParsingSettings::default();
        assert_eq!(settings.annotation_macro(EntityKind::Class), "REFL_CLASS");
        assert_eq!(
            settings.annotation_macro(EntityKind::EnumValue),
            "REFL_ENUMVALUE"
        );
    }

    #[test]
    fn config_round_trip() {
        let config = GeneratorConfig {
            iteration_count: Some(3),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: GeneratorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.iteration_count, Some(3));
        assert!(parsed.parsing.is_none());
    }
}
