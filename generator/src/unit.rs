// unit.rs — Code generation units
//
// The `CodeGenUnit` trait is the manager's seam to the actual code
// generation: settings, lenient-mode iteration count, and per-file
// generation from a parsing result. Units must be `Clone` because the
// manager takes a fresh copy per generation task.
//
// `MacroCodeGenUnit` is the shipped implementation: it renders the
// generated header as macro expansions, one class footer macro per
// reflected struct/class and one file footer macro closing the artifact.

use std::io;

use crate::entity::{EnumInfo, FileParsingResult, NamespaceInfo, StructClassInfo};
use crate::genfile::{source_fingerprint, GeneratedFile};
use crate::settings::{sanitize_identifier, MacroCodeGenUnitSettings};

// ── Trait ───────────────────────────────────────────────────────────────────

pub trait CodeGenUnit: Clone + Send + 'static {
    fn settings(&self) -> &MacroCodeGenUnitSettings;

    /// Number of unconditional passes in lenient mode.
    fn iteration_count(&self) -> u8 {
        1
    }

    /// Write the generated artifact for one successfully parsed file.
    /// Returns false on failure; generation is never retried.
    fn generate_code(&mut self, parsing_result: &FileParsingResult) -> bool;
}

// ── Entity collection helpers ───────────────────────────────────────────────

fn collect_struct_classes<'a>(result: &'a FileParsingResult) -> Vec<&'a StructClassInfo> {
    fn visit<'a>(namespace: &'a NamespaceInfo, out: &mut Vec<&'a StructClassInfo>) {
        out.extend(namespace.structs.iter());
        out.extend(namespace.classes.iter());
        for nested in &namespace.namespaces {
            visit(nested, out);
        }
    }

    let mut out: Vec<&StructClassInfo> = Vec::new();
    out.extend(result.structs.iter());
    out.extend(result.classes.iter());
    for namespace in &result.namespaces {
        visit(namespace, &mut out);
    }
    out
}

fn collect_enums<'a>(result: &'a FileParsingResult) -> Vec<&'a EnumInfo> {
    fn visit<'a>(namespace: &'a NamespaceInfo, out: &mut Vec<&'a EnumInfo>) {
        out.extend(namespace.enums.iter());
        for nested in &namespace.namespaces {
            visit(nested, out);
        }
    }

    let mut out: Vec<&EnumInfo> = Vec::new();
    out.extend(result.enums.iter());
    for namespace in &result.namespaces {
        visit(namespace, &mut out);
    }
    out
}

/// Total number of reflected entities in a result, nested ones included.
fn reflected_entity_count(result: &FileParsingResult) -> usize {
    fn namespace_count(namespace: &NamespaceInfo) -> usize {
        1 + namespace.structs.len()
            + namespace.classes.len()
            + namespace.enums.len()
            + namespace.functions.len()
            + namespace.variables.len()
            + namespace
                .namespaces
                .iter()
                .map(namespace_count)
                .sum::<usize>()
    }

    result.structs.len()
        + result.classes.len()
        + result.enums.len()
        + result.functions.len()
        + result.variables.len()
        + result.namespaces.iter().map(namespace_count).sum::<usize>()
}

// ── Macro code generation unit ──────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MacroCodeGenUnit {
    settings: MacroCodeGenUnitSettings,
    iteration_count: u8,
}

impl MacroCodeGenUnit {
    pub fn new(settings: MacroCodeGenUnitSettings) -> Self {
        Self {
            settings,
            iteration_count: 1,
        }
    }

    pub fn with_iteration_count(mut self, iteration_count: u8) -> Self {
        self.iteration_count = iteration_count.max(1);
        self
    }

    fn write_artifact(&self, result: &FileParsingResult) -> io::Result<bool> {
        let Some(path) = self.settings.generated_header_path(&result.parsed_file) else {
            tracing::error!(
                pattern = %self.settings.generated_header_file_name_pattern,
                "generated header file name pattern has no placeholder"
            );
            return Ok(false);
        };

        let mut file = GeneratedFile::create(&path, &result.parsed_file)?;

        // Header block.
        file.write_lines([
            "#pragma once",
            "",
            "/**",
        ])?;
        file.write_line(&format!(
            "*\tSource file: {}",
            result.parsed_file.display()
        ))?;
        file.write_lines(["*/", ""])?;
        if let Ok(fingerprint) = source_fingerprint(&result.parsed_file) {
            file.write_fingerprint(&fingerprint)?;
            file.write_line("")?;
        }
        file.write_line(&format!("#include \"{}\"", self.settings.entity_macros_filename))?;
        file.write_line("")?;

        // One footer macro per reflected struct/class.
        for parsed in collect_struct_classes(result) {
            let qualified = parsed.entity.qualified_name();
            let Some(macro_name) = self.settings.class_footer_macro(&qualified) else {
                tracing::error!(
                    pattern = %self.settings.class_footer_macro_pattern,
                    "class footer macro pattern has no placeholder"
                );
                return Ok(false);
            };
            file.write_line(&format!("#define {macro_name} \\"))?;
            file.write_lines([
                "public: \\",
                "\tstatic refgen::Class const& staticClass() noexcept; \\",
                "\trefgen::Class const& getClass() const noexcept; \\",
            ])?;
            file.write_line(&format!(
                "\t/* {} reflected fields, {} reflected methods */ \\",
                parsed.fields.len(),
                parsed.methods.len()
            ))?;
            file.write_line("private:")?;
            file.write_line("")?;
        }

        // File footer macro: registration of every reflected entity.
        let Some(file_macro) = self.settings.header_file_footer_macro(&result.parsed_file)
        else {
            tracing::error!(
                pattern = %self.settings.header_file_footer_macro_pattern,
                "header file footer macro pattern has no placeholder"
            );
            return Ok(false);
        };
        file.write_line(&format!("#define {file_macro} \\"))?;
        file.write_line("namespace refgen_generated { \\")?;
        for parsed in collect_struct_classes(result) {
            let qualified = parsed.entity.qualified_name();
            file.write_line(&format!(
                "\tinline refgen::ClassRegistrar const kClass_{}{{\"{}\"}}; \\",
                sanitize_identifier(&qualified),
                qualified
            ))?;
        }
        for parsed in collect_enums(result) {
            let qualified = parsed.entity.qualified_name();
            file.write_line(&format!(
                "\tinline refgen::EnumRegistrar const kEnum_{}{{\"{}\", {}u}}; \\",
                sanitize_identifier(&qualified),
                qualified,
                parsed.values.len()
            ))?;
        }
        for parsed in &result.functions {
            file.write_line(&format!(
                "\tinline refgen::FunctionRegistrar const kFunction_{}{{\"{}\"}}; \\",
                sanitize_identifier(&parsed.entity.name),
                parsed.entity.name
            ))?;
        }
        for parsed in &result.variables {
            file.write_line(&format!(
                "\tinline refgen::VariableRegistrar const kVariable_{}{{\"{}\"}}; \\",
                sanitize_identifier(&parsed.entity.name),
                parsed.entity.name
            ))?;
        }
        file.write_line(&format!(
            "\t/* {} reflected entities */ \\",
            reflected_entity_count(result)
        ))?;
        file.write_line("}")?;

        file.flush()?;
        Ok(true)
    }
}

impl CodeGenUnit for MacroCodeGenUnit {
    fn settings(&self) -> &MacroCodeGenUnitSettings {
        &self.settings
    }

    fn iteration_count(&self) -> u8 {
        self.iteration_count
    }

    fn generate_code(&mut self, parsing_result: &FileParsingResult) -> bool {
        match self.write_artifact(parsing_result) {
            Ok(completed) => completed,
            Err(error) => {
                tracing::error!(
                    file = %parsing_result.parsed_file.display(),
                    %error,
                    "failed to write generated artifact"
                );
                false
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
