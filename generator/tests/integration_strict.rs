// Integration tests for the strict engine: the fixed-point iteration over
// pre-parse / define / parse / truncate / generate phases.
//
// Each test drives the manager through a scripted translation-unit backend
// (see common/mod.rs) whose diagnostics depend on the macros currently
// defined in the artifacts on disk, which is exactly the dependency the
// fixed point exists to break.

#[allow(dead_code)]
mod common;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use common::ScriptedWorld;
use refgen::manager::{CodeGenManager, CodeGenResult};
use refgen::parser::FileParser;
use refgen::settings::{CodeGenManagerSettings, ParsingSettings};
use refgen::unit::MacroCodeGenUnit;

fn run_strict(world: &ScriptedWorld, files: &[PathBuf]) -> CodeGenResult {
    let parser = FileParser::new(
        Arc::new(world.backend()),
        Arc::new(ParsingSettings::default()),
    );
    let unit = MacroCodeGenUnit::new(world.unit_settings.clone());

    let mut settings = CodeGenManagerSettings::with_default_extensions();
    settings.to_process_files.extend(files.iter().cloned());
    let manager = CodeGenManager::new(settings, 4);
    manager.run(&parser, &unit, false)
}

fn count_of(result: &CodeGenResult, file: &Path) -> usize {
    result.parsed_files.iter().filter(|f| *f == file).count()
}

// ── Seed scenarios ──────────────────────────────────────────────────────────

/// S1: one file, one missing file-footer macro, one iteration.
#[test]
fn single_file_resolves_in_one_iteration() {
    let mut world = ScriptedWorld::new("s1");
    let a = world.header("a.h");
    let footer = world.file_footer_macro(&a);
    world.requires(&a, &footer);
    world.annotated_class(&a, "Widget");

    let result = run_strict(&world, &[a.clone()]);

    assert!(result.completed);
    assert!(result.errors.is_empty());
    assert_eq!(result.parsed_files, vec![a.clone()]);

    let text = std::fs::read_to_string(world.artifact_path(&a)).unwrap();
    assert!(text.starts_with("#pragma once"));
    assert!(text.contains("#define Widget_GENERATED \\"));
    assert!(text.contains(&format!("#define {footer} \\")));
    // No residual pre-parse define lines: those end with a trailing space
    // and no continuation backslash.
    assert!(!text.lines().any(|line| line == format!("#define {footer} ")));
}

/// S2: a child header surfaces both its own file macro and its parent's
/// class footer macro on the first pre-parse; one iteration suffices.
#[test]
fn include_parent_macro_resolves_in_one_iteration() {
    let mut world = ScriptedWorld::new("s2");
    let child = world.header("child.h");
    let footer = world.file_footer_macro(&child);
    world.requires(&child, &footer);
    world.requires(&child, "Parent_GENERATED");
    world.annotated_class(&child, "Child");

    let result = run_strict(&world, &[child.clone()]);

    assert!(result.completed);
    assert_eq!(count_of(&result, &child), 1);
    // One pre-parse plus one parse.
    assert_eq!(world.parse_count(&child), 2);
}

/// S3: an include chain reveals one macro layer per round; the retry set
/// shrinks 1 -> 0 and the engine finishes in two iterations.
#[test]
fn include_chain_cascades_over_two_iterations() {
    let mut world = ScriptedWorld::new("s3");
    let a = world.header("a.h");
    let b = world.header("b.h");
    let footer_a = world.file_footer_macro(&a);
    let footer_b = world.file_footer_macro(&b);

    world.requires(&a, &footer_a);
    world.annotated_class(&a, "A");

    world.requires(&b, &footer_b);
    world.requires_masked(
        &b,
        "A_GENERATED",
        &footer_b,
        "expected ';' after top level declarator",
    );
    world.includes(&b, &a);
    world.annotated_class(&b, "B");

    let result = run_strict(&world, &[a.clone(), b.clone()]);

    assert!(result.completed);
    assert!(result.errors.is_empty());
    // a settles in iteration 1; b is parsed again in iteration 2.
    assert_eq!(count_of(&result, &a), 1);
    assert_eq!(count_of(&result, &b), 2);
    assert!(world.artifact_path(&b).is_file());
}

/// S4: a genuine error is recorded, the file stays in the retry set, and
/// the stalled second iteration ends the loop with completed = false.
#[test]
fn genuine_error_stalls_after_two_iterations() {
    let mut world = ScriptedWorld::new("s4");
    let a = world.header("a.h");
    world.genuine_error(&a, "use of undeclared identifier 'FooBar'");

    let result = run_strict(&world, &[a.clone()]);

    assert!(!result.completed);
    assert_eq!(count_of(&result, &a), 2);
    assert_eq!(result.errors.len(), 1);
    let (failed_file, error) = &result.errors[0];
    assert_eq!(failed_file, &a);
    let rendered = error.to_string();
    assert!(rendered.contains("use of undeclared identifier 'FooBar'"));
    assert!(rendered.contains("line 10, column 1"));
}

/// S6: an unsplittable class footer pattern is a per-file configuration
/// error; the file can never resolve and the stall check ends the run.
#[test]
fn unsplittable_footer_pattern_fails_run() {
    let mut world = ScriptedWorld::new("s6");
    let a = world.header("a.h");
    world.annotated_class(&a, "Widget");
    world.unit_settings.class_footer_macro_pattern = "NO_PLACEHOLDER".to_string();

    let result = run_strict(&world, &[a.clone()]);

    assert!(!result.completed);
    assert_eq!(count_of(&result, &a), 2);
    assert!(result
        .errors
        .iter()
        .any(|(_, e)| e.message == "failed to split class footer macro pattern"));
}

// ── Boundary cases ──────────────────────────────────────────────────────────

/// Two files with a mutual include chain must terminate without livelock.
#[test]
fn mutual_include_chain_terminates() {
    let mut world = ScriptedWorld::new("mutual");
    let a = world.header("a.h");
    let b = world.header("b.h");
    let footer_a = world.file_footer_macro(&a);
    let footer_b = world.file_footer_macro(&b);

    world.requires(&a, &footer_a);
    world.requires_masked(&a, "B_GENERATED", &footer_a, "unknown base class");
    world.includes(&a, &b);
    world.annotated_class(&a, "A");

    world.requires(&b, &footer_b);
    world.requires_masked(&b, "A_GENERATED", &footer_b, "unknown base class");
    world.includes(&b, &a);
    world.annotated_class(&b, "B");

    let result = run_strict(&world, &[a.clone(), b.clone()]);

    assert!(result.completed);
    // Termination bound: at most |files| + 1 iterations, here two.
    assert!(count_of(&result, &a) <= 3);
    assert!(count_of(&result, &b) <= 3);
    assert!(world.artifact_path(&a).is_file());
    assert!(world.artifact_path(&b).is_file());
}

/// Empty file set: nothing to do, trivially completed.
#[test]
fn empty_file_set_completes() {
    let world = ScriptedWorld::new("empty");
    let result = run_strict(&world, &[]);

    assert!(result.completed);
    assert!(result.parsed_files.is_empty());
    assert!(result.errors.is_empty());
}

/// A second run over clean artifacts parses nothing: the up-to-date check
/// excludes every file.
#[test]
fn second_run_skips_up_to_date_files() {
    let mut world = ScriptedWorld::new("idempotent");
    let a = world.header("a.h");
    let footer = world.file_footer_macro(&a);
    world.requires(&a, &footer);
    world.annotated_class(&a, "Widget");

    let first = run_strict(&world, &[a.clone()]);
    assert!(first.completed);
    assert_eq!(first.parsed_files, vec![a.clone()]);

    let second = run_strict(&world, &[a.clone()]);
    assert!(second.completed);
    assert!(second.parsed_files.is_empty());
    assert_eq!(second.up_to_date_files, vec![a.clone()]);
}

/// force_all re-admits files the up-to-date check would skip.
#[test]
fn force_all_overrides_up_to_date_check() {
    let mut world = ScriptedWorld::new("force");
    let a = world.header("a.h");
    let footer = world.file_footer_macro(&a);
    world.requires(&a, &footer);
    world.annotated_class(&a, "Widget");

    let parser = FileParser::new(
        Arc::new(world.backend()),
        Arc::new(ParsingSettings::default()),
    );
    let unit = MacroCodeGenUnit::new(world.unit_settings.clone());
    let mut settings = CodeGenManagerSettings::with_default_extensions();
    settings.to_process_files.push(a.clone());
    let manager = CodeGenManager::new(settings, 2);

    assert!(manager.run(&parser, &unit, false).completed);
    let again = manager.run(&parser, &unit, true);
    assert!(again.completed);
    assert_eq!(again.parsed_files, vec![a.clone()]);
}

/// One resolving and one never-resolving file: the run fails but the good
/// file's artifact is still generated.
#[test]
fn unresolvable_file_does_not_block_others() {
    let mut world = ScriptedWorld::new("partial");
    let good = world.header("good.h");
    let bad = world.header("bad.h");
    let footer = world.file_footer_macro(&good);
    world.requires(&good, &footer);
    world.annotated_class(&good, "Good");
    world.genuine_error(&bad, "use of undeclared identifier 'Broken'");

    let result = run_strict(&world, &[good.clone(), bad.clone()]);

    assert!(!result.completed);
    assert!(world.artifact_path(&good).is_file());
    assert_eq!(count_of(&result, &good), 1);
    assert!(result.errors.iter().all(|(file, _)| file == &bad));
}
