// Integration tests for the lenient engine: fixed iteration count, no
// pre-parse, no retry, diagnostics discarded.

#[allow(dead_code)]
mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::ScriptedWorld;
use refgen::manager::{CodeGenManager, CodeGenResult};
use refgen::parser::FileParser;
use refgen::settings::{CodeGenManagerSettings, ParsingSettings};
use refgen::unit::MacroCodeGenUnit;

fn run_lenient(world: &ScriptedWorld, files: &[PathBuf], iterations: u8) -> CodeGenResult {
    let parsing = ParsingSettings {
        fail_on_tu_errors: false,
        ..Default::default()
    };
    let parser = FileParser::new(Arc::new(world.backend()), Arc::new(parsing));
    let unit = MacroCodeGenUnit::new(world.unit_settings.clone()).with_iteration_count(iterations);

    let mut settings = CodeGenManagerSettings::with_default_extensions();
    settings.to_process_files.extend(files.iter().cloned());
    let manager = CodeGenManager::new(settings, 4);
    manager.run(&parser, &unit, false)
}

/// S5: with iteration_count = 3 every file is parsed and generated three
/// times unconditionally; the artifact left on disk is the third one.
#[test]
fn three_unconditional_passes() {
    let mut world = ScriptedWorld::new("s5");
    let a = world.header("a.h");
    world.annotated_class(&a, "Widget");

    let result = run_lenient(&world, &[a.clone()], 3);

    assert!(result.completed);
    assert_eq!(result.parsed_files.len(), 3);
    // Exactly one translation-unit parse per pass: no pre-parse rounds.
    assert_eq!(world.parse_count(&a), 3);

    let text = std::fs::read_to_string(world.artifact_path(&a)).unwrap();
    assert!(text.contains("#define Widget_GENERATED \\"));
}

/// Lenient mode discards diagnostics entirely: a file with a genuine error
/// still parses and generates.
#[test]
fn diagnostics_are_ignored() {
    let mut world = ScriptedWorld::new("lenient_err");
    let a = world.header("a.h");
    world.annotated_class(&a, "Widget");
    world.genuine_error(&a, "use of undeclared identifier 'FooBar'");

    let result = run_lenient(&world, &[a.clone()], 1);

    assert!(result.completed);
    assert!(result.errors.is_empty());
    assert!(world.artifact_path(&a).is_file());
}

/// Two files, two passes: every pass parses and regenerates both.
#[test]
fn passes_cover_every_file() {
    let mut world = ScriptedWorld::new("lenient_two");
    let a = world.header("a.h");
    let b = world.header("b.h");
    world.annotated_class(&a, "A");
    world.annotated_class(&b, "B");

    let result = run_lenient(&world, &[a.clone(), b.clone()], 2);

    assert!(result.completed);
    assert_eq!(result.parsed_files.len(), 4);
    assert_eq!(world.parse_count(&a), 2);
    assert_eq!(world.parse_count(&b), 2);
}

/// A header with no reflected entities still produces an artifact, so the
/// up-to-date check can skip it next run.
#[test]
fn empty_header_still_generates_artifact() {
    let mut world = ScriptedWorld::new("lenient_empty");
    let a = world.header("a.h");

    let result = run_lenient(&world, &[a.clone()], 1);

    assert!(result.completed);
    let text = std::fs::read_to_string(world.artifact_path(&a)).unwrap();
    assert!(text.starts_with("#pragma once"));
    assert!(text.contains("/* 0 reflected entities */"));
}
