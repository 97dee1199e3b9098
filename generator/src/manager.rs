// manager.rs — Code generation manager: the multi-pass driver
//
// Orchestrates the full pipeline over N files: identify stale files, emit
// the shared entity-macros file, then run one of two engines. The strict
// engine iterates pre-parse / define / parse / truncate / generate phases to
// a fixed point over the retry set; the lenient engine runs a fixed number
// of unconditional parse+generate passes. Phases are separated only by
// `join_workers` barriers; `set_is_running(false)` merely batches
// submissions.
//
// Preconditions: the code generation unit's output directory is creatable.
// Postconditions: every processed file has a generated artifact, or an entry
//   in the result's error list.
// Failure modes: translation-unit errors drive the retry set; IO and
//   configuration errors fail a file with no retry.
// Side effects: writes artifacts under the output directory; logs one line
//   per failed file.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::diag::ParsingError;
use crate::entity::{EntityKind, FileParsingResult};
use crate::genfile::{self, recorded_fingerprint, source_fingerprint, GeneratedFile};
use crate::parser::FileParser;
use crate::pool::ThreadPool;
use crate::settings::{
    split_macro_pattern, CodeGenManagerSettings, MacroCodeGenUnitSettings, ParsingSettings,
    PARSING_DEFINE,
};
use crate::task::{Task, TaskPayload};
use crate::unit::CodeGenUnit;

// ── Result type ─────────────────────────────────────────────────────────────

/// Outcome of one generation run (or of one generation task, merged in).
#[derive(Debug, Clone, Default)]
pub struct CodeGenResult {
    pub completed: bool,
    pub parsed_files: Vec<PathBuf>,
    pub up_to_date_files: Vec<PathBuf>,
    pub duration: Duration,
    pub errors: Vec<(PathBuf, ParsingError)>,
}

impl CodeGenResult {
    /// Fold another result in: completion ANDs, lists concatenate.
    pub fn merge(&mut self, other: CodeGenResult) {
        self.completed &= other.completed;
        self.parsed_files.extend(other.parsed_files);
        self.up_to_date_files.extend(other.up_to_date_files);
        self.errors.extend(other.errors);
    }
}

// ── Manager ─────────────────────────────────────────────────────────────────

pub struct CodeGenManager {
    pub settings: CodeGenManagerSettings,
    thread_pool: ThreadPool,
}

impl CodeGenManager {
    pub fn new(settings: CodeGenManagerSettings, worker_count: usize) -> Self {
        Self {
            settings,
            thread_pool: ThreadPool::new(worker_count),
        }
    }

    pub fn with_default_workers(settings: CodeGenManagerSettings) -> Self {
        Self {
            settings,
            thread_pool: ThreadPool::with_default_workers(),
        }
    }

    /// Run the full pipeline. The `CodeGenUnit: Clone + Send + 'static`
    /// bounds are the validity check: a fresh parser and unit copy is taken
    /// per task, so both must be cloneable.
    pub fn run<U: CodeGenUnit>(
        &self,
        file_parser: &FileParser,
        code_gen_unit: &U,
        force_regenerate_all: bool,
    ) -> CodeGenResult {
        let mut gen_result = CodeGenResult {
            completed: true,
            ..Default::default()
        };

        if !self.check_generation_setup(code_gen_unit) {
            gen_result.completed = false;
            return gen_result;
        }

        let start = Instant::now();
        let to_process =
            self.identify_files_to_process(code_gen_unit, &mut gen_result, force_regenerate_all);

        if !to_process.is_empty() {
            file_parser.settings().init();

            match self.generate_macros_file(file_parser.settings(), code_gen_unit.settings()) {
                Ok(()) => {
                    self.process_files(file_parser, code_gen_unit, &to_process, &mut gen_result)
                }
                Err(error) => {
                    tracing::error!(%error, "failed to write the entity macros file");
                    gen_result.completed = false;
                }
            }
        }

        gen_result.duration = start.elapsed();
        gen_result
    }

    // ── Setup and file identification ──────────────────────────────────────

    fn check_generation_setup<U: CodeGenUnit>(&self, code_gen_unit: &U) -> bool {
        let settings = code_gen_unit.settings();

        if settings.output_directory.as_os_str().is_empty() {
            tracing::error!("output directory is empty, it must be specified");
            return false;
        }
        if let Err(error) = std::fs::create_dir_all(&settings.output_directory) {
            tracing::error!(
                directory = %settings.output_directory.display(),
                %error,
                "output directory is invalid"
            );
            return false;
        }
        if split_macro_pattern(&settings.generated_header_file_name_pattern).is_none() {
            tracing::error!(
                pattern = %settings.generated_header_file_name_pattern,
                "generated header file name pattern has no placeholder"
            );
            return false;
        }
        if split_macro_pattern(&settings.header_file_footer_macro_pattern).is_none() {
            tracing::error!(
                pattern = %settings.header_file_footer_macro_pattern,
                "header file footer macro pattern has no placeholder"
            );
            return false;
        }
        // The class footer pattern is deliberately not validated here: its
        // split failure is a per-file error surfaced by the parsing driver.
        true
    }

    /// Compare every candidate source against its artifact and return the
    /// stale ones. Up-to-date files are recorded in the result and skipped.
    fn identify_files_to_process<U: CodeGenUnit>(
        &self,
        code_gen_unit: &U,
        gen_result: &mut CodeGenResult,
        force_regenerate_all: bool,
    ) -> BTreeSet<PathBuf> {
        let unit_settings = code_gen_unit.settings();
        let mut files = BTreeSet::new();

        for file in &self.settings.to_process_files {
            if !file.is_file() || self.settings.ignored_files.contains(file) {
                continue;
            }
            self.consider(file, unit_settings, force_regenerate_all, &mut files, gen_result);
        }
        for directory in &self.settings.to_process_directories {
            self.scan_directory(
                directory,
                unit_settings,
                force_regenerate_all,
                &mut files,
                gen_result,
            );
        }

        files
    }

    fn scan_directory(
        &self,
        directory: &Path,
        unit_settings: &MacroCodeGenUnitSettings,
        force_regenerate_all: bool,
        files: &mut BTreeSet<PathBuf>,
        gen_result: &mut CodeGenResult,
    ) {
        if self.settings.ignored_directories.contains(directory) {
            return;
        }
        let Ok(entries) = std::fs::read_dir(directory) else {
            tracing::warn!(directory = %directory.display(), "cannot read directory");
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                self.scan_directory(&path, unit_settings, force_regenerate_all, files, gen_result);
            } else if path.is_file()
                && !self.settings.ignored_files.contains(&path)
                && self.has_supported_extension(&path)
            {
                self.consider(&path, unit_settings, force_regenerate_all, files, gen_result);
            }
        }
    }

    fn has_supported_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                self.settings
                    .supported_extensions
                    .contains(&ext.to_string_lossy().to_string())
            })
            .unwrap_or(false)
    }

    fn consider(
        &self,
        file: &Path,
        unit_settings: &MacroCodeGenUnitSettings,
        force_regenerate_all: bool,
        files: &mut BTreeSet<PathBuf>,
        gen_result: &mut CodeGenResult,
    ) {
        if force_regenerate_all || is_stale(file, unit_settings) {
            files.insert(file.to_path_buf());
        } else {
            gen_result.up_to_date_files.push(file.to_path_buf());
        }
    }

    /// Emit the shared entity-macros file: every annotation macro defined
    /// empty so reflected headers compile outside the generator's pass.
    fn generate_macros_file(
        &self,
        parsing_settings: &ParsingSettings,
        unit_settings: &MacroCodeGenUnitSettings,
    ) -> std::io::Result<()> {
        let path = unit_settings.entity_macros_path();
        let mut file = GeneratedFile::create(&path, &path)?;

        file.write_lines(["#pragma once", ""])?;
        file.write_line(&format!("#ifndef {PARSING_DEFINE}"))?;
        for kind in EntityKind::ALL {
            file.write_line(&format!(
                "\t#define {}(...) ",
                parsing_settings.annotation_macro(kind)
            ))?;
        }
        file.write_line("#endif")?;
        file.flush()
    }

    // ── Engine dispatch ────────────────────────────────────────────────────

    fn process_files<U: CodeGenUnit>(
        &self,
        file_parser: &FileParser,
        code_gen_unit: &U,
        to_process: &BTreeSet<PathBuf>,
        gen_result: &mut CodeGenResult,
    ) {
        if file_parser.settings().fail_on_tu_errors {
            self.process_files_fail_on_errors(file_parser, code_gen_unit, to_process, gen_result);
        } else {
            self.process_files_ignore_errors(file_parser, code_gen_unit, to_process, gen_result);
        }
    }

    // ── Lenient engine ─────────────────────────────────────────────────────

    /// Fixed-iteration fan-out: every file is parsed and regenerated
    /// `iteration_count` times unconditionally, diagnostics discarded. The
    /// barrier between passes is the per-iteration `join_workers`.
    fn process_files_ignore_errors<U: CodeGenUnit>(
        &self,
        file_parser: &FileParser,
        code_gen_unit: &U,
        to_process: &BTreeSet<PathBuf>,
        gen_result: &mut CodeGenResult,
    ) {
        let iteration_count = code_gen_unit.iteration_count().max(1);
        let mut generation_tasks =
            Vec::with_capacity(to_process.len() * iteration_count as usize);

        for iteration in 0..iteration_count {
            self.thread_pool.set_is_running(false);

            for file in to_process {
                gen_result.parsed_files.push(file.clone());

                let parser = file_parser.clone();
                let parse_file = file.clone();
                let parsing_task = self.thread_pool.submit_task(
                    format!("Parsing {} (pass {iteration})", file.display()),
                    move |_| {
                        let mut parser = parser;
                        Box::new(parser.parse_ignore_errors(&parse_file)) as TaskPayload
                    },
                );

                let mut unit_copy = code_gen_unit.clone();
                generation_tasks.push(self.thread_pool.submit_task_with_deps(
                    format!("Generation {} (pass {iteration})", file.display()),
                    move |task| {
                        let parsing_result: FileParsingResult = task.dependency_result(0);
                        let mut generation_result = CodeGenResult::default();
                        if parsing_result.errors.is_empty() {
                            generation_result.completed =
                                unit_copy.generate_code(&parsing_result);
                        }
                        Box::new(generation_result) as TaskPayload
                    },
                    vec![parsing_task],
                ));
            }

            // An iteration depends on the previous one having fully finished.
            self.thread_pool.set_is_running(true);
            self.thread_pool.join_workers();
        }

        for task in &generation_tasks {
            gen_result.merge(task.await_result::<CodeGenResult>());
        }
    }

    // ── Strict engine ──────────────────────────────────────────────────────

    /// Fixed-point iteration over the retry set. Files that failed parsing
    /// are re-admitted to the next iteration; the loop stops once the retry
    /// set is empty or its cardinality stalls across two iterations.
    ///
    /// Rationale: the translation-unit parser cannot resolve identifiers
    /// that generated macros introduce until those macros exist, but the
    /// macros to define are discovered by parsing. The pre-parse step acts
    /// as an oracle for the currently missing layer; include chains can
    /// cascade the discovery over several rounds.
    fn process_files_fail_on_errors<U: CodeGenUnit>(
        &self,
        file_parser: &FileParser,
        code_gen_unit: &U,
        to_process: &BTreeSet<PathBuf>,
        gen_result: &mut CodeGenResult,
    ) {
        let unit_settings = Arc::new(code_gen_unit.settings().clone());

        // Shared across parse task bodies; mutex-guarded, writes bounded by
        // the number of failing files per iteration.
        let files_left: Arc<Mutex<BTreeSet<PathBuf>>> =
            Arc::new(Mutex::new(to_process.clone()));
        let failed_files: Arc<Mutex<Vec<(PathBuf, ParsingError)>>> =
            Arc::new(Mutex::new(Vec::new()));

        // Files hit by an IO or configuration failure: reported, never
        // re-admitted.
        let mut fatal_files: BTreeSet<PathBuf> = BTreeSet::new();
        let mut fatal_errors: Vec<(PathBuf, ParsingError)> = Vec::new();

        let mut generation_tasks: Vec<Arc<Task>> = Vec::new();
        let mut previous_remaining = 0usize;

        loop {
            let batch: Vec<PathBuf> = {
                let mut left = files_left.lock();
                std::mem::take(&mut *left).into_iter().collect()
            };
            // Only the last iteration's parse failures are reported: a file
            // that keeps failing fails in the final round too, with its most
            // recent errors.
            failed_files.lock().clear();

            // Phase 1: pre-parse every file of the batch, collecting the
            // generated macros each one is missing.
            self.thread_pool.set_is_running(false);
            let mut pre_parsing_tasks = Vec::with_capacity(batch.len());
            for file in &batch {
                let parser = file_parser.clone();
                let parse_file = file.clone();
                let unit_settings = unit_settings.clone();
                pre_parsing_tasks.push(self.thread_pool.submit_task(
                    format!("Pre-parsing {}", file.display()),
                    move |_| {
                        let mut parser = parser;
                        Box::new(parser.prepare_for_parsing(&parse_file, &unit_settings))
                            as TaskPayload
                    },
                ));
            }
            self.thread_pool.set_is_running(true);
            self.thread_pool.join_workers();
            self.thread_pool.set_is_running(false);

            // Phase 2: append the missing defines so the real parse sees
            // them. Without this, a child class whose parent's macros are
            // not yet generated would fail with an error.
            for (file, task) in batch.iter().zip(&pre_parsing_tasks) {
                let macros: BTreeSet<String> = task.await_result();
                if macros.is_empty() {
                    continue;
                }
                let Some(artifact) = unit_settings.generated_header_path(file) else {
                    continue;
                };
                if let Err(error) = genfile::append_defines(&artifact, &macros) {
                    fatal_errors.push((
                        file.clone(),
                        ParsingError::message(format!(
                            "Failed to populate the generated file {} with macros: {error}",
                            artifact.display()
                        )),
                    ));
                    fatal_files.insert(file.clone());
                }
            }

            // Phase 3: parse. Failures are recorded and re-queued for the
            // next iteration; their errors are cleared from the returned
            // result so the result stays mergeable.
            let mut parsing_tasks = Vec::with_capacity(batch.len());
            for file in &batch {
                gen_result.parsed_files.push(file.clone());

                let parser = file_parser.clone();
                let parse_file = file.clone();
                let unit_settings = unit_settings.clone();
                let files_left = files_left.clone();
                let failed_files = failed_files.clone();
                parsing_tasks.push(self.thread_pool.submit_task(
                    format!("Parsing {}", file.display()),
                    move |_| {
                        let mut parser = parser;
                        let mut parsing_result =
                            parser.parse_fail_on_errors(&parse_file, &unit_settings);
                        if !parsing_result.errors.is_empty() {
                            let mut failed = failed_files.lock();
                            for error in parsing_result.errors.drain(..) {
                                failed.push((parse_file.clone(), error));
                            }
                            files_left.lock().insert(parse_file.clone());
                        }
                        Box::new(parsing_result) as TaskPayload
                    },
                ));
            }
            // All parse tasks must finish before any artifact is truncated:
            // the defines they rely on live in the artifacts.
            self.thread_pool.set_is_running(true);
            self.thread_pool.join_workers();
            self.thread_pool.set_is_running(false);

            // Phase 4: truncate and regenerate the artifacts of every file
            // that parsed cleanly. Each generation task depends on its
            // file's parse task.
            for (index, file) in batch.iter().enumerate() {
                if files_left.lock().contains(file) || fatal_files.contains(file) {
                    continue;
                }
                let Some(artifact) = unit_settings.generated_header_path(file) else {
                    continue;
                };
                if let Err(error) = genfile::truncate(&artifact) {
                    fatal_errors.push((
                        file.clone(),
                        ParsingError::message(format!(
                            "Failed to truncate {}: {error}",
                            artifact.display()
                        )),
                    ));
                    fatal_files.insert(file.clone());
                    continue;
                }

                let mut unit_copy = code_gen_unit.clone();
                generation_tasks.push(self.thread_pool.submit_task_with_deps(
                    format!("Generation {}", file.display()),
                    move |task| {
                        let parsing_result: FileParsingResult = task.dependency_result(0);
                        let mut generation_result = CodeGenResult::default();
                        if parsing_result.errors.is_empty() {
                            generation_result.completed =
                                unit_copy.generate_code(&parsing_result);
                        }
                        Box::new(generation_result) as TaskPayload
                    },
                    vec![parsing_tasks[index].clone()],
                ));
            }
            self.thread_pool.set_is_running(true);
            self.thread_pool.join_workers();

            // Fixed-point bookkeeping: fatally failed files never re-enter.
            let remaining = {
                let mut left = files_left.lock();
                left.retain(|file| !fatal_files.contains(file));
                left.len()
            };
            if remaining == 0 {
                break;
            }
            if remaining == previous_remaining {
                tracing::warn!(remaining, "no progress across iterations, stopping");
                break;
            }
            previous_remaining = remaining;
        }

        let mut failed = std::mem::take(&mut *failed_files.lock());
        failed.extend(fatal_errors);
        if !failed.is_empty() {
            gen_result.completed = false;
        }
        for (file, error) in &failed {
            tracing::error!(
                "While processing the following file: {}: {}",
                file.display(),
                error
            );
        }
        gen_result.errors.extend(failed);

        for task in &generation_tasks {
            gen_result.merge(task.await_result::<CodeGenResult>());
        }
    }
}

// ── Staleness check ─────────────────────────────────────────────────────────

/// A file is stale when its artifact is missing, older than the source, or
/// records a different source fingerprint (the source text plus its direct
/// includes).
fn is_stale(file: &Path, unit_settings: &MacroCodeGenUnitSettings) -> bool {
    let Some(artifact) = unit_settings.generated_header_path(file) else {
        return true;
    };
    if !artifact.is_file() {
        return true;
    }

    let newer_than_artifact = match (file.metadata(), artifact.metadata()) {
        (Ok(source_meta), Ok(artifact_meta)) => {
            match (source_meta.modified(), artifact_meta.modified()) {
                (Ok(source_time), Ok(artifact_time)) => source_time > artifact_time,
                _ => true,
            }
        }
        _ => true,
    };
    if newer_than_artifact {
        return true;
    }

    match (recorded_fingerprint(&artifact), source_fingerprint(file)) {
        (Some(recorded), Ok(current)) => recorded != current,
        // No recorded fingerprint: the artifact never completed generation.
        (None, _) => true,
        (_, Err(_)) => true,
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
