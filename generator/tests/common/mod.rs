// Shared scripted translation-unit backend for the integration tests.
//
// The backend models the dynamics the real driver faces with libclang: the
// diagnostics a header produces depend on which generated macros are
// currently #defined in the artifacts on disk. Each scripted header lists
// macro requirements; a requirement that is not yet satisfied produces an
// `unknown type name 'X'` diagnostic, optionally masked until another macro
// is defined (clang surfaces include chains one layer per round) and
// optionally accompanied by a cascading genuine error.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use refgen::settings::MacroCodeGenUnitSettings;
use refgen::tu::{
    Cursor, CursorKind, Severity, SourceLocation, TranslationUnit, TuBackend, TuDiagnostic,
    TuError, TuIndex,
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Fresh scratch directory with `src/` and `generated/` subdirectories.
pub fn scratch_world(tag: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!(
        "refgen_it_{}_{}_{}",
        tag,
        std::process::id(),
        n
    ));
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::create_dir_all(dir.join("generated")).unwrap();
    dir
}

/// One generated-macro requirement of a scripted header.
#[derive(Clone)]
pub struct MacroRequirement {
    pub name: String,
    /// The diagnostic only appears once this other macro is defined.
    pub masked_until: Option<String>,
    /// Genuine diagnostic emitted alongside while the macro is missing.
    pub cascade: Option<String>,
}

#[derive(Clone)]
pub struct HeaderScript {
    pub path: PathBuf,
    pub requirements: Vec<MacroRequirement>,
    pub genuine_errors: Vec<String>,
    /// Other scripted headers whose artifacts this header's unit can see.
    pub includes: Vec<PathBuf>,
    pub root_children: Vec<Cursor>,
}

pub struct ScriptedWorld {
    pub dir: PathBuf,
    pub unit_settings: MacroCodeGenUnitSettings,
    scripts: HashMap<PathBuf, HeaderScript>,
    parse_counts: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl ScriptedWorld {
    pub fn new(tag: &str) -> Self {
        let dir = scratch_world(tag);
        let unit_settings = MacroCodeGenUnitSettings {
            output_directory: dir.join("generated"),
            ..Default::default()
        };
        Self {
            dir,
            unit_settings,
            scripts: HashMap::new(),
            parse_counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Create `src/<name>` on disk and register an empty script for it.
    pub fn header(&mut self, name: &str) -> PathBuf {
        let path = self.dir.join("src").join(name);
        std::fs::write(&path, format!("// scripted header {name}\n")).unwrap();
        let canonical = path.canonicalize().unwrap();
        self.scripts.insert(
            canonical.clone(),
            HeaderScript {
                path: canonical.clone(),
                requirements: Vec::new(),
                genuine_errors: Vec::new(),
                includes: Vec::new(),
                root_children: Vec::new(),
            },
        );
        canonical
    }

    fn script_mut(&mut self, file: &Path) -> &mut HeaderScript {
        self.scripts.get_mut(file).expect("unscripted header")
    }

    pub fn requires(&mut self, file: &Path, macro_name: &str) {
        self.script_mut(file).requirements.push(MacroRequirement {
            name: macro_name.to_string(),
            masked_until: None,
            cascade: None,
        });
    }

    pub fn requires_masked(&mut self, file: &Path, macro_name: &str, until: &str, cascade: &str) {
        self.script_mut(file).requirements.push(MacroRequirement {
            name: macro_name.to_string(),
            masked_until: Some(until.to_string()),
            cascade: Some(cascade.to_string()),
        });
    }

    pub fn genuine_error(&mut self, file: &Path, message: &str) {
        self.script_mut(file)
            .genuine_errors
            .push(message.to_string());
    }

    pub fn includes(&mut self, file: &Path, other: &Path) {
        let other = other.to_path_buf();
        self.script_mut(file).includes.push(other);
    }

    /// Attach an annotated class to the header's cursor tree.
    pub fn annotated_class(&mut self, file: &Path, class_name: &str) {
        let location = SourceLocation::new(file, 1, 1);
        let mut class = Cursor::new(CursorKind::ClassDecl, class_name, location.clone());
        class.children.push(Cursor::new(
            CursorKind::AnnotateAttr,
            "Class:Serializable",
            location,
        ));
        self.script_mut(file).root_children.push(class);
    }

    /// The per-file footer macro the driver derives for `file`.
    pub fn file_footer_macro(&self, file: &Path) -> String {
        self.unit_settings.header_file_footer_macro(file).unwrap()
    }

    pub fn artifact_path(&self, file: &Path) -> PathBuf {
        self.unit_settings.generated_header_path(file).unwrap()
    }

    pub fn parse_count(&self, file: &Path) -> usize {
        *self.parse_counts.lock().get(file).unwrap_or(&0)
    }

    pub fn backend(&self) -> ScriptedBackend {
        ScriptedBackend {
            unit_settings: self.unit_settings.clone(),
            scripts: Arc::new(self.scripts.clone()),
            parse_counts: self.parse_counts.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ScriptedBackend {
    unit_settings: MacroCodeGenUnitSettings,
    scripts: Arc<HashMap<PathBuf, HeaderScript>>,
    parse_counts: Arc<Mutex<HashMap<PathBuf, usize>>>,
}

impl TuBackend for ScriptedBackend {
    fn create_index(&self) -> Box<dyn TuIndex> {
        Box::new(ScriptedIndex {
            backend: self.clone(),
        })
    }
}

pub struct ScriptedIndex {
    backend: ScriptedBackend,
}

impl ScriptedIndex {
    /// Every macro currently #defined in the artifacts visible to `script`:
    /// its own generated header plus those of its includes, transitively.
    fn defined_macros(&self, script: &HeaderScript) -> BTreeSet<String> {
        let mut defined = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut queue = vec![script.path.clone()];
        while let Some(path) = queue.pop() {
            if !visited.insert(path.clone()) {
                continue;
            }
            if let Some(artifact) = self.backend.unit_settings.generated_header_path(&path) {
                if let Ok(text) = std::fs::read_to_string(&artifact) {
                    for line in text.lines() {
                        if let Some(rest) = line.trim_start().strip_prefix("#define ") {
                            if let Some(name) = rest.split_whitespace().next() {
                                defined.insert(name.to_string());
                            }
                        }
                    }
                }
            }
            if let Some(included) = self.backend.scripts.get(&path) {
                queue.extend(included.includes.iter().cloned());
            }
        }
        defined
    }
}

impl TuIndex for ScriptedIndex {
    fn parse_translation_unit(
        &mut self,
        file: &Path,
        _args: &[String],
    ) -> Result<TranslationUnit, TuError> {
        let canonical = file.canonicalize().unwrap_or_else(|_| file.to_path_buf());
        let script = self
            .backend
            .scripts
            .get(&canonical)
            .ok_or_else(|| TuError {
                file: file.to_path_buf(),
                reason: "unscripted header".to_string(),
            })?;

        *self
            .backend
            .parse_counts
            .lock()
            .entry(canonical.clone())
            .or_insert(0) += 1;

        let defined = self.defined_macros(script);
        let mut diagnostics = Vec::new();
        let mut line = 10u32;

        for requirement in &script.requirements {
            if defined.contains(&requirement.name) {
                continue;
            }
            if let Some(until) = &requirement.masked_until {
                if !defined.contains(until) {
                    continue;
                }
            }
            diagnostics.push(TuDiagnostic {
                severity: Severity::Error,
                spelling: format!("unknown type name '{}'", requirement.name),
                location: SourceLocation::new(&canonical, line, 1),
            });
            if let Some(cascade) = &requirement.cascade {
                diagnostics.push(TuDiagnostic {
                    severity: Severity::Error,
                    spelling: cascade.clone(),
                    location: SourceLocation::new(&canonical, line + 1, 1),
                });
            }
            line += 10;
        }
        for message in &script.genuine_errors {
            diagnostics.push(TuDiagnostic {
                severity: Severity::Error,
                spelling: message.clone(),
                location: SourceLocation::new(&canonical, line, 1),
            });
            line += 10;
        }

        let mut root = Cursor::new(
            CursorKind::Other,
            "",
            SourceLocation::new(&canonical, 0, 0),
        );
        root.children = script.root_children.clone();

        Ok(TranslationUnit { root, diagnostics })
    }
}
