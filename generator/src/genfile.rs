// genfile.rs — Generated artifact writer
//
// File-level operations on the per-source generated header: append `#define`
// lines during pre-parse rounds, truncate before generation, and buffered
// line writing for the code generation unit. Also owns the source
// fingerprint format used by the up-to-date check: a SHA-256 over the source
// text and its directly included sibling headers, recorded as a comment line
// in the artifact.
//
// Failure modes: all operations surface `std::io::Error`; the caller decides
// whether an IO failure is fatal for the file.

use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Comment prefix of the fingerprint line inside a generated artifact.
const FINGERPRINT_PREFIX: &str = "// refgen-fingerprint: ";

// ── Macro define maintenance ────────────────────────────────────────────────

/// Append one `#define <name> ` line per macro name, in set order.
/// Duplicate names across rounds are harmless: they produce identical
/// empty-valued defines.
pub fn append_defines(path: &Path, macro_names: &BTreeSet<String>) -> io::Result<()> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    for name in macro_names {
        writeln!(writer, "#define {name} ")?;
    }
    writer.flush()
}

/// Truncate the artifact to zero bytes.
pub fn truncate(path: &Path) -> io::Result<()> {
    File::create(path).map(|_| ())
}

// ── Buffered artifact writer ────────────────────────────────────────────────

/// Line-oriented writer over one generated file. Creating it truncates the
/// target; dropping it flushes.
pub struct GeneratedFile {
    path: PathBuf,
    source_file: PathBuf,
    writer: BufWriter<File>,
}

impl GeneratedFile {
    pub fn create(path: &Path, source_file: &Path) -> io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            source_file: source_file.to_path_buf(),
            writer: BufWriter::new(File::create(path)?),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.writer, "{line}")
    }

    pub fn write_lines<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) -> io::Result<()> {
        for line in lines {
            self.write_line(line)?;
        }
        Ok(())
    }

    /// Record the source fingerprint so the next run can detect staleness.
    pub fn write_fingerprint(&mut self, fingerprint: &str) -> io::Result<()> {
        writeln!(self.writer, "{FINGERPRINT_PREFIX}{fingerprint}")
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

// ── Source fingerprints ─────────────────────────────────────────────────────

/// SHA-256 hex digest over the source text and the content of every sibling
/// header it directly includes with `#include "..."`. This is the recorded
/// dependency set of the up-to-date check: a change in any direct include
/// re-admits the file even when its own timestamp is unchanged.
pub fn source_fingerprint(source_file: &Path) -> io::Result<String> {
    let text = std::fs::read_to_string(source_file)?;
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());

    let base = source_file.parent().unwrap_or_else(|| Path::new("."));
    for include in direct_includes(&text) {
        let path = base.join(&include);
        if let Ok(dep_text) = std::fs::read_to_string(&path) {
            hasher.update(include.as_bytes());
            hasher.update(dep_text.as_bytes());
        }
    }

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(hex, "{byte:02x}");
    }
    Ok(hex)
}

/// Quoted include targets of a source text, in order of appearance.
fn direct_includes(text: &str) -> Vec<String> {
    let mut includes = Vec::new();
    for line in text.lines() {
        let line = line.trim_start();
        let Some(rest) = line.strip_prefix("#include") else {
            continue;
        };
        let rest = rest.trim_start();
        if let Some(stripped) = rest.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                includes.push(stripped[..end].to_string());
            }
        }
        // Angle-bracket includes resolve against system paths the generator
        // does not track; they stay out of the fingerprint.
    }
    includes
}

/// Read back the fingerprint recorded in an artifact, if any.
pub fn recorded_fingerprint(artifact: &Path) -> Option<String> {
    let file = File::open(artifact).ok()?;
    for line in BufReader::new(file).lines() {
        let line = line.ok()?;
        if let Some(fingerprint) = line.strip_prefix(FINGERPRINT_PREFIX) {
            return Some(fingerprint.trim().to_string());
        }
    }
    None
}

// ── Tests ───────────────────────────────────────────────────────────────────
