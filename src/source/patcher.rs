//! Source patch application.
//!
//! The only patch the pipeline needs is a single declaration that has to head
//! one file of the fetched tree. The patch is idempotent: a file whose first
//! line already is the declaration is left untouched (no write at all, so its
//! mtime does not change).
//!
//! The declaration is a toolchain-compatibility shim. A [`ToolchainGate`]
//! restricts it to compilers up to a given major version.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::PatchError;
use crate::models::{PatchOutcome, PatchSpec, ToolchainGate};

// Pre-compiled once; matches the first "major.minor" in `--version` output
static COMPILER_VERSION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\.(\d+)").expect("Invalid compiler version regex"));

/// Result type for patching operations
pub type PatchResult<T> = std::result::Result<T, PatchError>;

/// First line of `content` without its terminator, and whether it ended in CRLF.
fn first_line(content: &[u8]) -> (&[u8], bool) {
    match content.iter().position(|&b| b == b'\n') {
        Some(end) => match content[..end].strip_suffix(b"\r") {
            Some(line) => (line, true),
            None => (&content[..end], false),
        },
        None => (content, false),
    }
}

/// Whether the first line of `content` is exactly `declaration`.
///
/// Works on raw bytes; source files are not required to be UTF-8. A trailing
/// `\r` on the first line is ignored so CRLF files match.
pub fn has_declaration(content: &[u8], declaration: &str) -> bool {
    first_line(content).0 == declaration.as_bytes()
}

/// Return the patched content, or `None` if the declaration is already there.
///
/// The declaration is followed by a blank line, using the file's own line
/// ending style.
pub fn prepend_declaration(content: &[u8], declaration: &str) -> Option<Vec<u8>> {
    let (line, crlf) = first_line(content);
    if line == declaration.as_bytes() {
        return None;
    }
    let newline: &[u8] = if crlf { b"\r\n" } else { b"\n" };
    let mut patched = Vec::with_capacity(declaration.len() + 2 * newline.len() + content.len());
    patched.extend_from_slice(declaration.as_bytes());
    patched.extend_from_slice(newline);
    patched.extend_from_slice(newline);
    patched.extend_from_slice(content);
    Some(patched)
}

/// Extract the major version from compiler `--version` output.
pub fn parse_compiler_major(version_output: &str) -> Option<u32> {
    COMPILER_VERSION_REGEX
        .captures(version_output)
        .and_then(|caps| caps[1].parse().ok())
}

/// Probe `<compiler> --version` and return its major version.
pub fn probe_compiler_major(compiler: &str) -> Option<u32> {
    let output = Command::new(compiler).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    parse_compiler_major(&stdout).or_else(|| parse_compiler_major(&stderr))
}

/// Decide whether the gated patch applies for a probed major version.
///
/// An unknown version applies the patch; the shim is harmless on toolchains
/// that do not need it.
pub fn gate_allows(gate: &ToolchainGate, probed_major: Option<u32>) -> bool {
    match probed_major {
        Some(major) => major <= gate.max_major,
        None => true,
    }
}

/// Applies the declaration patch inside one source tree.
pub struct SourcePatcher {
    /// Root of the fetched source tree
    src_dir: PathBuf,
}

impl SourcePatcher {
    pub fn new(src_dir: PathBuf) -> Self {
        SourcePatcher { src_dir }
    }

    /// Apply `spec` to its target file, honouring the toolchain gate.
    pub fn apply(&self, spec: &PatchSpec) -> PatchResult<PatchOutcome> {
        if let Some(gate) = &spec.gate {
            let major = probe_compiler_major(&gate.compiler);
            match major {
                Some(m) => log::info!(
                    "[Patcher] [GATE] {} major version {} (shim applies up to {})",
                    gate.compiler,
                    m,
                    gate.max_major
                ),
                None => log::warn!(
                    "[Patcher] [GATE] Could not probe {} --version, applying shim",
                    gate.compiler
                ),
            }
            if !gate_allows(gate, major) {
                log::info!("[Patcher] [GATE] Toolchain does not need the shim, skipping");
                return Ok(PatchOutcome::SkippedByGate);
            }
        }

        self.apply_declaration(&spec.target, &spec.declaration)
    }

    /// Prepend `declaration` to `target` (relative to the source tree) unless
    /// it already heads the file.
    pub fn apply_declaration(&self, target: &Path, declaration: &str) -> PatchResult<PatchOutcome> {
        if declaration.is_empty() || declaration.contains('\n') {
            return Err(PatchError::InvalidDeclaration(format!("{:?}", declaration)));
        }

        let path = self.src_dir.join(target);
        if !path.is_file() {
            return Err(PatchError::FileNotFound(path.display().to_string()));
        }

        let content = fs::read(&path)
            .map_err(|e| PatchError::ReadFailed(format!("{}: {}", path.display(), e)))?;

        match prepend_declaration(&content, declaration) {
            None => {
                log::info!(
                    "[Patcher] Declaration already present in {}, leaving file untouched",
                    path.display()
                );
                Ok(PatchOutcome::AlreadyPresent)
            }
            Some(patched) => {
                write_preserving_permissions(&path, &patched)?;
                log::info!("[Patcher] Prepended {:?} to {}", declaration, path.display());
                Ok(PatchOutcome::Applied)
            }
        }
    }
}

/// Replace `path` atomically with `content`, keeping its permission bits.
fn write_preserving_permissions(path: &Path, content: &[u8]) -> PatchResult<()> {
    let write_err = |e: std::io::Error| PatchError::WriteFailed(format!("{}: {}", path.display(), e));

    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let permissions = fs::metadata(path).map_err(write_err)?.permissions();

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(content).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    fs::set_permissions(tmp.path(), permissions).map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
