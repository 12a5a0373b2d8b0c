//! Metadata-only loading of .NET assemblies.
//!
//! Everything in this module reads structural metadata (ECMA-335) from
//! mapped bytes. No contained code is ever executed or JIT-ed.
//!
//! [`LoadContext`] is the per-request owner of every opened binary: it is
//! created for one analyze call, hands out borrowed views, and releases
//! all maps when dropped — on success, not-found, and error paths alike.
//! It must not be cached across requests: compiled output on disk may
//! change between requests, and stale handles would silently serve
//! outdated metadata.

pub mod assembly;
pub mod heaps;
pub mod pe;
pub mod signature;
pub mod tables;

pub use assembly::Assembly;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{AnalyzeError, AnalyzeResult};

/// Errors raised while parsing a binary's metadata.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("truncated metadata: {what}")]
    Truncated { what: String },

    #[error("invalid metadata: {what}")]
    Invalid { what: String },

    #[error("metadata table {id:#04x} is not supported")]
    UnsupportedTable { id: u8 },

    #[error("io error: {source}")]
    Io { source: std::io::Error },
}

impl MetadataError {
    pub(crate) fn truncated(what: impl Into<String>) -> Self {
        Self::Truncated { what: what.into() }
    }

    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        Self::Invalid { what: what.into() }
    }
}

pub type MetadataResult<T> = Result<T, MetadataError>;

pub(crate) fn u16_at(data: &[u8], offset: usize) -> MetadataResult<u16> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or_else(|| MetadataError::truncated(format!("u16 at {offset:#x}")))
}

pub(crate) fn u32_at(data: &[u8], offset: usize) -> MetadataResult<u32> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| MetadataError::truncated(format!("u32 at {offset:#x}")))
}

pub(crate) fn u64_at(data: &[u8], offset: usize) -> MetadataResult<u64> {
    data.get(offset..offset + 8)
        .map(|b| u64::from_le_bytes(b.try_into().expect("slice length checked")))
        .ok_or_else(|| MetadataError::truncated(format!("u64 at {offset:#x}")))
}

/// One shared, read-only, non-executing resolution context, scoped to a
/// single analyze request.
///
/// The build unit's own output binaries are opened as top-level analysis
/// roots. Reference and core-runtime assemblies are resolvable by simple
/// name through the search path but are never enumerated as roots.
pub struct LoadContext {
    roots: Vec<Arc<Assembly>>,
    search_dirs: Vec<PathBuf>,
    resolved: HashMap<String, Option<Arc<Assembly>>>,
    diagnostics: Vec<String>,
}

impl LoadContext {
    /// Open every `*.dll` in the artifact directory as a root, in file-name
    /// order for deterministic enumeration. A root that fails to parse is
    /// skipped with a diagnostic; the directory being unreadable is fatal.
    pub fn open(
        artifact_dir: &Path,
        reference_dir: &Path,
        core_dir: Option<&Path>,
    ) -> AnalyzeResult<Self> {
        let mut dll_paths: Vec<PathBuf> = std::fs::read_dir(artifact_dir)
            .map_err(|e| AnalyzeError::io(artifact_dir, e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .map(|ext| ext.eq_ignore_ascii_case("dll"))
                    .unwrap_or(false)
            })
            .collect();
        dll_paths.sort();

        let mut roots = Vec::with_capacity(dll_paths.len());
        let mut diagnostics = Vec::new();
        for path in dll_paths {
            match Assembly::open(&path) {
                Ok(assembly) => roots.push(Arc::new(assembly)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable root binary");
                    diagnostics.push(format!("skipped unreadable binary '{}': {e}", path.display()));
                }
            }
        }
        debug!(
            roots = roots.len(),
            artifact_dir = %artifact_dir.display(),
            "metadata context opened"
        );

        let mut search_dirs = vec![artifact_dir.to_path_buf(), reference_dir.to_path_buf()];
        if let Some(core) = core_dir {
            search_dirs.push(core.to_path_buf());
        }

        Ok(Self {
            roots,
            search_dirs,
            resolved: HashMap::new(),
            diagnostics,
        })
    }

    pub fn roots(&self) -> &[Arc<Assembly>] {
        &self.roots
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Resolve an assembly by simple name through the search path, opening
    /// it at most once per request (index keyed by binary identity).
    pub fn resolve(&mut self, simple_name: &str) -> Option<Arc<Assembly>> {
        if let Some(root) = self
            .roots
            .iter()
            .find(|a| a.simple_name().eq_ignore_ascii_case(simple_name))
        {
            return Some(Arc::clone(root));
        }
        let key = simple_name.to_ascii_lowercase();
        if let Some(cached) = self.resolved.get(&key) {
            return cached.clone();
        }

        let mut found = None;
        let search_dirs = self.search_dirs.clone();
        'dirs: for dir in &search_dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.filter_map(|e| e.ok()) {
                let path = entry.path();
                let is_dll = path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("dll"))
                    .unwrap_or(false);
                let stem_matches = path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().eq_ignore_ascii_case(simple_name))
                    .unwrap_or(false);
                if is_dll && stem_matches {
                    match Assembly::open(&path) {
                        Ok(assembly) => {
                            found = Some(Arc::new(assembly));
                            break 'dirs;
                        }
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "reference assembly unreadable");
                            self.diagnostics.push(format!(
                                "unreadable reference '{}': {e}",
                                path.display()
                            ));
                        }
                    }
                }
            }
        }
        self.resolved.insert(key, found.clone());
        found
    }
}

impl Drop for LoadContext {
    fn drop(&mut self) {
        // Maps are released with the context; nothing outlives the request.
        debug!(roots = self.roots.len(), "metadata context released");
    }
}
