//! Build-descriptor location and manifest parsing.
//!
//! Ascends parent directories from the source file until a `*.csproj` is
//! found, then reads the declared target framework list out of it.

use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::events::Event;
use tracing::debug;

use crate::error::{AnalyzeError, AnalyzeResult, Resource};

/// A located build-unit manifest with its declared target frameworks.
#[derive(Debug, Clone)]
pub struct BuildDescriptor {
    pub manifest_path: PathBuf,
    /// Ordered as declared; `<TargetFrameworks>` entries split on `;`.
    pub target_frameworks: Vec<String>,
    /// The containing directory, implicit source-tree root.
    pub root_dir: PathBuf,
}

impl BuildDescriptor {
    /// The declared target version used for reference-set resolution:
    /// the first entry when multiple are declared.
    pub fn declared_target(&self) -> &str {
        &self.target_frameworks[0]
    }
}

/// Ascend from the source file's directory to the owning `*.csproj`.
pub fn locate(source_file: &Path) -> AnalyzeResult<BuildDescriptor> {
    let mut dir = source_file.parent();
    while let Some(current) = dir {
        if let Some(manifest) = find_manifest(current)? {
            debug!(manifest = %manifest.display(), "located build descriptor");
            let target_frameworks = parse_manifest(&manifest)?;
            return Ok(BuildDescriptor {
                root_dir: current.to_path_buf(),
                manifest_path: manifest,
                target_frameworks,
            });
        }
        dir = current.parent();
    }
    Err(AnalyzeError::not_found(
        Resource::BuildDescriptor,
        format!(
            "no .csproj in any directory above '{}'",
            source_file.display()
        ),
    ))
}

/// First `*.csproj` in a directory, in file-name order for determinism.
fn find_manifest(dir: &Path) -> AnalyzeResult<Option<PathBuf>> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        // Unreadable ancestors are skipped; the walk continues upward.
        return Ok(None);
    };
    let mut manifests: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.eq_ignore_ascii_case("csproj"))
                .unwrap_or(false)
        })
        .collect();
    manifests.sort();
    Ok(manifests.into_iter().next())
}

/// Read `<TargetFramework>` / `<TargetFrameworks>` out of a project file.
///
/// A manifest that declares no target framework is invalid input: the
/// reference set cannot be chosen without one.
pub fn parse_manifest(path: &Path) -> AnalyzeResult<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| AnalyzeError::io(path, e))?;

    let mut reader = Reader::from_str(&content);
    let mut in_target_element = false;
    let mut frameworks: Vec<String> = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                in_target_element =
                    name.as_ref() == b"TargetFramework" || name.as_ref() == b"TargetFrameworks";
            }
            Ok(Event::Text(t)) if in_target_element => {
                let text = String::from_utf8_lossy(t.as_ref()).into_owned();
                frameworks.extend(
                    text.split(';')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string),
                );
            }
            Ok(Event::End(_)) => in_target_element = false,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(AnalyzeError::configuration(format!(
                    "project file '{}' is not valid XML: {e}",
                    path.display()
                )));
            }
            _ => {}
        }
    }

    if frameworks.is_empty() {
        return Err(AnalyzeError::configuration(format!(
            "project file '{}' declares no target framework",
            path.display()
        )));
    }
    Ok(frameworks)
}
