//! Reference-assembly pack resolution.
//!
//! Picks the lexicographically greatest version under
//! `<sdk-root>/packs/Microsoft.NETCore.App.Ref` and requires the exact
//! `ref/<tfm>` subdirectory for the declared target framework. String
//! ordering stands in for "newest available"; no semantic version
//! comparison is attempted (documented limitation).

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AnalyzeError, AnalyzeResult, Resource};

const REF_PACK: &str = "Microsoft.NETCore.App.Ref";
const SHARED_RUNTIME: &str = "Microsoft.NETCore.App";

/// A resolved reference bundle, tagged with its pack version.
#[derive(Debug, Clone)]
pub struct ReferenceAssemblySet {
    pub dir: PathBuf,
    pub version: String,
}

/// Lexicographically greatest subdirectory name, the string-ordering
/// proxy for the newest installed version.
fn greatest_version(dir: &Path) -> Option<String> {
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().into_string().ok())
        .max()
}

/// Resolve the reference set for a declared target framework, plus the
/// optional core-runtime directory.
///
/// The SDK root comes from configuration at construction time; absence is
/// a fatal configuration error, never a silent fallback.
pub fn resolve(
    dotnet_root: Option<&Path>,
    target_framework: &str,
) -> AnalyzeResult<(ReferenceAssemblySet, Option<PathBuf>)> {
    let root = dotnet_root.ok_or_else(|| {
        AnalyzeError::configuration(
            "dotnet root is not set; set DOTNET_ROOT or dotnet.root in settings",
        )
    })?;

    let packs = root.join("packs").join(REF_PACK);
    let version = greatest_version(&packs).ok_or_else(|| {
        AnalyzeError::not_found(
            Resource::ReferenceAssemblySet,
            format!("no reference packs under '{}'", packs.display()),
        )
    })?;

    let dir = packs.join(&version).join("ref").join(target_framework);
    if !dir.is_dir() {
        return Err(AnalyzeError::not_found(
            Resource::ReferenceAssemblySet,
            format!(
                "pack {version} has no ref/{target_framework} under '{}'",
                packs.display()
            ),
        ));
    }
    debug!(dir = %dir.display(), version, "resolved reference assembly set");

    // The core runtime is optional: reference assemblies already satisfy
    // metadata-only resolution when no shared runtime is installed.
    let shared = root.join("shared").join(SHARED_RUNTIME);
    let core_dir = greatest_version(&shared).map(|v| shared.join(v));

    Ok((ReferenceAssemblySet { dir, version }, core_dir))
}
