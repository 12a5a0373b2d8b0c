//! Compiled-output resolution.
//!
//! Probes a fixed, priority-ordered candidate grid under `bin/` and
//! returns the first directory that exists. Compiled output must already
//! be on disk: this component never triggers a build.

use std::path::PathBuf;

use tracing::debug;

use crate::error::{AnalyzeError, AnalyzeResult, Resource};

use super::project::BuildDescriptor;

/// Known target frameworks, probed in descending priority order.
pub const KNOWN_TFMS: [&str; 8] = [
    "net9.0",
    "net8.0",
    "net7.0",
    "net6.0",
    "net5.0",
    "netcoreapp3.1",
    "netstandard2.1",
    "netstandard2.0",
];

/// Build configurations, release before debug.
pub const CONFIGURATIONS: [&str; 2] = ["Release", "Debug"];

/// A resolved output directory, tagged with the pair that produced it.
#[derive(Debug, Clone)]
pub struct CompiledArtifactSet {
    pub dir: PathBuf,
    pub configuration: String,
    pub target_framework: String,
}

/// Return the first existing `bin/<configuration>/<tfm>` directory.
///
/// Declared target frameworks outrank the known list, so stale output for
/// another framework version is never chosen while the declared one is
/// present; within one framework, release is preferred over debug.
pub fn resolve(descriptor: &BuildDescriptor) -> AnalyzeResult<CompiledArtifactSet> {
    let mut candidates: Vec<&str> = descriptor
        .target_frameworks
        .iter()
        .map(String::as_str)
        .collect();
    for tfm in KNOWN_TFMS {
        if !candidates.contains(&tfm) {
            candidates.push(tfm);
        }
    }

    for tfm in candidates {
        for configuration in CONFIGURATIONS {
            let dir = descriptor.root_dir.join("bin").join(configuration).join(tfm);
            if dir.is_dir() {
                debug!(dir = %dir.display(), "resolved compiled artifact set");
                return Ok(CompiledArtifactSet {
                    dir,
                    configuration: configuration.to_string(),
                    target_framework: tfm.to_string(),
                });
            }
        }
    }

    Err(AnalyzeError::not_found(
        Resource::CompiledArtifactSet,
        format!(
            "no bin/<configuration>/<tfm> output under '{}'; build the project first",
            descriptor.root_dir.display()
        ),
    ))
}
