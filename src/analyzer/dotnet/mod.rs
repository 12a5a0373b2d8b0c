//! The .NET analyzer: source file + symbol name in, descriptor out.
//!
//! Pipeline per request: locate the owning project, resolve compiled
//! output, resolve the reference pack for the declared target framework,
//! open one metadata-only load context, search, build the descriptor.
//! Each stage fails fast with a specific error kind; only "symbol not
//! found" is a defined negative result rather than an error.

pub mod artifacts;
pub mod descriptor;
pub mod project;
pub mod refpacks;
pub mod search;
pub mod xmldoc;

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Settings;
use crate::error::{AnalyzeError, AnalyzeResult};
use crate::metadata::LoadContext;

use super::CodeAnalyzer;
use self::descriptor::{DescriptorBuilder, SymbolDescriptor};
use self::xmldoc::XmlDocResolver;

/// Metadata-based C# analyzer. Holds only configuration; all per-request
/// state lives on the stack of [`CodeAnalyzer::analyze`], so concurrent
/// requests share nothing mutable.
#[derive(Debug)]
pub struct DotnetAnalyzer {
    dotnet_root: Option<PathBuf>,
}

impl DotnetAnalyzer {
    /// The SDK root is injected here, never read ambiently at call sites.
    pub fn new(dotnet_root: Option<PathBuf>) -> Self {
        Self { dotnet_root }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.dotnet.root.clone())
    }
}

fn ensure_live(cancel: &CancellationToken) -> AnalyzeResult<()> {
    if cancel.is_cancelled() {
        Err(AnalyzeError::Cancelled)
    } else {
        Ok(())
    }
}

impl CodeAnalyzer for DotnetAnalyzer {
    fn language_id(&self) -> &'static str {
        "csharp"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["cs"]
    }

    fn analyze(
        &self,
        source_file: &Path,
        symbol_name: &str,
        cancel: &CancellationToken,
    ) -> AnalyzeResult<Option<SymbolDescriptor>> {
        debug!(source = %source_file.display(), symbol = symbol_name, "analyzing symbol");
        ensure_live(cancel)?;
        std::fs::metadata(source_file).map_err(|e| AnalyzeError::io(source_file, e))?;

        let build = project::locate(source_file)?;
        ensure_live(cancel)?;

        let artifact_set = artifacts::resolve(&build)?;
        ensure_live(cancel)?;

        let (reference_set, core_dir) =
            refpacks::resolve(self.dotnet_root.as_deref(), build.declared_target())?;
        ensure_live(cancel)?;

        // The context is released on every exit path below, including
        // cancellation and errors, when it drops with this frame.
        let context = LoadContext::open(&artifact_set.dir, &reference_set.dir, core_dir.as_deref())?;
        ensure_live(cancel)?;

        let Some(hit) = search::find_symbol(&context, symbol_name)? else {
            return Ok(None);
        };
        ensure_live(cancel)?;

        let mut docs = XmlDocResolver::new();
        let mut symbol = DescriptorBuilder::new(&mut docs).build(&hit)?;
        symbol
            .diagnostics
            .extend(context.diagnostics().iter().cloned());
        Ok(Some(symbol))
    }
}
