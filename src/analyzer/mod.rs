//! Analyzer trait and per-language registry.
//!
//! Each supported source kind registers one analyzer keyed by file
//! extension; resolving an unregistered extension is the defined
//! `Unsupported` error.

pub mod dotnet;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::error::{AnalyzeError, AnalyzeResult};

pub use dotnet::DotnetAnalyzer;
pub use dotnet::descriptor::{ParameterDescriptor, SymbolDescriptor, SymbolKind};

/// Core trait implemented by language-specific symbol analyzers.
pub trait CodeAnalyzer: std::fmt::Debug + Send + Sync {
    /// Language identifier (e.g. "csharp")
    fn language_id(&self) -> &'static str;

    /// File extensions this analyzer handles, without the leading dot
    fn extensions(&self) -> &'static [&'static str];

    /// Resolve `symbol_name` against the compiled output owning
    /// `source_file`. Returns `Ok(None)` when the symbol is simply absent.
    fn analyze(
        &self,
        source_file: &Path,
        symbol_name: &str,
        cancel: &CancellationToken,
    ) -> AnalyzeResult<Option<SymbolDescriptor>>;
}

/// Extension-keyed analyzer registry.
pub struct AnalyzerRegistry {
    by_extension: HashMap<String, Arc<dyn CodeAnalyzer>>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Registry with every built-in analyzer registered.
    pub fn with_defaults(settings: &Settings) -> Self {
        let mut registry = Self::new();
        registry.add(Arc::new(DotnetAnalyzer::from_settings(settings)));
        registry
    }

    pub fn add(&mut self, analyzer: Arc<dyn CodeAnalyzer>) {
        for ext in analyzer.extensions() {
            self.by_extension
                .insert(ext.to_ascii_lowercase(), Arc::clone(&analyzer));
        }
    }

    /// Analyzer for a source path, by extension.
    pub fn resolve(&self, source_file: &Path) -> AnalyzeResult<Arc<dyn CodeAnalyzer>> {
        let extension = source_file
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        self.by_extension
            .get(&extension)
            .cloned()
            .ok_or_else(|| AnalyzeError::Unsupported {
                path: source_file.to_path_buf(),
                extension: format!(".{extension}"),
            })
    }
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
