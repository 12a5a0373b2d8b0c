//! Error types for the symbol analysis system
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The resource classes the resolution pipeline can fail to locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// A build-unit manifest (`*.csproj`) owning the source file
    BuildDescriptor,
    /// A directory of already-compiled output for the build unit
    CompiledArtifactSet,
    /// A versioned reference-assembly pack matching the declared target framework
    ReferenceAssemblySet,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BuildDescriptor => "build descriptor",
            Self::CompiledArtifactSet => "compiled artifact set",
            Self::ReferenceAssemblySet => "reference assembly set",
        };
        f.write_str(name)
    }
}

/// Main error type for analyze operations.
///
/// A symbol that is simply absent from the loaded metadata is NOT an error;
/// `analyze` returns `Ok(None)` for that case.
#[derive(Error, Debug)]
pub enum AnalyzeError {
    /// Required configuration missing or invalid
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    /// No build descriptor / compiled output / reference set could be located
    #[error("No {resource} found: {context}")]
    NotFound { resource: Resource, context: String },

    /// The source kind has no registered analyzer
    #[error("Unsupported file type '{extension}' for file '{path}'. Supported types: .cs")]
    Unsupported { path: PathBuf, extension: String },

    /// File system errors on source, binaries, or documentation artifacts
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Metadata in a binary could not be parsed
    #[error("Failed to parse metadata: {source}")]
    Metadata {
        #[from]
        source: crate::metadata::MetadataError,
    },

    /// The request was cancelled before a complete descriptor was produced
    #[error("Analysis cancelled")]
    Cancelled,
}

impl AnalyzeError {
    pub fn not_found(resource: Resource, context: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            context: context.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON responses
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Configuration { .. } => "CONFIG_ERROR",
            Self::NotFound {
                resource: Resource::BuildDescriptor,
                ..
            } => "BUILD_DESCRIPTOR_NOT_FOUND",
            Self::NotFound {
                resource: Resource::CompiledArtifactSet,
                ..
            } => "ARTIFACTS_NOT_FOUND",
            Self::NotFound {
                resource: Resource::ReferenceAssemblySet,
                ..
            } => "REFERENCE_SET_NOT_FOUND",
            Self::Unsupported { .. } => "UNSUPPORTED_FILE_TYPE",
            Self::Io { .. } => "FILE_READ_ERROR",
            Self::Metadata { .. } => "METADATA_ERROR",
            Self::Cancelled => "CANCELLED",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Configuration { .. } => vec![
                "Set DOTNET_ROOT to your .NET SDK root directory",
                "Or set dotnet.root in .dotlens/settings.toml",
            ],
            Self::NotFound {
                resource: Resource::BuildDescriptor,
                ..
            } => vec![
                "Ensure the source file lives inside a project with a .csproj",
                "Check that you passed an absolute path to the source file",
            ],
            Self::NotFound {
                resource: Resource::CompiledArtifactSet,
                ..
            } => vec![
                "Build the project first: 'dotnet build' produces the bin output",
                "dotlens never triggers a build; compiled output must already exist",
            ],
            Self::NotFound {
                resource: Resource::ReferenceAssemblySet,
                ..
            } => vec![
                "Install the targeting pack for the declared target framework",
                "Check that DOTNET_ROOT points at a full SDK, not just a runtime",
            ],
            Self::Unsupported { .. } => vec![
                "Currently only C# files (.cs) are supported",
                "Support for other languages is coming soon",
            ],
            Self::Io { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            Self::Metadata { .. } => vec![
                "The binary may be corrupt or not a .NET assembly",
                "Rebuild the project and retry",
            ],
            Self::Cancelled => vec![],
        }
    }
}

/// Errors specific to the web search/scrape collaborator
#[derive(Error, Debug)]
pub enum WebError {
    #[error("Failed to build HTTP client: {reason}")]
    Client { reason: String },

    #[error("HTTP request to '{url}' failed: {reason}")]
    Http { url: String, reason: String },

    #[error("'{url}' returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Errors specific to the local JSON-list store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store io error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store at '{path}' holds invalid JSON: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type alias for analyze operations
pub type AnalyzeResult<T> = Result<T, AnalyzeError>;

/// Result type alias for web operations
pub type WebResult<T> = Result<T, WebError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
