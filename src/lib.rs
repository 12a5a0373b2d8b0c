/// The main library module for dotlens
pub mod analyzer;
pub mod config;
pub mod error;
pub mod io;
pub mod mcp;
pub mod metadata;
pub mod store;
pub mod web;

// Explicit exports for better API clarity
pub use analyzer::{
    AnalyzerRegistry, CodeAnalyzer, DotnetAnalyzer, ParameterDescriptor, SymbolDescriptor,
    SymbolKind,
};
pub use config::Settings;
pub use error::{
    AnalyzeError, AnalyzeResult, Resource, StoreError, StoreResult, WebError, WebResult,
};
pub use metadata::{Assembly, LoadContext};
pub use store::{Bookmark, FileRepository};
pub use web::WebSearchService;
