//! Configuration module for dotlens.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file (`.dotlens/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DOTLENS_` and use double
//! underscores to separate nested levels:
//! - `DOTLENS_DOTNET__ROOT=/usr/share/dotnet` sets `dotnet.root`
//! - `DOTLENS_WEB__CACHE_TTL_SECS=600` sets `web.cache_ttl_secs`
//!
//! The plain `DOTNET_ROOT` variable is also honored as a fallback for
//! `dotnet.root`, matching the wider .NET tooling convention. It is read
//! once at load time; components receive the resolved value at
//! construction and never consult the process environment themselves.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default location of the settings file, relative to the working directory.
pub const SETTINGS_PATH: &str = ".dotlens/settings.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Global debug mode
    #[serde(default = "default_false")]
    pub debug: bool,

    /// .NET SDK lookup settings
    #[serde(default)]
    pub dotnet: DotnetConfig,

    /// Web search/scrape collaborator settings
    #[serde(default)]
    pub web: WebConfig,

    /// Bookmark store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// MCP server settings
    #[serde(default)]
    pub mcp: McpConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct DotnetConfig {
    /// Root of the .NET SDK installation (the directory holding `packs/`
    /// and `shared/`). Absence is a fatal configuration error at analyze
    /// time, never a silent fallback.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    /// How long search and scrape results stay cached, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Maximum number of search result URLs returned
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Character cap applied to scraped page text
    #[serde(default = "default_scrape_max_chars")]
    pub scrape_max_chars: usize,

    /// User-Agent header sent with outbound requests
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct StoreConfig {
    /// Directory holding the JSON list stores. Defaults to the platform
    /// config dir under `dotlens/`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct McpConfig {
    /// Enable debug logging for MCP traffic
    #[serde(default = "default_false")]
    pub debug: bool,
}

fn default_version() -> u32 {
    1
}
fn default_false() -> bool {
    false
}
fn default_cache_ttl_secs() -> u64 {
    30 * 60
}
fn default_max_results() -> usize {
    5
}
fn default_scrape_max_chars() -> usize {
    3_000
}
fn default_user_agent() -> String {
    "Mozilla/5.0".to_string()
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            max_results: default_max_results(),
            scrape_max_chars: default_scrape_max_chars(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            debug: false,
            dotnet: DotnetConfig::default(),
            web: WebConfig::default(),
            store: StoreConfig::default(),
            mcp: McpConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from the default location with env overrides.
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(PathBuf::from(SETTINGS_PATH))
    }

    /// Load settings from a specific TOML file with env overrides.
    pub fn load_from(path: PathBuf) -> Result<Self, figment::Error> {
        let mut settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("DOTLENS_").split("__"))
            .extract()?;

        // DOTNET_ROOT fallback, resolved once here so nothing downstream
        // reads the environment ambiently.
        if settings.dotnet.root.is_none()
            && let Ok(root) = std::env::var("DOTNET_ROOT")
            && !root.is_empty()
        {
            settings.dotnet.root = Some(PathBuf::from(root));
        }

        Ok(settings)
    }
}
