//! dotlens CLI entry point.
//!
//! Main components: Cli parser, Commands enum, and async runtime with MCP
//! server support.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use dotlens::analyzer::AnalyzerRegistry;
use dotlens::config::{SETTINGS_PATH, Settings};
use dotlens::io::ExitCode;
use dotlens::mcp::DevToolsServer;
use dotlens::store::{Bookmark, FileRepository, default_store_dir};
use dotlens::web::{ReqwestFetcher, WebSearchService};

/// .NET symbol intelligence
#[derive(Parser)]
#[command(
    name = "dotlens",
    version = env!("CARGO_PKG_VERSION"),
    about = ".NET symbol intelligence",
    long_about = "Resolve C# symbols against compiled project output and query \
                  structural metadata without executing any analyzed code."
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Analyze a symbol against its project's compiled output
    #[command(
        about = "Resolve a symbol and print its descriptor as JSON",
        after_help = "Examples:\n  dotlens analyze src/Services/Parser.cs Parse\n  dotlens analyze src/Program.cs MyApp.Program.Main"
    )]
    Analyze {
        /// Absolute or relative path to the source file
        file: PathBuf,

        /// Symbol name, bare or fully qualified
        symbol: String,
    },

    /// Start MCP server on stdio
    #[command(about = "Start MCP server", after_help = "Example:\n  dotlens serve")]
    Serve,

    /// Show current configuration settings
    #[command(about = "Display active settings as TOML")]
    Config,
}

fn load_settings(path: Option<PathBuf>) -> Settings {
    let result = match path {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    match result {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings: {e}");
            std::process::exit(ExitCode::ConfigError.into());
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let settings = load_settings(cli.config);

    // All diagnostics go to stderr; stdout carries JSON and MCP traffic.
    let filter = if settings.debug || settings.mcp.debug {
        EnvFilter::new("dotlens=debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Analyze { file, symbol } => {
            let registry = AnalyzerRegistry::with_defaults(&settings);
            let source = match std::path::absolute(&file) {
                Ok(path) => path,
                Err(e) => {
                    eprintln!("Invalid path '{}': {e}", file.display());
                    std::process::exit(ExitCode::IoError.into());
                }
            };
            let result = tokio::task::spawn_blocking(move || {
                let analyzer = registry.resolve(&source)?;
                analyzer.analyze(&source, &symbol, &CancellationToken::new())
            })
            .await
            .expect("analyze task panicked");

            match result {
                Ok(Some(descriptor)) => {
                    match serde_json::to_string_pretty(&descriptor) {
                        Ok(json) => println!("{json}"),
                        Err(e) => {
                            eprintln!("Failed to serialize descriptor: {e}");
                            std::process::exit(ExitCode::GeneralError.into());
                        }
                    }
                    std::process::exit(ExitCode::Success.into());
                }
                Ok(None) => {
                    eprintln!("Symbol not found");
                    std::process::exit(ExitCode::NotFound.into());
                }
                Err(e) => {
                    eprintln!("Error: {e} ({})", e.status_code());
                    for suggestion in e.recovery_suggestions() {
                        eprintln!("  hint: {suggestion}");
                    }
                    std::process::exit(ExitCode::from(&e).into());
                }
            }
        }

        Commands::Serve => {
            eprintln!("Starting MCP server on stdio transport");
            eprintln!("To test: npx @modelcontextprotocol/inspector cargo run -- serve");

            let registry = Arc::new(AnalyzerRegistry::with_defaults(&settings));
            let fetcher = match ReqwestFetcher::new(&settings.web.user_agent) {
                Ok(fetcher) => Arc::new(fetcher),
                Err(e) => {
                    eprintln!("Failed to build HTTP client: {e}");
                    std::process::exit(ExitCode::GeneralError.into());
                }
            };
            let web = Arc::new(WebSearchService::new(fetcher, &settings.web));
            let store_dir = settings
                .store
                .path
                .clone()
                .unwrap_or_else(default_store_dir);
            let bookmarks = match FileRepository::<Bookmark>::open(&store_dir, "bookmark") {
                Ok(repository) => Arc::new(repository),
                Err(e) => {
                    eprintln!("Failed to open bookmark store: {e}");
                    std::process::exit(ExitCode::GeneralError.into());
                }
            };

            let server = DevToolsServer::new(registry, web, bookmarks);

            // Start server with stdio transport
            use rmcp::{ServiceExt, transport::stdio};
            let service = server
                .serve(stdio())
                .await
                .map_err(|e| {
                    eprintln!("Failed to start MCP server: {e}");
                    std::process::exit(ExitCode::GeneralError.into());
                })
                .unwrap();

            // Wait for server to complete
            service
                .waiting()
                .await
                .map_err(|e| {
                    eprintln!("MCP server error: {e}");
                    std::process::exit(ExitCode::GeneralError.into());
                })
                .unwrap();
        }

        Commands::Config => {
            println!("Active settings (from {SETTINGS_PATH} + environment):");
            match toml::to_string_pretty(&settings) {
                Ok(text) => println!("{text}"),
                Err(e) => {
                    eprintln!("Failed to render settings: {e}");
                    std::process::exit(ExitCode::GeneralError.into());
                }
            }
        }
    }
}
