//! MCP (Model Context Protocol) server implementation.
//!
//! Exposes the analyzer, the web collaborator, and the bookmark store as
//! MCP tools over stdio. Heavy filesystem and network work runs on the
//! blocking pool; tool handlers stay async-light.

use rmcp::{
    ServerHandler,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{ErrorData as McpError, *},
    schemars,
    service::{Peer, RequestContext, RoleServer},
    tool, tool_handler, tool_router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::analyzer::AnalyzerRegistry;
use crate::store::{Bookmark, FileRepository};
use crate::web::WebSearchService;

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct AnalyzeSymbolRequest {
    /// Absolute file path to the source file
    pub file_path: String,
    /// Symbol name to analyze, bare or fully qualified
    pub symbol_name: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SearchWebRequest {
    /// A query to search the web for
    pub query: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ParseUrlRequest {
    /// Comma-separated list of URLs to scrape
    pub urls: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ManageBookmarksRequest {
    /// Action to perform: add, remove, or list
    pub action: String,
    /// URL to add or remove, if applicable
    #[serde(default)]
    pub url: String,
    /// A description for the bookmark, if adding
    #[serde(default)]
    pub description: String,
}

#[derive(Clone)]
pub struct DevToolsServer {
    registry: Arc<AnalyzerRegistry>,
    web: Arc<WebSearchService>,
    bookmarks: Arc<FileRepository<Bookmark>>,
    tool_router: ToolRouter<Self>,
    peer: Arc<Mutex<Option<Peer<RoleServer>>>>,
}

#[tool_router]
impl DevToolsServer {
    pub fn new(
        registry: Arc<AnalyzerRegistry>,
        web: Arc<WebSearchService>,
        bookmarks: Arc<FileRepository<Bookmark>>,
    ) -> Self {
        Self {
            registry,
            web,
            bookmarks,
            tool_router: Self::tool_router(),
            peer: Arc::new(Mutex::new(None)),
        }
    }

    #[tool(
        description = "Return structural details (params, generics, overloads, docs) for a given class/method/etc. Supports C#."
    )]
    pub async fn analyze_code_symbol(
        &self,
        Parameters(AnalyzeSymbolRequest {
            file_path,
            symbol_name,
        }): Parameters<AnalyzeSymbolRequest>,
    ) -> Result<CallToolResult, McpError> {
        let registry = Arc::clone(&self.registry);
        let source = PathBuf::from(&file_path);
        let symbol = symbol_name.clone();
        let result = tokio::task::spawn_blocking(move || {
            let analyzer = registry.resolve(&source)?;
            analyzer.analyze(&source, &symbol, &CancellationToken::new())
        })
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        match result {
            Ok(Some(descriptor)) => {
                let json = serde_json::to_string_pretty(&descriptor)
                    .map_err(|e| McpError::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Ok(None) => Ok(CallToolResult::success(vec![Content::text(format!(
                "No symbol found named: {symbol_name}"
            ))])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(format!(
                "{} ({})",
                e,
                e.status_code()
            ))])),
        }
    }

    #[tool(
        description = "Search the web and return up to 5 URLs most relevant to the query. Chain with parse_url to get page text."
    )]
    pub async fn search_web(
        &self,
        Parameters(SearchWebRequest { query }): Parameters<SearchWebRequest>,
    ) -> Result<CallToolResult, McpError> {
        let web = Arc::clone(&self.web);
        let result = tokio::task::spawn_blocking(move || web.search(&query))
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        match result {
            Ok(urls) if urls.is_empty() => Ok(CallToolResult::success(vec![Content::text(
                "No results found".to_string(),
            )])),
            Ok(urls) => Ok(CallToolResult::success(vec![Content::text(
                urls.join("\n"),
            )])),
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    #[tool(
        description = "Scrape the textual content from each URL and return the extracted text."
    )]
    pub async fn parse_url(
        &self,
        Parameters(ParseUrlRequest { urls }): Parameters<ParseUrlRequest>,
    ) -> Result<CallToolResult, McpError> {
        let web = Arc::clone(&self.web);
        let texts = tokio::task::spawn_blocking(move || {
            urls.split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(|u| match web.scrape(u) {
                    Ok(text) if !text.is_empty() => text,
                    Ok(_) => format!("[no readable content at {u}]"),
                    Err(e) => format!("[failed to scrape {u}: {e}]"),
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(
            texts.join("\n---\n"),
        )]))
    }

    #[tool(description = "Manage bookmarks for URLs. Use add, remove, or list as the action.")]
    pub async fn manage_bookmarks(
        &self,
        Parameters(ManageBookmarksRequest {
            action,
            url,
            description,
        }): Parameters<ManageBookmarksRequest>,
    ) -> Result<CallToolResult, McpError> {
        let bookmarks = Arc::clone(&self.bookmarks);
        let message = tokio::task::spawn_blocking(move || match action.to_lowercase().as_str() {
            "add" => bookmarks
                .add(Bookmark {
                    url: url.clone(),
                    description,
                })
                .map(|_| format!("Bookmark added: {url}"))
                .unwrap_or_else(|e| e.to_string()),
            "remove" => bookmarks
                .delete_where(|b| b.url == url)
                .map(|_| format!("Bookmark removed: {url}"))
                .unwrap_or_else(|e| e.to_string()),
            "list" => match bookmarks.list() {
                Ok(items) if items.is_empty() => "No bookmarks saved".to_string(),
                Ok(items) => items
                    .iter()
                    .map(|b| format!("{}: {}", b.url, b.description))
                    .collect::<Vec<_>>()
                    .join("\n"),
                Err(e) => e.to_string(),
            },
            _ => "Invalid action. Use 'add', 'remove', or 'list'.".to_string(),
        })
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        Ok(CallToolResult::success(vec![Content::text(message)]))
    }
}

#[tool_handler]
impl ServerHandler for DevToolsServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "dotlens".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "This server provides developer tools for AI assistants. \
                Use 'analyze_code_symbol' for structural details of a C# symbol \
                resolved from its project's compiled output, 'search_web' to find \
                relevant URLs, 'parse_url' to extract readable page text, and \
                'manage_bookmarks' to keep a small list of saved URLs."
                    .to_string(),
            ),
        }
    }

    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        // Keep the peer around for notifications.
        let mut peer_guard = self.peer.lock().await;
        *peer_guard = Some(context.peer.clone());
        Ok(self.get_info())
    }
}
