//! MCP tool server over stdio.
//!
//! Exposes `select`, `index` and `status` as MCP tools. Tool calls are not
//! executed on the transport's tasks: [`ContextServer`] forwards each one
//! to a [`ToolQueue`], a FIFO channel drained by a single worker that owns
//! the project, the store handle and the embedding adapter. One call runs
//! to completion before the next starts, in arrival order.
//!
//! Failures are returned as tool errors carrying the JSON error payload
//! (see [`ContextError::payload`]); the server keeps serving.

use std::borrow::Cow;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use rmcp::model::*;
use rmcp::transport::stdio;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::Project;
use crate::embedding::EmbeddingAdapter;
use crate::error::{ContextError, Result};
use crate::format::format;
use crate::index::run_index;
use crate::select::{select, SelectRequest};
use crate::status::status;
use crate::store::IndexStore;

/// Pending calls the queue holds before callers wait for room.
const QUEUE_CAPACITY: usize = 64;

/// A parsed tool invocation.
#[derive(Debug, Clone)]
pub enum ToolCall {
    Select { request: SelectRequest, explain: bool },
    Index { sources: Option<Vec<String>> },
    Status,
}

#[derive(Debug, Deserialize)]
struct SelectArgs {
    #[serde(flatten)]
    request: SelectRequest,
    #[serde(default)]
    explain: bool,
}

#[derive(Debug, Default, Deserialize)]
struct IndexArgs {
    #[serde(default)]
    sources: Option<Vec<String>>,
}

impl ToolCall {
    /// Parse a call by tool name. `Ok(None)` means no such tool.
    pub fn parse(name: &str, args: serde_json::Value) -> std::result::Result<Option<Self>, String> {
        let call = match name {
            "select" => {
                let args: SelectArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
                ToolCall::Select {
                    request: args.request,
                    explain: args.explain,
                }
            }
            "index" => {
                let args: IndexArgs = serde_json::from_value(args).map_err(|e| e.to_string())?;
                ToolCall::Index {
                    sources: args.sources,
                }
            }
            "status" => ToolCall::Status,
            _ => return Ok(None),
        };
        Ok(Some(call))
    }
}

/// Everything a tool call needs, owned by the queue worker.
pub struct Engine {
    project: Project,
    store: IndexStore,
    adapter: EmbeddingAdapter,
}

impl Engine {
    pub fn new(project: Project, store: IndexStore, adapter: EmbeddingAdapter) -> Self {
        Self {
            project,
            store,
            adapter,
        }
    }

    /// Run one call. The future is boxed as `Send` so the queue worker can
    /// own the engine on a spawned task.
    pub fn execute(&self, call: ToolCall) -> BoxFuture<'_, Result<serde_json::Value>> {
        async move {
            let value = match call {
                ToolCall::Select { request, explain } => {
                    let result =
                        select(&self.project, &self.store, &self.adapter, &request).await?;
                    format(&result, explain).data
                }
                ToolCall::Index { sources } => {
                    let report =
                        run_index(&self.project, &self.store, &self.adapter, sources.as_deref())
                            .await?;
                    serde_json::to_value(&report)?
                }
                ToolCall::Status => {
                    let report = status(&self.project, Some(&self.store), &self.adapter).await?;
                    serde_json::to_value(&report)?
                }
            };
            Ok(value)
        }
        .boxed()
    }

    pub async fn close(self) {
        self.store.close().await;
    }
}

struct Job {
    call: ToolCall,
    reply: oneshot::Sender<Result<serde_json::Value>>,
}

/// Handle to the single-flight tool worker.
#[derive(Clone)]
pub struct ToolQueue {
    tx: mpsc::Sender<Job>,
}

impl ToolQueue {
    /// Start the worker. It stops once every handle is dropped and hands
    /// the engine back through the join handle.
    pub fn spawn(engine: Engine) -> (Self, JoinHandle<Engine>) {
        let (tx, mut rx) = mpsc::channel::<Job>(QUEUE_CAPACITY);
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let result = engine.execute(job.call).await;
                if let Err(e) = &result {
                    log::debug!("tool call failed: {}", e);
                }
                // The caller may have gone away.
                let _ = job.reply.send(result);
            }
            engine
        });
        (Self { tx }, worker)
    }

    /// Enqueue a call and wait for its result.
    pub async fn call(&self, call: ToolCall) -> Result<serde_json::Value> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job { call, reply })
            .await
            .map_err(|_| ContextError::ServerStopped)?;
        rx.await.map_err(|_| ContextError::ServerStopped)?
    }
}

/// MCP front end; every session shares one queue.
#[derive(Clone)]
pub struct ContextServer {
    queue: ToolQueue,
}

impl ContextServer {
    pub fn new(queue: ToolQueue) -> Self {
        Self { queue }
    }

    fn tools() -> Vec<Tool> {
        vec![
            tool(
                "select",
                "Select the code and text chunks most relevant to a natural-language query, \
                 packed to fit a token budget and returned in file order.",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "What you are looking for" },
                        "budget": { "type": "integer", "minimum": 1, "description": "Maximum tokens to return" },
                        "sources": { "type": "array", "items": { "type": "string" }, "description": "Restrict to these source ids" },
                        "explain": { "type": "boolean", "description": "Include similarity and boost per chunk" }
                    },
                    "required": ["query"]
                }),
                true,
            ),
            tool(
                "index",
                "Re-index the configured sources (or only the given ones).",
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "sources": { "type": "array", "items": { "type": "string" } }
                    }
                }),
                false,
            ),
            tool(
                "status",
                "Report what is indexed: chunk totals, embedding model, per-source counts.",
                serde_json::json!({ "type": "object", "properties": {} }),
                true,
            ),
        ]
    }

    /// Run one tool call through the queue and wrap the outcome.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> std::result::Result<CallToolResult, McpError> {
        let args = arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        let call = match ToolCall::parse(name, args) {
            Ok(Some(call)) => call,
            Ok(None) => {
                return Err(McpError::new(
                    ErrorCode::METHOD_NOT_FOUND,
                    format!("no tool registered with name: {}", name),
                    None,
                ))
            }
            Err(e) => {
                return Err(McpError::invalid_params(
                    format!("invalid arguments for '{}': {}", name, e),
                    None,
                ))
            }
        };

        match self.queue.call(call).await {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value)
                    .map_err(|e| McpError::internal_error(e.to_string(), None))?;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => {
                let text = e.payload().to_string();
                Ok(CallToolResult::error(vec![Content::text(text)]))
            }
        }
    }
}

fn tool(name: &'static str, description: &'static str, schema: serde_json::Value, read_only: bool) -> Tool {
    let input_schema: Arc<serde_json::Map<String, serde_json::Value>> = match schema {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    };

    Tool {
        name: Cow::Borrowed(name),
        title: None,
        description: Some(Cow::Borrowed(description)),
        input_schema,
        output_schema: None,
        annotations: Some(ToolAnnotations::new().read_only(read_only)),
        execution: None,
        icons: None,
        meta: None,
    }
}

impl ServerHandler for ContextServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "context-pack".to_string(),
                title: Some("Context Pack".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Local context retrieval for this project. Use select to fetch the chunks \
                 most relevant to a question within a token budget, index to refresh the \
                 index after files change, and status to see what is indexed."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = std::result::Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(Self::tools())))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        Self::tools().into_iter().find(|t| t.name == name)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> std::result::Result<CallToolResult, McpError> {
        self.dispatch(&request.name, request.arguments).await
    }
}

/// Serve the project's tools over stdio until the client disconnects or
/// the process is asked to stop.
pub async fn run_stdio_server(project: Project) -> anyhow::Result<()> {
    let store = IndexStore::open(&project.store_path()).await?;
    let adapter = EmbeddingAdapter::from_config(&project.config.embedding)?;
    log::info!(
        "serving {} over stdio ({})",
        project.root.display(),
        adapter.model_name()
    );

    let (queue, worker) = ToolQueue::spawn(Engine::new(project, store, adapter));
    let running = ContextServer::new(queue).serve(stdio()).await?;

    let token = running.cancellation_token();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("shutdown signal received");
        token.cancel();
    });

    let reason = running.waiting().await?;
    log::info!("server stopped: {:?}", reason);

    // Dropping the service dropped the last queue handle; the worker
    // finishes the call in flight and returns the engine.
    let engine = worker.await?;
    engine.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
