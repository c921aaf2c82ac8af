//! Server initialization for the stdio and HTTP transports.
//!
//! [`serve_stdio`] exposes the MCP handler over stdio. [`serve_http`] mounts the
//! same handler as streamable HTTP at `/mcp` next to the voice command endpoint.

use anyhow::{Context, Result};
use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rmcp::transport::streamable_http_server::session::local::LocalSessionManager;
use rmcp::transport::streamable_http_server::{StreamableHttpServerConfig, StreamableHttpService};
use rmcp::{ErrorData, ServiceExt};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

use crate::config::CrmConfig;
use crate::db;
use crate::llm;
use crate::mcp::CrmTools;
use crate::tools::{Dispatcher, HandlerSettings};
use crate::voice::{VoiceAgent, VoiceRequest};

const MAX_MCP_BODY: usize = 4 * 1024 * 1024;

/// Open the database and model client and wire them into a dispatcher.
pub fn build_dispatcher(config: &CrmConfig) -> Result<Dispatcher> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    let model = llm::create_model(&config.llm)?;
    Ok(Dispatcher::new(
        Arc::new(Mutex::new(conn)),
        model,
        HandlerSettings::from(&config.memory),
    ))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: CrmConfig) -> Result<()> {
    tracing::info!("starting CRM MCP server on stdio");

    let dispatcher = build_dispatcher(&config)?;
    tracing::info!(tools = dispatcher.catalog().len(), "tool catalog ready");

    let tools = CrmTools::new(dispatcher, config.storage.default_account_id.clone());
    let server = tools.serve(rmcp::transport::stdio()).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");
    Ok(())
}

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub voice: Arc<VoiceAgent>,
    pub default_account: String,
}

impl AppState {
    pub fn new(dispatcher: Dispatcher, config: &CrmConfig) -> Result<Self> {
        let voice = VoiceAgent::from_config(dispatcher.clone(), config.voice.clone(), config.llm.timeout_secs)?;
        Ok(Self {
            dispatcher,
            voice: Arc::new(voice),
            default_account: config.storage.default_account_id.clone(),
        })
    }

    /// Streamable HTTP service for `/mcp`. Stateless, so a plain POST needs no
    /// session handshake and each response is one short event stream.
    fn mcp_service(&self) -> StreamableHttpService<CrmTools, LocalSessionManager> {
        let dispatcher = self.dispatcher.clone();
        let account = self.default_account.clone();
        StreamableHttpService::new(
            move || Ok(CrmTools::new(dispatcher.clone(), account.clone())),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                stateful_mode: false,
                sse_keep_alive: None,
                ..Default::default()
            },
        )
    }
}

pub fn router(state: AppState) -> Router {
    let mcp = Router::new()
        .nest_service("/mcp", state.mcp_service())
        .layer(middleware::from_fn(answer_null_id_requests));

    Router::new()
        .route("/voice-command", post(voice_endpoint))
        .route("/health", get(health))
        .with_state(state)
        .merge(mcp)
        .layer(CorsLayer::permissive())
}

/// True for a request object whose `id` member is present but null. The MCP
/// message types have no null request id, so such a request would otherwise be
/// taken for a notification and get no answer.
fn has_null_request_id(body: &[u8]) -> bool {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| {
            let obj = v.as_object()?;
            Some(obj.contains_key("method") && matches!(obj.get("id"), Some(Value::Null)))
        })
        .unwrap_or(false)
}

async fn answer_null_id_requests(request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes: Bytes = match to_bytes(body, MAX_MCP_BODY).await {
        Ok(b) => b,
        Err(e) => return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response(),
    };
    if has_null_request_id(&bytes) {
        tracing::debug!("rejecting MCP request with null id");
        let error = ErrorData::invalid_request("Invalid Request: id must not be null", None);
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "jsonrpc": "2.0", "id": null, "error": error })),
        )
            .into_response();
    }
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

async fn voice_endpoint(State(state): State<AppState>, body: Bytes) -> Response {
    let request: VoiceRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("Invalid request body: {e}") })),
            )
                .into_response()
        }
    };

    match state.voice.handle(request).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, status = e.status(), "voice command failed");
            let status = StatusCode::from_u16(e.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(e.body())).into_response()
        }
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "tools": state.dispatcher.catalog().len(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Start the HTTP server.
pub async fn serve_http(config: CrmConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting CRM server on HTTP");

    let dispatcher = build_dispatcher(&config)?;
    let state = AppState::new(dispatcher, &config)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP endpoint at http://{bind_addr}/mcp");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_explicit_null_ids_are_flagged() {
        assert!(has_null_request_id(br#"{"jsonrpc":"2.0","id":null,"method":"tools/list"}"#));
        assert!(!has_null_request_id(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#));
        assert!(!has_null_request_id(br#"{"jsonrpc":"2.0","id":0,"method":"ping"}"#));
        assert!(!has_null_request_id(b"{nope"));
    }
}
