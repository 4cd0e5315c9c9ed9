//! HTTP relay.
//!
//! ## Endpoints
//!
//! Every route except `/` is also served under `/api`. When a static
//! directory is configured it owns `/` and every unmatched path, so its
//! `index.html` replaces the liveness text.
//!
//! - `GET /`: liveness text, only without a static directory
//! - `POST /chat`: `{messages}` or HTTP 500 with an apologetic fallback message
//! - `GET /voices`: advertised voices
//! - `GET /test-gemini`: one round trip to the LLM
//! - `GET /debug-lipsync`: tool discovery report and recognizer probe

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{ServerConfig, VoiceEntry};
use crate::diagnostics::{self, ToolInventory};
use crate::error::{RelayError, Result};
use crate::pipeline::{self, ChatRequest, ChatResponse, Relay};

/// Prompt sent by `GET /test-gemini`.
pub const HEALTH_CHECK_PROMPT: &str =
    "Hello! Give me a short 1 sentence response to test the API connection.";

/// Top-level `error` field of the HTTP 500 body.
pub const CHAT_ERROR: &str = "An error occurred processing your request";

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    relay: Arc<Relay>,
    voices: Arc<Vec<VoiceEntry>>,
    tools: Arc<ToolInventory>,
}

impl AppState {
    /// Bundle the relay with the data the auxiliary endpoints report.
    pub fn new(relay: Relay, voices: Vec<VoiceEntry>, tools: ToolInventory) -> Self {
        Self {
            relay: Arc::new(relay),
            voices: Arc::new(voices),
            tools: Arc::new(tools),
        }
    }

    /// The relay pipeline.
    pub fn relay(&self) -> &Relay {
        &self.relay
    }
}

async fn handle_root() -> &'static str {
    "Hello World!"
}

async fn handle_chat(
    State(state): State<AppState>,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection.body_text(), "unreadable chat body, treating as empty");
            ChatRequest::default()
        }
    };

    match state.relay.handle(&request).await {
        Ok(messages) => Json(ChatResponse { messages }).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "chat request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": CHAT_ERROR,
                    "messages": [pipeline::apology_message()],
                })),
            )
                .into_response()
        }
    }
}

async fn handle_voices(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "voices": state.voices.as_slice() }))
}

async fn handle_test_gemini(State(state): State<AppState>) -> Response {
    let generator = state.relay.generator();
    match generator.generate(HEALTH_CHECK_PROMPT).await {
        Ok(response) => Json(json!({
            "success": true,
            "message": "Gemini API connection successful",
            "response": response,
        }))
        .into_response(),
        Err(e) => {
            tracing::warn!(model = generator.name(), code = e.code(), error = %e, "LLM health check failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "success": false,
                    "message": "Gemini API connection failed",
                    "error": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

async fn handle_debug_lipsync(State(state): State<AppState>) -> Json<diagnostics::DiagnosticsReport> {
    Json(diagnostics::run(&state.relay, &state.tools).await)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/chat", post(handle_chat))
        .route("/voices", get(handle_voices))
        .route("/test-gemini", get(handle_test_gemini))
        .route("/debug-lipsync", get(handle_debug_lipsync))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new().allow_methods([Method::GET, Method::POST]);
    if origins.is_empty() {
        return base.allow_origin(Any).allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(%origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(parsed))
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Build the application router.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let app = Router::new()
        .merge(api_routes())
        .nest("/api", api_routes());

    let app = match &config.static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app.route("/", get(handle_root)),
    };

    app.layer(DefaultBodyLimit::max(config.body_limit_bytes))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Running relay HTTP server.
pub struct RelayServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl RelayServer {
    /// Bind `{config.host}:{config.port}` (port `0` auto-assigns) and serve in a background task.
    ///
    /// # Errors
    ///
    /// Returns an error if the TCP listener cannot bind.
    pub async fn start(config: &ServerConfig, state: AppState) -> Result<Self> {
        let app = router(state, config);

        let bind_addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| RelayError::Server(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| RelayError::Server(format!("failed to get local addr: {e}")))?;

        info!("relay listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("relay server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn layered(origins: &[String]) -> Router {
        Router::new()
            .route("/", get(handle_root))
            .layer(cors_layer(origins))
    }

    #[test]
    fn explicit_origins_allow_credentials() {
        // Layering panics on credentials combined with wildcard headers.
        let _ = layered(&["http://localhost:5173".to_owned()]);
        let _ = layered(&[]);
    }

    #[test]
    fn invalid_origins_are_skipped() {
        let _ = layered(&["bad\norigin".to_owned(), "http://ok.example".to_owned()]);
    }
}
