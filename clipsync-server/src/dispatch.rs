use std::{path::PathBuf, sync::Arc};

use axum::{
    Json, Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use bytes::{Bytes, BytesMut};
use clipsync_core::{
    IngestAck, InboundMessage, LifecycleBridge, SEND_PATH, parse_ingest_body, render_landing,
    send_url,
};
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::listener::ServerState;

pub const EMBEDDED_LANDING_PAGE: &str = include_str!("../assets/index.html");
pub const PLACEHOLDER_BODY: &str = "Hello from ClipSync Web Server!";
pub const SERVER_ERROR_BODY: &str = "Internal Server Error";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("failed to read request body: {0}")]
    BodyRead(String),
    #[error("landing page template unavailable at {path}: {reason}")]
    TemplateMissing { path: String, reason: String },
    #[error("delivery task failed: {0}")]
    Delivery(String),
    #[error("server is stopping")]
    ShuttingDown,
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        match &self {
            DispatchError::BodyTooLarge { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                [(header::CONNECTION, "close")],
                Json(IngestAck::failure(self.to_string())),
            )
                .into_response(),
            DispatchError::BodyRead(_) => (
                StatusCode::BAD_REQUEST,
                Json(IngestAck::failure(self.to_string())),
            )
                .into_response(),
            DispatchError::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::CONNECTION, "close")],
                Json(IngestAck::failure(self.to_string())),
            )
                .into_response(),
            DispatchError::TemplateMissing { .. } | DispatchError::Delivery(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain")],
                SERVER_ERROR_BODY,
            )
                .into_response(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum LandingPage {
    Embedded,
    File(PathBuf),
}

impl LandingPage {
    async fn load(&self) -> Result<String, DispatchError> {
        match self {
            LandingPage::Embedded => Ok(EMBEDDED_LANDING_PAGE.to_owned()),
            LandingPage::File(path) => tokio::fs::read_to_string(path).await.map_err(|err| {
                DispatchError::TemplateMissing {
                    path: path.display().to_string(),
                    reason: err.to_string(),
                }
            }),
        }
    }
}

/// Everything a request handler needs besides the live server state.
#[derive(Clone)]
pub struct DispatchContext {
    pub bridge: Arc<LifecycleBridge>,
    pub landing: LandingPage,
    pub max_body_bytes: usize,
}

#[derive(Clone)]
pub struct AppState {
    context: DispatchContext,
    server_state: watch::Receiver<ServerState>,
    /// Flips to true when the owning listener begins to stop.
    stopping: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        context: DispatchContext,
        server_state: watch::Receiver<ServerState>,
        stopping: watch::Receiver<bool>,
    ) -> Self {
        Self {
            context,
            server_state,
            stopping,
        }
    }

    fn is_stopping(&self) -> bool {
        *self.stopping.borrow()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Preflight,
    Landing,
    Ingest,
    Fallback,
}

impl Route {
    pub fn classify(method: &Method, path: &str) -> Self {
        if method == Method::OPTIONS {
            Route::Preflight
        } else if method == Method::GET && path == "/" {
            Route::Landing
        } else if method == Method::POST && path == SEND_PATH {
            Route::Ingest
        } else {
            Route::Fallback
        }
    }
}

/// Append-only body buffer that refuses to grow past `limit`.
#[derive(Debug)]
pub struct BodyAccumulator {
    buf: BytesMut,
    limit: usize,
}

impl BodyAccumulator {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            limit,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<(), DispatchError> {
        if self.buf.len().saturating_add(chunk.len()) > self.limit {
            return Err(DispatchError::BodyTooLarge { limit: self.limit });
        }
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let path = parts.uri.path();
    let route = Route::classify(&parts.method, path);
    if route != Route::Preflight {
        debug!(method = %parts.method, path, "request");
    }

    let result = match route {
        Route::Preflight => Ok(preflight_response()),
        Route::Landing => landing_handler(&state).await,
        Route::Ingest => ingest_handler(&state, &parts.headers, body).await,
        Route::Fallback => Ok(placeholder_response()),
    };

    result.unwrap_or_else(|err| {
        warn!("request to {} failed: {}", path, err);
        err.into_response()
    })
}

fn preflight_response() -> Response {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
        .into_response()
}

fn placeholder_response() -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain")],
        PLACEHOLDER_BODY,
    )
        .into_response()
}

async fn landing_handler(state: &AppState) -> Result<Response, DispatchError> {
    let template = state.context.landing.load().await?;
    let server = state.server_state.borrow().clone();
    let page = render_landing(&template, &send_url(&server.host, server.port));
    Ok(Html(page).into_response())
}

async fn ingest_handler(
    state: &AppState,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, DispatchError> {
    let limit = state.context.max_body_bytes;
    if let Some(declared) = declared_content_length(headers)
        && declared > limit as u64
    {
        return Err(DispatchError::BodyTooLarge { limit });
    }

    let bytes = accumulate_body(body, limit).await?;
    let ack = match parse_ingest_body(&bytes) {
        Ok(_) if state.is_stopping() => return Err(DispatchError::ShuttingDown),
        Ok(text) => {
            debug!(chars = text.chars().count(), "message received: {}", text);
            let bridge = Arc::clone(&state.context.bridge);
            let message = InboundMessage::new(text);
            let event = tokio::task::spawn_blocking(move || bridge.deliver(message))
                .await
                .map_err(|err| DispatchError::Delivery(err.to_string()))?;
            debug!(immediate = event.is_immediate(), "message routed");
            IngestAck::success()
        }
        Err(err) => {
            warn!("ignoring /send body: {}", err);
            IngestAck::failure(err.to_string())
        }
    };
    Ok(Json(ack).into_response())
}

async fn accumulate_body(body: Body, limit: usize) -> Result<Bytes, DispatchError> {
    let mut stream = body.into_data_stream();
    let mut accumulator = BodyAccumulator::new(limit);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|err| DispatchError::BodyRead(err.to_string()))?;
        accumulator.push(&chunk)?;
    }
    Ok(accumulator.finish())
}

fn declared_content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
