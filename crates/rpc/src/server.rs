use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{Path as AxumPath, Request, State};
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use ipfs_gateway_resolver::{CidResolver, Resolution};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub const X_CID: HeaderName = HeaderName::from_static("x-cid");
pub const X_FILE_NAME: HeaderName = HeaderName::from_static("x-file-name");
pub const X_SIZE: HeaderName = HeaderName::from_static("x-size");
pub const X_CONTENT_TYPE: HeaderName = HeaderName::from_static("x-content-type");

const CORS_ALLOW_ORIGIN: &str = "*";
const CORS_ALLOW_METHODS: &str = "GET, OPTIONS";
const CORS_ALLOW_HEADERS: &str = "Content-Type";

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<CidResolver>,
    /// Node address, reported by the health endpoint.
    pub node_url: String,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(resolver: CidResolver, node_url: impl Into<String>) -> Self {
        Self {
            resolver: Arc::new(resolver),
            node_url: node_url.into(),
            start_time: Instant::now(),
        }
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

type SharedState = Arc<AppState>;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    commit: &'static str,
    node_url: String,
    uptime_secs: u64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            error: self.message,
        });
        (self.status, payload).into_response()
    }
}

/// Serve the gateway on `addr` until `shutdown` resolves.
pub async fn start_server<F>(state: AppState, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let shared = Arc::new(state);
    let resolver = Arc::clone(&shared.resolver);
    let app = build_router(shared);
    let listener = bind_listener(addr).await?;
    info!("IPFS gateway listening on {}", listener.local_addr()?);
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("gateway server terminated unexpectedly");

    // Removal tasks die with the runtime; clear what they still owe.
    let removed = resolver.purge_staged();
    if removed > 0 {
        info!("Removed {} staged files on shutdown", removed);
    }
    served
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind gateway listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind gateway listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/:cid", get(handle_get_cid))
        .fallback(handle_not_found)
        .layer(middleware::from_fn(cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Permissive CORS on every response; preflight requests never reach a handler.
async fn cors(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
    response
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: "ipfs-gateway",
        version: env!("CARGO_PKG_VERSION"),
        commit: option_env!("GIT_COMMIT_HASH").unwrap_or("unknown"),
        node_url: state.node_url.clone(),
        uptime_secs: state.uptime_seconds(),
    })
}

async fn handle_get_cid(
    State(state): State<SharedState>,
    AxumPath(cid): AxumPath<String>,
) -> Result<Response, ApiError> {
    let resolution = state.resolver.resolve(&cid).await.map_err(|err| {
        error!(
            "Error processing CID {} ({} stage): {}",
            err.cid(),
            err.stage(),
            err
        );
        ApiError::internal(err.to_string())
    })?;

    resolution_response(resolution).map_err(|err| {
        error!("Error building response for CID {}: {}", cid, err.message);
        err
    })
}

async fn handle_not_found() -> ApiError {
    ApiError::not_found("not found")
}

fn resolution_response(resolution: Resolution) -> Result<Response, ApiError> {
    let Resolution { metadata, payload } = resolution;

    let mut headers = HeaderMap::new();
    insert_header(&mut headers, X_CID, &metadata.cid)?;
    insert_header(&mut headers, X_FILE_NAME, &metadata.name)?;
    insert_header(&mut headers, X_SIZE, &metadata.size.to_string())?;
    insert_header(&mut headers, X_CONTENT_TYPE, &metadata.content_type)?;
    insert_header(
        &mut headers,
        header::CONTENT_DISPOSITION,
        &format!("inline; filename=\"{}\"", metadata.name),
    )?;
    insert_header(&mut headers, header::CONTENT_TYPE, &metadata.content_type)?;

    Ok((StatusCode::OK, headers, Body::from(payload)).into_response())
}

fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) -> Result<(), ApiError> {
    let value = HeaderValue::from_str(value)
        .map_err(|err| ApiError::internal(format!("invalid {name} header value: {err}")))?;
    headers.insert(name, value);
    Ok(())
}
