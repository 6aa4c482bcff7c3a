//! HTTP router for conda-firewall
//!
//! Every request goes through a single fallback handler that decides
//! between three outcomes:
//! - `GET /{channel}/{subdir}/repodata.json` serves the filtered catalog
//! - any other `GET` is checked against the filename index and forwarded
//!   to the upstream host
//! - anything else is rejected
//!
//! Rejections never carry detail: 400 for a wrong method, 404 for anything
//! unknown or disallowed, 500 for upstream or local failures.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::io::ReaderStream;

use crate::config::Config;
use crate::error::ProxyError;
use crate::models::{NameSet, REPODATA_FILENAME};

use super::middleware::{logging_middleware, tracing_middleware};
use super::ServerError;

/// Headers that describe a single connection and must not be forwarded
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Shared application state
///
/// Everything here is read-only for the lifetime of the process.
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration
    pub config: Arc<Config>,

    /// Admitted `channel/subdir/filename` entries; `None` disables the check
    pub allowed_filenames: Option<Arc<NameSet>>,

    /// Client used to forward package downloads
    pub client: reqwest::Client,
}

impl AppState {
    /// Build state with a forwarding client bounded by the proxy timeout
    pub fn new(config: Arc<Config>, allowed_filenames: Option<NameSet>) -> Result<Self, ServerError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream.proxy_timeout_secs))
            .build()
            .map_err(|e| ServerError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            allowed_filenames: allowed_filenames.map(Arc::new),
            client,
        })
    }
}

/// How a request path is handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyRoute<'a> {
    /// Exactly three segments ending in `.json`
    Metadata {
        channel: &'a str,
        subdir: &'a str,
        filename: &'a str,
    },
    /// Anything else, keyed by the path without its leading slash
    Package { key: &'a str },
}

/// Classify a request path; `None` for paths not starting with `/`
pub fn classify(path: &str) -> Option<ProxyRoute<'_>> {
    let key = path.strip_prefix('/')?;

    let segments: Vec<&str> = key.split('/').collect();
    if let &[channel, subdir, filename] = segments.as_slice() {
        if !channel.is_empty()
            && !subdir.is_empty()
            && !filename.is_empty()
            && filename.ends_with(".json")
        {
            return Some(ProxyRoute::Metadata {
                channel,
                subdir,
                filename,
            });
        }
    }

    Some(ProxyRoute::Package { key })
}

/// Build the main application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .fallback(gatekeeper_handler)
        .layer(middleware::from_fn(logging_middleware))
        .layer(middleware::from_fn(tracing_middleware))
        .with_state(state)
}

// =============================================================================
// Handlers
// =============================================================================

async fn gatekeeper_handler(State(state): State<AppState>, method: Method, uri: Uri) -> Response {
    if method != Method::GET {
        tracing::debug!(method = %method, "Rejecting non-GET request");
        return bad_request();
    }

    // Lookups use the decoded path; forwarding keeps the raw one
    let raw_path = uri.path();
    let path = match urlencoding::decode(raw_path) {
        Ok(path) => path,
        Err(_) => {
            tracing::debug!(path = %raw_path, "Rejecting path that is not valid UTF-8");
            return not_found();
        }
    };

    match classify(&path) {
        Some(ProxyRoute::Metadata {
            channel,
            subdir,
            filename,
        }) => serve_metadata(&state, channel, subdir, filename).await,
        Some(ProxyRoute::Package { key }) => {
            if let Some(allowed) = &state.allowed_filenames {
                if !allowed.contains(key) {
                    tracing::info!(path = %path, "Blocked package file not in filename index");
                    return not_found();
                }
            }
            match forward(&state, raw_path).await {
                Ok(response) => response,
                Err(e) => e.into_response(),
            }
        }
        None => not_found(),
    }
}

async fn serve_metadata(state: &AppState, channel: &str, subdir: &str, filename: &str) -> Response {
    if filename != REPODATA_FILENAME {
        tracing::debug!(filename = %filename, "Rejecting non-canonical metadata file");
        return not_found();
    }
    if !state.config.has_subdir(channel, subdir) {
        tracing::debug!(channel = %channel, subdir = %subdir, "Unknown channel or subdir");
        return not_found();
    }

    let path = state.config.filtered_repodata_path(channel, subdir);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Filtered catalog missing");
            return not_found();
        }
        Err(e) => return ProxyError::Io(e).into_response(),
    };
    let length = match file.metadata().await {
        Ok(metadata) => metadata.len(),
        Err(e) => return ProxyError::Io(e).into_response(),
    };

    let max_age = state.config.cache_control_max_age_minutes.saturating_mul(60);
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
            (header::CACHE_CONTROL, format!("max-age={}", max_age)),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response()
}

/// Forward a GET to the upstream host and stream the answer back
async fn forward(state: &AppState, path: &str) -> Result<Response, ProxyError> {
    let url = format!("{}{}", state.config.upstream_host(), path);
    tracing::debug!(url = %url, "Forwarding request upstream");

    let upstream = state.client.get(&url).send().await?;
    let status = upstream.status();
    let headers = end_to_end_headers(upstream.headers());

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Copy every header except the hop-by-hop ones
fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) {
            out.append(name.clone(), value.clone());
        }
    }
    out
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

fn bad_request() -> Response {
    (StatusCode::BAD_REQUEST, "Bad Request").into_response()
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Proxy request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, "Server Error").into_response()
    }
}
