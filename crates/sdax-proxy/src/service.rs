//! Router and request handlers.

use std::io::Read as _;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use flate2::read::GzDecoder;
use http::header::{HeaderValue, CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use http::StatusCode;
use sdax_engine::{Engine, IngestQueue};
use tracing::{debug, warn};

use crate::{headers, ProxyError, UpstreamClient};

/// Largest client request body the proxy will buffer.
const MAX_REQUEST_BODY: usize = 1024 * 1024;

/// Proxy behavior knobs.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Content-type prefixes eligible for ingestion and delta encoding
    pub content_types: Vec<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            content_types: vec!["text/html".to_string()],
        }
    }
}

/// Shared state handed to every handler.
pub struct ProxyState {
    /// The dictionary engine
    pub engine: Arc<Engine>,
    /// Ingest queue drained by the engine's workers
    pub queue: Arc<IngestQueue>,
    /// Origin client
    pub upstream: UpstreamClient,
    /// Behavior knobs
    pub config: ProxyConfig,
}

/// Builds the proxy router: the dictionary endpoint plus a fallback
/// that forwards everything else to the origin.
pub fn build_router(state: Arc<ProxyState>) -> Router {
    Router::new()
        .route("/_dictionary/{origin}/{name}", get(serve_dictionary))
        .fallback(proxy)
        .with_state(state)
}

/// `GET /_dictionary/<host>:<port>/<dict-name>` - the dictionary
/// download: header block then content block.
async fn serve_dictionary(
    State(state): State<Arc<ProxyState>>,
    Path((origin, name)): Path<(String, String)>,
) -> Response {
    let config = state.engine.config();
    let ours = format!("{}:{}", config.domain, config.port);
    if origin != ours {
        return not_found();
    }

    let payload = match state.engine.dictionary_payload(&name) {
        Ok(Some(payload)) => payload,
        Ok(None) => return not_found(),
        Err(error) => {
            warn!(%error, %name, "failed to load dictionary");
            return not_found();
        }
    };

    debug!(%name, bytes = payload.len(), "serving dictionary");
    response_builder(StatusCode::OK)
        .header(CONTENT_TYPE, sdax_core::DICTIONARY_CONTENT_TYPE)
        .header(CONTENT_LENGTH, payload.len())
        .body(Body::from(payload))
        .unwrap_or_else(|_| plain_status(StatusCode::INTERNAL_SERVER_ERROR))
}

/// Fallback handler: forward to the origin, learn from the response,
/// and delta-encode it when the client holds the current dictionary.
async fn proxy(State(state): State<Arc<ProxyState>>, request: Request) -> Response {
    match forward_and_encode(&state, request).await {
        Ok(response) => response,
        Err(error) => {
            warn!(%error, "proxy request failed");
            plain_status(StatusCode::BAD_GATEWAY)
        }
    }
}

async fn forward_and_encode(
    state: &ProxyState,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let request_body = axum::body::to_bytes(body, MAX_REQUEST_BODY).await?;

    let wants_sdch = headers::accepts_sdch(&parts.headers);
    let advertised = headers::advertised_client_id(&parts.headers);

    let origin = state
        .upstream
        .forward(parts.method, &parts.uri, &parts.headers, request_body)
        .await?;

    let mut builder = response_builder(origin.status);
    if let Some(headers_mut) = builder.headers_mut() {
        headers::copy_end_to_end(headers_mut, &origin.headers);
        if let Some(path) = state.engine.get_dictionary_path() {
            if let Ok(value) = HeaderValue::from_str(&path) {
                headers_mut.insert(sdax_core::GET_DICTIONARY, value);
            }
        }
    }

    // Only gated content types feed the engine or get delta-encoded.
    if !headers::content_type_gated(&origin.headers, &state.config.content_types) {
        return Ok(builder
            .body(Body::from(origin.body))
            .unwrap_or_else(|_| plain_status(StatusCode::INTERNAL_SERVER_ERROR)));
    }

    // Work on the inflated form when the origin compressed it. A body
    // that fails to inflate is passed through untouched and unlearned.
    let work_body = if headers::is_gzip(&origin.headers) {
        match inflate(&origin.body) {
            Ok(inflated) => inflated,
            Err(error) => {
                warn!(%error, "gzip inflate failed, passing body through");
                return Ok(builder
                    .body(Body::from(origin.body))
                    .unwrap_or_else(|_| plain_status(StatusCode::INTERNAL_SERVER_ERROR)));
            }
        }
    } else {
        origin.body.clone()
    };

    // The response does not wait for ingestion.
    state.queue.push(work_body.clone());

    let client_holds_dict = advertised
        .map(|id| state.engine.matches_client_id(&id))
        .unwrap_or(false);

    if wants_sdch && client_holds_dict {
        if let Some(encoded) = state.engine.encode_body(&work_body).await {
            if let Some(headers_mut) = builder.headers_mut() {
                headers_mut.remove(CONTENT_ENCODING);
                headers_mut.insert(
                    CONTENT_ENCODING,
                    HeaderValue::from_static(sdax_core::SDCH_ENCODING),
                );
            }
            return Ok(builder
                .body(Body::from(encoded.bytes))
                .unwrap_or_else(|_| plain_status(StatusCode::INTERNAL_SERVER_ERROR)));
        }
    }

    Ok(builder
        .body(Body::from(origin.body))
        .unwrap_or_else(|_| plain_status(StatusCode::INTERNAL_SERVER_ERROR)))
}

fn inflate(body: &[u8]) -> std::io::Result<Bytes> {
    let mut decoder = GzDecoder::new(body);
    let mut inflated = Vec::new();
    decoder.read_to_end(&mut inflated)?;
    Ok(Bytes::from(inflated))
}

/// Every proxy response marks itself as not-to-be-encoded so a
/// self-intercepting deployment cannot loop.
fn response_builder(status: StatusCode) -> http::response::Builder {
    Response::builder()
        .status(status)
        .header(sdax_core::X_SDCH_ENCODE, "0")
}

fn not_found() -> Response {
    plain_status(StatusCode::NOT_FOUND)
}

fn plain_status(status: StatusCode) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    if let Ok(value) = HeaderValue::from_str("0") {
        response.headers_mut().insert(sdax_core::X_SDCH_ENCODE, value);
    }
    response
}
