//! Sdax Proxy - the SDCH protocol surface over HTTP.
//!
//! An intercepting reverse proxy in front of one origin. Every response
//! flows through the dictionary engine: eligible bodies are enqueued
//! for ingestion, and when a client advertises the current dictionary
//! the body is served as a VCDIFF delta instead of verbatim. The proxy
//! also serves dictionary downloads under `/_dictionary/`.
//!
//! Failure anywhere on this path degrades to forwarding the origin's
//! bytes unchanged; a client that never heard of SDCH sees a plain
//! reverse proxy.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod headers;
mod service;
pub mod upstream;

pub use service::{build_router, ProxyConfig, ProxyState};
pub use upstream::{UpstreamClient, UpstreamResponse};

use thiserror::Error;

/// Errors on the proxy path.
///
/// These are logged and mapped to a plain 502; they never carry origin
/// bytes.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The origin request failed
    #[error("upstream: {0}")]
    Upstream(#[from] reqwest::Error),

    /// The client request body could not be read
    #[error("request body: {0}")]
    RequestBody(#[from] axum::Error),
}
