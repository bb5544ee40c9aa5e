//! SDCH header parsing and header hygiene.

use http::header::{HeaderMap, HeaderName, CONTENT_TYPE};
use sdax_core::decode_wire_id;

/// Hop-by-hop headers that must not be forwarded in either direction.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// True when `Accept-Encoding` lists `sdch` (case-insensitive,
/// comma-split, trimmed), across all occurrences of the header.
pub fn accepts_sdch(headers: &HeaderMap) -> bool {
    headers
        .get_all(http::header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("sdch"))
}

/// The six raw bytes of the first `Avail-Dictionary` entry, if present
/// and decodable. Only the first comma-separated entry is inspected.
pub fn advertised_client_id(headers: &HeaderMap) -> Option<[u8; 6]> {
    let value = headers.get(sdax_core::AVAIL_DICTIONARY)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    decode_wire_id(first).ok()
}

/// True when the response `Content-Type` starts with one of the gated
/// type prefixes (parameters like `; charset=` are ignored).
pub fn content_type_gated(headers: &HeaderMap, gated: &[String]) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    gated
        .iter()
        .any(|prefix| content_type.starts_with(prefix.as_str()))
}

/// True when the response is gzip-encoded.
pub fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get_all(http::header::CONTENT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("gzip"))
}

/// True for headers that must not cross the proxy.
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Copies end-to-end headers from `src` into `dst`, skipping
/// hop-by-hop headers, `Content-Length` (recomputed from the body we
/// send), and `Host`.
pub fn copy_end_to_end(dst: &mut HeaderMap, src: &HeaderMap) {
    for (name, value) in src {
        if is_hop_by_hop(name)
            || name == http::header::CONTENT_LENGTH
            || name == http::header::HOST
        {
            continue;
        }
        dst.append(name.clone(), value.clone());
    }
}
