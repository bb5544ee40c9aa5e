//! Sdax Core - Identity types and dictionary format primitives.
//!
//! This crate provides:
//! - `ChunkHash` - SHA-1 identity of a content-defined chunk
//! - `DictHash` - SHA-256 identity of a shared dictionary, with its
//!   derived wire identifiers (server id, client id, file name)
//! - The SDCH dictionary header block (build and parse)

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod header;
pub mod identity;

pub use header::{DictHeader, HeaderParseError};
pub use identity::{decode_wire_id, ChunkHash, DictHash, DictHasher, IdentityError};

/// Header advertising the dictionary download URL on proxied responses.
pub const GET_DICTIONARY: &str = "get-dictionary";

/// Request header listing dictionaries the client already holds.
pub const AVAIL_DICTIONARY: &str = "avail-dictionary";

/// Marker header telling intermediaries not to sdch-encode a response.
pub const X_SDCH_ENCODE: &str = "x-sdch-encode";

/// Content type of a dictionary download.
pub const DICTIONARY_CONTENT_TYPE: &str = "application/x-sdch-dictionary";

/// The `Content-Encoding` token for delta-encoded responses.
pub const SDCH_ENCODING: &str = "sdch";
