//! Chunk and dictionary identity types.
//!
//! A chunk is identified by the SHA-1 of its content. A dictionary is
//! identified by the SHA-256 of its header block followed by its content
//! block; every identifier exchanged on the wire derives from that one
//! hash:
//!
//! - `server id`  = base64url(hash[0..6]), 8 chars, prepended to encoded
//!   response bodies
//! - `client id`  = base64url(hash[6..12]), 8 chars, advertised by
//!   clients in `Avail-Dictionary`
//! - `name`       = hex(hash), 64 chars, the on-disk file name and the
//!   last segment of the download URL

use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha1::{Digest as _, Sha1};
use sha2::Sha256;
use thiserror::Error;

/// Errors converting wire or file representations into identities.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Hex decoding failed
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Base64 decoding failed
    #[error("invalid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    /// Decoded value had the wrong length
    #[error("invalid length: expected {expected}, got {got}")]
    InvalidLength {
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        got: usize,
    },
}

/// SHA-1 identity of a chunk's content (20 bytes).
///
/// `Ord` is lexicographic over the raw bytes; the chunk store's priority
/// order sorts ties by descending `ChunkHash`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkHash(pub [u8; 20]);

impl ChunkHash {
    /// Hashes chunk content.
    pub fn of(content: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(content);
        Self(hasher.finalize().into())
    }

    /// Returns the inner bytes.
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns as a hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses from a 40-char hex string.
    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(s)?;
        let got = bytes.len();
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| IdentityError::InvalidLength { expected: 20, got })
    }
}

impl fmt::Debug for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChunkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for ChunkHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// SHA-256 identity of a dictionary (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DictHash(pub [u8; 32]);

impl DictHash {
    /// Computes the identity of a dictionary from its two blocks.
    pub fn of_parts(header: &[u8], content: &[u8]) -> Self {
        let mut hasher = DictHasher::new();
        hasher.update(header);
        hasher.update(content);
        hasher.finish()
    }

    /// Returns the inner bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The six raw bytes of the server half, `hash[0..6]`.
    pub fn server_id_bytes(&self) -> [u8; 6] {
        self.0[0..6].try_into().unwrap_or([0; 6])
    }

    /// The six raw bytes of the client half, `hash[6..12]`.
    pub fn client_id_bytes(&self) -> [u8; 6] {
        self.0[6..12].try_into().unwrap_or([0; 6])
    }

    /// The 8-char server id prepended to encoded payloads.
    pub fn server_id(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.server_id_bytes())
    }

    /// The 8-char client id clients advertise in `Avail-Dictionary`.
    pub fn client_id(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.client_id_bytes())
    }

    /// The dictionary file name: lowercase hex of the full hash.
    pub fn name(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a dictionary name (64 hex chars) back into the hash.
    pub fn from_name(name: &str) -> Result<Self, IdentityError> {
        let bytes = hex::decode(name)?;
        let got = bytes.len();
        bytes
            .try_into()
            .map(Self)
            .map_err(|_| IdentityError::InvalidLength { expected: 32, got })
    }
}

/// Incremental dictionary identity hasher.
///
/// Feed the header block then the content block in order; the result is
/// identical to [`DictHash::of_parts`] over the concatenation. Used by
/// the synthesizer to hash chunk contents as they stream by.
#[derive(Default)]
pub struct DictHasher(Sha256);

impl DictHasher {
    /// Creates an empty hasher.
    pub fn new() -> Self {
        Self(Sha256::new())
    }

    /// Absorbs the next run of bytes.
    pub fn update(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    /// Finalizes into the dictionary identity.
    pub fn finish(self) -> DictHash {
        DictHash(self.0.finalize().into())
    }
}

/// Decodes an 8-char base64url wire id into its six raw bytes.
pub fn decode_wire_id(id: &str) -> Result<[u8; 6], IdentityError> {
    let bytes = URL_SAFE_NO_PAD.decode(id.trim_end_matches('='))?;
    let got = bytes.len();
    bytes
        .try_into()
        .map_err(|_| IdentityError::InvalidLength { expected: 6, got })
}

impl fmt::Debug for DictHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DictHash({})", &self.name()[..16])
    }
}

impl fmt::Display for DictHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.name()[..16])
    }
}

impl AsRef<[u8]> for DictHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
