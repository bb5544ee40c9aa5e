//! SDCH payload framing around the codec.
//!
//! An encoded response body is the 8-char base64url server id, one NUL
//! byte, then the VCDIFF stream. The server side frames; the client
//! side parses the frame, checks that the advertised dictionary is the
//! one it holds, and patches.

use std::path::Path;

use bytes::Bytes;
use sdax_core::{decode_wire_id, DictHash};

use crate::codec::{Codec, CodecError};

/// Length of the base64url server id prefix.
pub const SERVER_ID_LEN: usize = 8;

/// A delta-encoded body accepted for serving.
#[derive(Debug, Clone)]
pub struct EncodedBody {
    /// The framed payload: server id, NUL, VCDIFF stream
    pub bytes: Bytes,
    /// Bytes saved relative to the original
    pub saved: u64,
}

/// Encodes and frames a body against a dictionary.
///
/// The caller applies the acceptance rule (`encoded < original`); this
/// only builds the payload.
pub async fn encode_framed(
    codec: &dyn Codec,
    dict_path: &Path,
    dict_hash: &DictHash,
    body: &[u8],
) -> Result<Vec<u8>, CodecError> {
    let delta = codec.encode(dict_path, body).await?;
    let server_id = dict_hash.server_id();
    let mut framed = Vec::with_capacity(server_id.len() + 1 + delta.len());
    framed.extend_from_slice(server_id.as_bytes());
    framed.push(0);
    framed.extend_from_slice(&delta);
    Ok(framed)
}

/// Result of a client-side decode attempt.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// The payload was ours; the patched body
    Decoded(Bytes),
    /// The payload names a dictionary we do not hold (or is not framed
    /// at all); forward it unchanged
    NotOurs,
}

/// Client-side decode of a framed payload.
///
/// Reads the id prefix up to the first NUL and compares it against the
/// server half of the held dictionary's hash. Anything malformed means
/// the payload is not for us and is forwarded unchanged; only a genuine
/// patch failure surfaces as an error.
pub async fn decode_framed(
    codec: &dyn Codec,
    dict_path: &Path,
    dict_hash: &DictHash,
    body: &[u8],
) -> Result<DecodeOutcome, CodecError> {
    let Some(nul) = body.iter().position(|&b| b == 0) else {
        return Ok(DecodeOutcome::NotOurs);
    };
    let Ok(prefix) = std::str::from_utf8(&body[..nul]) else {
        return Ok(DecodeOutcome::NotOurs);
    };
    let Ok(advertised) = decode_wire_id(prefix) else {
        return Ok(DecodeOutcome::NotOurs);
    };
    if advertised != dict_hash.server_id_bytes() {
        return Ok(DecodeOutcome::NotOurs);
    }

    let patched = codec.patch(dict_path, &body[nul + 1..]).await?;
    Ok(DecodeOutcome::Decoded(Bytes::from(patched)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::testing::FixedCodec;

    fn dict() -> DictHash {
        DictHash::of_parts(b"Domain: t\n\n", b"dictionary content")
    }

    #[tokio::test]
    async fn frame_layout() {
        let codec = FixedCodec::new(b"DELTA".to_vec(), Vec::new());
        let hash = dict();
        let framed = encode_framed(&codec, Path::new("unused"), &hash, b"body")
            .await
            .unwrap();

        assert_eq!(&framed[..SERVER_ID_LEN], hash.server_id().as_bytes());
        assert_eq!(framed[SERVER_ID_LEN], 0);
        assert_eq!(&framed[SERVER_ID_LEN + 1..], b"DELTA");
    }

    #[tokio::test]
    async fn decode_accepts_matching_server_id() {
        let hash = dict();
        let original = b"the original body".to_vec();
        let codec = FixedCodec::new(Vec::new(), original.clone());

        let mut framed = hash.server_id().into_bytes();
        framed.push(0);
        framed.extend_from_slice(b"vcdiff-stream");

        match decode_framed(&codec, Path::new("unused"), &hash, &framed)
            .await
            .unwrap()
        {
            DecodeOutcome::Decoded(body) => assert_eq!(body.as_ref(), original.as_slice()),
            DecodeOutcome::NotOurs => panic!("should have decoded"),
        }
    }

    #[tokio::test]
    async fn decode_rejects_foreign_server_id() {
        let hash = dict();
        let codec = FixedCodec::new(Vec::new(), b"should not appear".to_vec());

        let mut framed = b"AAAAAAAA".to_vec();
        framed.push(0);
        framed.extend_from_slice(b"vcdiff-stream");

        assert!(matches!(
            decode_framed(&codec, Path::new("unused"), &hash, &framed)
                .await
                .unwrap(),
            DecodeOutcome::NotOurs
        ));
    }

    #[tokio::test]
    async fn decode_forwards_unframed_payload() {
        let hash = dict();
        let codec = FixedCodec::new(Vec::new(), Vec::new());

        assert!(matches!(
            decode_framed(&codec, Path::new("unused"), &hash, b"plain body, no nul at all?")
                .await
                .unwrap(),
            DecodeOutcome::NotOurs
        ));
    }

    #[tokio::test]
    async fn patch_failure_propagates() {
        let hash = dict();
        let codec = FixedCodec::failing();

        let mut framed = hash.server_id().into_bytes();
        framed.push(0);
        framed.extend_from_slice(b"delta");

        assert!(decode_framed(&codec, Path::new("unused"), &hash, &framed)
            .await
            .is_err());
    }
}
