//! The SDCH dictionary header block.
//!
//! A dictionary download is the ASCII header block followed by the raw
//! content block. The header is a fixed sequence of `Name: value` lines
//! terminated by a blank line:
//!
//! ```text
//! Domain: example.org
//! Path: /
//! Format-Version: 1.0
//! Port: 8080
//! Max-Age: 86400
//! ```
//!
//! Both the build and parse sides must agree byte-for-byte because the
//! dictionary identity hash covers the header block.

use bytes::Bytes;
use thiserror::Error;

/// Format version this implementation emits and accepts.
pub const FORMAT_VERSION: &str = "1.0";

/// Dictionary lifetime advertised to clients, in seconds.
pub const MAX_AGE_SECS: u32 = 86400;

/// Errors parsing a dictionary header block.
#[derive(Debug, Error)]
pub enum HeaderParseError {
    /// The blank-line terminator was missing
    #[error("unterminated header block")]
    Unterminated,

    /// A header line had no `: ` separator
    #[error("malformed header line: {0:?}")]
    MalformedLine(String),

    /// The header block was not ASCII text
    #[error("header block is not ascii")]
    NotAscii,

    /// A required field was absent
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// The `Format-Version` field was not one we understand
    #[error("unsupported format version: {0:?}")]
    UnsupportedVersion(String),

    /// The `Port` field was not a valid port number
    #[error("invalid port: {0:?}")]
    InvalidPort(String),
}

/// Parsed form of a dictionary header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictHeader {
    /// Origin host the dictionary applies to
    pub domain: String,
    /// Origin port
    pub port: u16,
}

impl DictHeader {
    /// Creates a header for the given origin.
    pub fn new(domain: impl Into<String>, port: u16) -> Self {
        Self {
            domain: domain.into(),
            port,
        }
    }

    /// Renders the exact header block bytes, including the terminating
    /// blank line.
    pub fn to_bytes(&self) -> Bytes {
        let text = format!(
            "Domain: {}\nPath: /\nFormat-Version: {}\nPort: {}\nMax-Age: {}\n\n",
            self.domain, FORMAT_VERSION, self.port, MAX_AGE_SECS,
        );
        Bytes::from(text)
    }

    /// Parses a header block (without content) back into its fields.
    ///
    /// Unknown fields are ignored so newer writers remain readable.
    pub fn parse(block: &[u8]) -> Result<Self, HeaderParseError> {
        let text = std::str::from_utf8(block).map_err(|_| HeaderParseError::NotAscii)?;
        if !text.is_ascii() {
            return Err(HeaderParseError::NotAscii);
        }

        let mut domain = None;
        let mut port = None;
        let mut version = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(": ")
                .ok_or_else(|| HeaderParseError::MalformedLine(line.to_string()))?;
            match name {
                "Domain" => domain = Some(value.to_string()),
                "Port" => {
                    port = Some(
                        value
                            .parse::<u16>()
                            .map_err(|_| HeaderParseError::InvalidPort(value.to_string()))?,
                    )
                }
                "Format-Version" => version = Some(value.to_string()),
                _ => {}
            }
        }

        match version {
            Some(v) if v == FORMAT_VERSION => {}
            Some(v) => return Err(HeaderParseError::UnsupportedVersion(v)),
            None => return Err(HeaderParseError::MissingField("Format-Version")),
        }

        Ok(Self {
            domain: domain.ok_or(HeaderParseError::MissingField("Domain"))?,
            port: port.ok_or(HeaderParseError::MissingField("Port"))?,
        })
    }

    /// Splits a full dictionary download into `(header, content)` at the
    /// blank line and parses the header.
    pub fn split_download(bytes: &[u8]) -> Result<(Self, &[u8], &[u8]), HeaderParseError> {
        let pos = bytes
            .windows(2)
            .position(|w| w == b"\n\n")
            .ok_or(HeaderParseError::Unterminated)?;
        let header_block = &bytes[..pos + 2];
        let content = &bytes[pos + 2..];
        let header = Self::parse(header_block)?;
        Ok((header, header_block, content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_exact_block() {
        let header = DictHeader::new("example.org", 8080);
        let expected = b"Domain: example.org\nPath: /\nFormat-Version: 1.0\nPort: 8080\nMax-Age: 86400\n\n";
        assert_eq!(header.to_bytes().as_ref(), expected.as_slice());
    }

    #[test]
    fn parse_roundtrip() {
        let header = DictHeader::new("en.wikipedia.org", 443);
        let parsed = DictHeader::parse(&header.to_bytes()).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn split_download_separates_blocks() {
        let header = DictHeader::new("example.org", 80);
        let mut download = header.to_bytes().to_vec();
        download.extend_from_slice(b"dictionary content bytes");

        let (parsed, block, content) = DictHeader::split_download(&download).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(block, header.to_bytes().as_ref());
        assert_eq!(content, b"dictionary content bytes");
    }

    #[test]
    fn rejects_unterminated_block() {
        let err = DictHeader::split_download(b"Domain: x\nPort: 80").unwrap_err();
        assert!(matches!(err, HeaderParseError::Unterminated));
    }

    #[test]
    fn rejects_wrong_version() {
        let block = b"Domain: x\nPath: /\nFormat-Version: 2.0\nPort: 80\nMax-Age: 86400\n\n";
        let err = DictHeader::parse(block).unwrap_err();
        assert!(matches!(err, HeaderParseError::UnsupportedVersion(_)));
    }

    #[test]
    fn rejects_missing_domain() {
        let block = b"Path: /\nFormat-Version: 1.0\nPort: 80\nMax-Age: 86400\n\n";
        let err = DictHeader::parse(block).unwrap_err();
        assert!(matches!(err, HeaderParseError::MissingField("Domain")));
    }

    #[test]
    fn rejects_bad_port() {
        let block = b"Domain: x\nPath: /\nFormat-Version: 1.0\nPort: http\nMax-Age: 86400\n\n";
        let err = DictHeader::parse(block).unwrap_err();
        assert!(matches!(err, HeaderParseError::InvalidPort(_)));
    }
}
