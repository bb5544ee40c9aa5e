//! The VCDIFF codec capability.
//!
//! The engine treats delta compression as a black box with two
//! operations: `encode(dict, body) -> delta` and
//! `patch(dict, delta) -> body`. The default implementation shells out
//! to a `vcdiff` binary (open-vcdiff's CLI); any library exposing the
//! same contract can stand in.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Errors from codec invocations.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The codec process could not be spawned or piped
    #[error("codec io: {0}")]
    Io(#[from] std::io::Error),

    /// The codec ran but reported failure
    #[error("codec exited with {status}: {stderr}")]
    Failed {
        /// Process exit status
        status: std::process::ExitStatus,
        /// Captured standard error
        stderr: String,
    },
}

/// Delta codec over a dictionary file.
#[async_trait]
pub trait Codec: Send + Sync {
    /// Encodes `body` as a delta against the dictionary at `dict_path`.
    async fn encode(&self, dict_path: &Path, body: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Applies `delta` against the dictionary at `dict_path`,
    /// reproducing the original body.
    async fn patch(&self, dict_path: &Path, delta: &[u8]) -> Result<Vec<u8>, CodecError>;
}

/// Codec that drives an external `vcdiff` binary.
///
/// Encoding uses the interleaved format with checksums, matching what
/// SDCH-capable clients expect inside the framed payload.
pub struct VcdiffCodec {
    program: PathBuf,
}

impl VcdiffCodec {
    /// Uses `vcdiff` from `PATH`.
    pub fn new() -> Self {
        Self::with_program("vcdiff")
    }

    /// Uses an explicit binary path.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str], input: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin from its own task so a large body cannot deadlock
        // against a filling stdout pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = input.to_vec();
            tokio::spawn(async move {
                stdin.write_all(&input).await?;
                stdin.shutdown().await
            })
        });

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(CodecError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                Ok(Err(error)) => return Err(error.into()),
                Err(join_error) => {
                    return Err(CodecError::Io(std::io::Error::other(join_error)))
                }
            }
        }
        debug!(
            bytes_in = input.len(),
            bytes_out = output.stdout.len(),
            "codec run complete"
        );
        Ok(output.stdout)
    }
}

impl Default for VcdiffCodec {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Codec for VcdiffCodec {
    async fn encode(&self, dict_path: &Path, body: &[u8]) -> Result<Vec<u8>, CodecError> {
        let dict = dict_path.to_string_lossy();
        self.run(
            &[
                "encode",
                "-dictionary",
                dict.as_ref(),
                "-interleaved",
                "-checksum",
            ],
            body,
        )
        .await
    }

    async fn patch(&self, dict_path: &Path, delta: &[u8]) -> Result<Vec<u8>, CodecError> {
        let dict = dict_path.to_string_lossy();
        self.run(&["patch", "-dictionary", dict.as_ref()], delta).await
    }
}

/// Test doubles for code that needs a codec but no `vcdiff` binary.
pub mod testing {
    use super::*;

    /// Codec returning preconfigured bytes, or failing on demand.
    pub struct FixedCodec {
        /// Bytes `encode` returns
        pub encoded: Vec<u8>,
        /// Bytes `patch` returns
        pub patched: Vec<u8>,
        /// When true, both operations fail
        pub fail: bool,
    }

    impl FixedCodec {
        /// A codec whose encode output is `encoded` and whose patch
        /// output is `patched`.
        pub fn new(encoded: Vec<u8>, patched: Vec<u8>) -> Self {
            Self {
                encoded,
                patched,
                fail: false,
            }
        }

        /// A codec that fails every call.
        pub fn failing() -> Self {
            Self {
                encoded: Vec::new(),
                patched: Vec::new(),
                fail: true,
            }
        }

        fn check(&self) -> Result<(), CodecError> {
            if self.fail {
                Err(CodecError::Io(std::io::Error::other("forced failure")))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Codec for FixedCodec {
        async fn encode(&self, _dict_path: &Path, _body: &[u8]) -> Result<Vec<u8>, CodecError> {
            self.check()?;
            Ok(self.encoded.clone())
        }

        async fn patch(&self, _dict_path: &Path, _delta: &[u8]) -> Result<Vec<u8>, CodecError> {
            self.check()?;
            Ok(self.patched.clone())
        }
    }
}
