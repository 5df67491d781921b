//! Hex-encoded content digests as they appear in registry paths.

use std::{fmt, str::FromStr};
use thiserror::Error;

pub const SHA256: &str = "sha256";

const SHA256_RAW_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum DigestError {
    #[error("digest is not hex: {0}")]
    NotHex(#[from] hex::FromHexError),
    #[error("unsupported digest algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("digest has {0} raw bytes, want {SHA256_RAW_LEN}")]
    WrongLength(usize),
    #[error("digest is missing the algorithm prefix")]
    MissingAlgorithm,
}

/// A content digest, serialized as `sha256:<hex>`. Blobs are stored under
/// the bare hex string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    algo: String,
    hex: String,
}

impl Digest {
    pub fn new(algo: &str, hex_str: &str) -> Result<Digest, DigestError> {
        if algo != SHA256 {
            return Err(DigestError::UnsupportedAlgorithm(algo.to_owned()));
        }
        let raw = hex::decode(hex_str)?;
        if raw.len() != SHA256_RAW_LEN {
            return Err(DigestError::WrongLength(raw.len()));
        }
        Ok(Digest {
            algo: algo.to_owned(),
            hex: hex_str.to_lowercase(),
        })
    }

    pub fn algo(&self) -> &str {
        &self.algo
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    /// First two hex characters; registry paths shard blobs by this byte.
    pub fn shard_prefix(&self) -> &str {
        &self.hex[..2]
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algo, self.hex)
    }
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (algo, hex_str) = value
            .split_once(':')
            .ok_or(DigestError::MissingAlgorithm)?;
        Digest::new(algo, hex_str)
    }
}
