//! Content digests and base64 blobs.
//!
//! Digests are written `algorithm:hex` (e.g. `sha256:a2b1...`). A bare
//! 64-character hex string is accepted as SHA-256, which is how image hashes
//! are usually handed around.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::{STANDARD as BASE64, STANDARD_NO_PAD as BASE64_NO_PAD};
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Digest decoding failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    #[error("unknown digest algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("invalid hex digest: {0}")]
    InvalidHex(String),

    #[error("{algorithm} digest must be {expected} bytes, got {actual}")]
    InvalidLength {
        algorithm: DigestAlgorithm,
        expected: usize,
        actual: usize,
    },

    #[error("invalid base64: {0}")]
    InvalidBase64(String),
}

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl DigestAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }

    /// Output size in bytes.
    pub fn output_len(&self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
            Self::Sha512 => 64,
        }
    }

    pub fn from_name(name: &str) -> Result<Self, DigestError> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            _ => Err(DigestError::UnknownAlgorithm(name.to_string())),
        }
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An immutable content digest. The value length always matches the algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest {
    algorithm: DigestAlgorithm,
    value: Vec<u8>,
}

impl ContentDigest {
    pub fn new(algorithm: DigestAlgorithm, value: Vec<u8>) -> Result<Self, DigestError> {
        if value.len() != algorithm.output_len() {
            return Err(DigestError::InvalidLength {
                algorithm,
                expected: algorithm.output_len(),
                actual: value.len(),
            });
        }
        Ok(Self { algorithm, value })
    }

    /// SHA-256 of `bytes`.
    pub fn sha256_of(bytes: &[u8]) -> Self {
        Self {
            algorithm: DigestAlgorithm::Sha256,
            value: sha256(bytes).to_vec(),
        }
    }

    /// Build from an algorithm name and a hex value (the log's wire shape).
    pub fn from_parts(algorithm: &str, hex_value: &str) -> Result<Self, DigestError> {
        let algorithm = DigestAlgorithm::from_name(algorithm)?;
        let value = hex::decode(hex_value.trim())
            .map_err(|e| DigestError::InvalidHex(format!("{}: {}", hex_value, e)))?;
        Self::new(algorithm, value)
    }

    /// Parse `algorithm:hex`, or bare hex as SHA-256.
    pub fn parse(input: &str) -> Result<Self, DigestError> {
        let input = input.trim();
        match input.split_once(':') {
            Some((algorithm, value)) => Self::from_parts(algorithm, value),
            None => Self::from_parts("sha256", input),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }

    /// Lowercase hex of the value, without the algorithm prefix.
    pub fn hex(&self) -> String {
        hex::encode(&self.value)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex())
    }
}

impl FromStr for ContentDigest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ContentDigest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContentDigest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// SHA-256 of `bytes` as a fixed array.
pub(crate) fn sha256(bytes: &[u8]) -> [u8; 32] {
    let digest = Sha256::digest(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Decode standard base64, tolerating missing padding.
pub fn decode_base64(input: &str) -> Result<Vec<u8>, DigestError> {
    let input = input.trim();
    BASE64
        .decode(input)
        .or_else(|_| BASE64_NO_PAD.decode(input.trim_end_matches('=')))
        .map_err(|e| DigestError::InvalidBase64(e.to_string()))
}

/// Encode as standard padded base64.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}
