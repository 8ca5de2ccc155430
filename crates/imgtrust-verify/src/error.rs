//! Error types for image verification.
//!
//! Errors split into two families:
//!
//! - Candidate errors (`DecodeError`, `ProofError`, `SigError`, and the
//!   cross-check failures in [`CandidateError`]) reject a single log entry or
//!   signature. They are accumulated in the verification result.
//! - [`VerifyError`] aborts the whole call (transport failure, deadline).

use std::time::Duration;

use serde::Serialize;

use crate::types::Stage;

/// Log entry body could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DecodeError {
    /// Structural problem in an entry of a supported kind.
    #[error("malformed entry: {reason}")]
    Malformed { reason: String },

    /// Entry kind is not an attestation kind we decode.
    #[error("unsupported entry kind: {kind}")]
    UnsupportedKind { kind: String },

    /// Attestation kind with a schema version we do not decode.
    #[error("unsupported {kind} version: {api_version}")]
    UnsupportedVersion { kind: String, api_version: String },
}

impl DecodeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    /// Whether the entry is simply of another type (skip) rather than broken.
    pub fn is_unsupported(&self) -> bool {
        !matches!(self, Self::Malformed { .. })
    }
}

/// Inclusion proof verification failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProofError {
    /// Proof material is structurally invalid (bad index, bad hash length).
    #[error("malformed inclusion proof: {reason}")]
    Malformed { reason: String },

    /// Recomputed root differs from the attested root.
    #[error("root hash mismatch: expected {expected}, computed {computed}")]
    RootMismatch { expected: String, computed: String },

    /// Signed tree head signature is missing or invalid.
    #[error("bad tree head signature: {reason}")]
    BadSignature { reason: String },

    /// Entry was issued by a log whose key we were not given.
    #[error("entry log id {log_id} does not match the trusted log key")]
    UnknownLog { log_id: String },

    /// Signed entry timestamp is missing or invalid.
    #[error("bad signed entry timestamp: {reason}")]
    BadEntryTimestamp { reason: String },

    /// Bundled log entry does not record the signature it travels with.
    #[error("bundle does not match signature: {reason}")]
    BundleMismatch { reason: String },
}

impl ProofError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }

    pub(crate) fn bad_signature(reason: impl Into<String>) -> Self {
        Self::BadSignature {
            reason: reason.into(),
        }
    }
}

/// Signature or key failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SigError {
    /// Key type or signature encoding does not match a supported algorithm.
    #[error("unsupported algorithm: {reason}")]
    UnsupportedAlgorithm { reason: String },

    /// Key material could not be parsed.
    #[error("invalid public key: {reason}")]
    InvalidKey { reason: String },

    /// Cryptographic verification failed.
    #[error("invalid signature: {reason}")]
    InvalidSignature { reason: String },

    /// Signed payload is not a recognizable claim.
    #[error("malformed payload: {reason}")]
    MalformedPayload { reason: String },
}

impl SigError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidSignature {
            reason: reason.into(),
        }
    }
}

/// Failure reaching the log service or the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransportError {
    /// Resource does not exist.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Authentication failed or token invalid.
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    /// Rate limit exceeded.
    #[error("rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Network error or unexpected status.
    #[error("network error: {message}")]
    Network { message: String },

    /// Response body did not match the expected wire format.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

impl TransportError {
    /// Whether the error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Network { .. })
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Result type for I/O boundary operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Why one candidate (log entry or signature) was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "category", content = "detail", rename_all = "snake_case")]
pub enum CandidateError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Proof(#[from] ProofError),

    #[error(transparent)]
    Signature(#[from] SigError),

    #[error(transparent)]
    Fetch(#[from] TransportError),

    /// Claimed subject digest differs from the digest it was checked against.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    /// Public key embedded in the log entry is not the caller's key.
    #[error("log entry public key does not match the supplied key")]
    LogKeyMismatch,

    /// Log search returned nothing.
    #[error("no log entries found for {digest}")]
    NoLogEntries { digest: String },

    /// Registry holds no signatures for the artifact.
    #[error("no signatures found for {reference}")]
    NoSignatures { reference: String },
}

/// One rejected candidate, with enough context to audit the decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CandidateFailure {
    /// Pipeline stage that rejected the candidate.
    pub stage: Stage,

    /// Log entry identifier, signature index, or the query itself.
    pub candidate: String,

    /// Reason for the rejection.
    pub error: CandidateError,
}

impl CandidateFailure {
    pub fn new(stage: Stage, candidate: impl Into<String>, error: impl Into<CandidateError>) -> Self {
        Self {
            stage,
            candidate: candidate.into(),
            error: error.into(),
        }
    }
}

impl std::fmt::Display for CandidateFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.candidate, self.error)
    }
}

/// Whole-call verification failure. No partial result is produced.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// Log service or registry unreachable; no candidates can be produced.
    #[error("{stage} failed: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: TransportError,
    },

    /// Call did not finish within its deadline.
    #[error("verification deadline of {timeout:?} exceeded")]
    DeadlineExceeded { timeout: Duration },

    /// Inputs could not be parsed.
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// Caller-supplied key could not be used.
    #[error("unusable key: {0}")]
    Key(#[from] SigError),
}

impl VerifyError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::InvalidRequest { .. } | Self::Key(_) => 2,
            Self::Transport { .. } => 3,
            Self::DeadlineExceeded { .. } => 4,
        }
    }

    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}
