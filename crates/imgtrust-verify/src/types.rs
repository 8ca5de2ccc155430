//! Wire types for the log service and registry, plus the verification result.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::digest::{encode_base64, ContentDigest};
use crate::error::CandidateFailure;

/// Opaque entry identifier assigned by the log service.
pub type LogEntryId = String;

/// Orchestrator pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    SearchingLog,
    DecodingEntries,
    VerifyingInclusion,
    FetchingSignatures,
    VerifyingSignatures,
    CrossChecking,
    Verified,
    Rejected,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::SearchingLog => "searching log",
            Self::DecodingEntries => "decoding entries",
            Self::VerifyingInclusion => "verifying inclusion",
            Self::FetchingSignatures => "fetching signatures",
            Self::VerifyingSignatures => "verifying signatures",
            Self::CrossChecking => "cross-checking",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Request body for `POST /api/v1/index/retrieve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchIndexRequest {
    pub hash: String,
}

/// Response from `GET /api/v1/log/entries/{uuid}`: a single-key map.
pub type LogEntryResponse = BTreeMap<String, LogEntryWire>;

/// One log entry as served by the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryWire {
    /// Base64 canonicalized entry body.
    pub body: String,

    /// Unix seconds at which the log integrated the entry.
    pub integrated_time: i64,

    /// Hex SHA-256 of the log's public key.
    #[serde(rename = "logID")]
    pub log_id: String,

    pub log_index: u64,

    #[serde(default)]
    pub verification: Option<EntryVerification>,

    /// Statement stored beside the body by intoto entries.
    #[serde(default)]
    pub attestation: Option<EntryAttestation>,
}

/// Attestation the log stores out of band from the entry body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryAttestation {
    /// Base64 attestation bytes.
    #[serde(default)]
    pub data: Option<String>,
}

/// Proof material attached to a log entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryVerification {
    #[serde(default)]
    pub inclusion_proof: Option<InclusionProof>,

    /// Base64 signature over the canonical entry metadata.
    #[serde(default)]
    pub signed_entry_timestamp: Option<String>,
}

/// Merkle inclusion proof for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionProof {
    /// Leaf position of the entry within the tree.
    pub log_index: u64,

    pub tree_size: u64,

    /// Hex root hash of the tree the proof targets.
    pub root_hash: String,

    /// Hex audit path, leaf to root.
    pub hashes: Vec<String>,

    /// Signed tree head (signed note) committing to `root_hash`.
    #[serde(default)]
    pub checkpoint: Option<String>,
}

/// A log entry as owned by one verification call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLogEntry {
    pub uuid: LogEntryId,
    pub log_index: u64,

    /// Hex log identifier.
    pub log_id: String,

    /// Base64 body, kept verbatim so the entry timestamp can be recomputed.
    pub body: String,

    pub integrated_time: i64,

    pub signed_entry_timestamp: Option<String>,

    /// Base64 attestation served with the entry, outside the signed body.
    pub attestation: Option<String>,
}

/// Entry plus the proof the log returned with it.
#[derive(Debug, Clone)]
pub struct FetchedEntry {
    pub entry: RawLogEntry,
    pub proof: Option<InclusionProof>,
}

impl FetchedEntry {
    /// Build from the log's wire shape.
    pub fn from_wire(uuid: impl Into<String>, wire: LogEntryWire) -> Self {
        let verification = wire.verification.unwrap_or_default();
        Self {
            entry: RawLogEntry {
                uuid: uuid.into(),
                log_index: wire.log_index,
                log_id: wire.log_id,
                body: wire.body,
                integrated_time: wire.integrated_time,
                signed_entry_timestamp: verification.signed_entry_timestamp,
                attestation: wire.attestation.and_then(|a| a.data),
            },
            proof: verification.inclusion_proof,
        }
    }
}

/// Bundle attached to a signature layer by the signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureBundle {
    #[serde(rename = "SignedEntryTimestamp")]
    pub signed_entry_timestamp: String,

    #[serde(rename = "Payload")]
    pub payload: BundlePayload,
}

/// Log coordinates recorded in a signature bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlePayload {
    pub body: String,
    pub integrated_time: i64,
    pub log_index: u64,
    #[serde(rename = "logID")]
    pub log_id: String,
}

/// One detached signature discovered for an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSignature {
    /// Base64 signature over `payload`.
    pub base64_signature: String,

    /// Signed claim bytes.
    #[serde(serialize_with = "serialize_base64")]
    pub payload: Vec<u8>,

    /// Digest of the layer that carried the payload.
    pub layer_digest: Option<ContentDigest>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle: Option<SignatureBundle>,
}

fn serialize_base64<T, S>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    T: AsRef<[u8]>,
    S: Serializer,
{
    serializer.serialize_str(&encode_base64(bytes.as_ref()))
}

/// DSSE envelope carried by in-toto log entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsseEnvelope {
    /// Payload type (e.g., "application/vnd.in-toto+json").
    #[serde(rename = "payloadType")]
    pub payload_type: String,

    /// Base64-encoded payload.
    pub payload: String,

    #[serde(default)]
    pub signatures: Vec<DsseSignature>,
}

/// DSSE signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsseSignature {
    #[serde(rename = "keyid", default)]
    pub key_id: String,

    /// Base64-encoded signature.
    #[serde(rename = "sig")]
    pub signature: String,
}

/// OCI image manifest (only the fields signature discovery needs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciManifest {
    #[serde(default)]
    pub media_type: Option<String>,

    #[serde(default)]
    pub layers: Vec<OciDescriptor>,
}

/// OCI content descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OciDescriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

/// Outcome of one verification call. Never mutated after return.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub verified: bool,

    /// Digest the caller asked about.
    pub digest: ContentDigest,

    /// Artifact the signatures were fetched for.
    pub reference: String,

    /// `Verified` or `Rejected`.
    pub final_stage: Stage,

    /// Stage whose checks no candidate survived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_at: Option<Stage>,

    pub matched_signatures: Vec<ImageSignature>,
    pub log_entries_verified: Vec<LogEntryId>,

    /// Every rejected candidate, in the order it was rejected.
    pub errors: Vec<CandidateFailure>,
}

/// Verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Base URL of the transparency log.
    #[serde(default = "default_rekor_url")]
    pub rekor_url: String,

    /// Bearer token for the artifact registry.
    #[serde(default)]
    pub registry_token: Option<String>,

    /// URL scheme used to reach registries (`https`, or `http` for local ones).
    #[serde(default = "default_registry_scheme")]
    pub registry_scheme: String,

    /// Whole-call deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_rekor_url() -> String {
    "https://rekor.sigstore.dev".to_string()
}

fn default_registry_scheme() -> String {
    "https".to_string()
}

fn default_timeout() -> u64 {
    5
}

fn default_max_retries() -> u32 {
    3
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            rekor_url: default_rekor_url(),
            registry_token: None,
            registry_scheme: default_registry_scheme(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl VerifierConfig {
    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `IMGTRUST_REKOR_URL` | Transparency log base URL |
    /// | `IMGTRUST_REGISTRY_TOKEN` | Registry bearer token |
    /// | `IMGTRUST_TIMEOUT` | Whole-call deadline in seconds |
    /// | `IMGTRUST_MAX_RETRIES` | Max retries for transient failures |
    pub fn from_env() -> Self {
        Self {
            rekor_url: std::env::var("IMGTRUST_REKOR_URL").unwrap_or_else(|_| default_rekor_url()),
            registry_token: std::env::var("IMGTRUST_REGISTRY_TOKEN")
                .ok()
                .filter(|t| !t.is_empty()),
            registry_scheme: default_registry_scheme(),
            timeout_secs: std::env::var("IMGTRUST_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            max_retries: std::env::var("IMGTRUST_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_max_retries),
        }
    }

    pub fn with_rekor_url(mut self, url: impl Into<String>) -> Self {
        self.rekor_url = url.into();
        self
    }

    pub fn with_registry_token(mut self, token: impl Into<String>) -> Self {
        self.registry_token = Some(token.into());
        self
    }

    /// Reach registries over plain HTTP (local registries, tests).
    pub fn with_insecure_registry(mut self, insecure: bool) -> Self {
        self.registry_scheme = if insecure { "http" } else { "https" }.to_string();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}
