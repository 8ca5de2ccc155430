//! Log entry decoding.
//!
//! A log entry body is base64 JSON of the form
//! `{"kind": ..., "apiVersion": ..., "spec": {...}}`. The `(kind, apiVersion)`
//! pair selects the schema the `spec` is decoded with. Only in-toto
//! attestation entries are decoded; any other kind is reported as
//! [`DecodeError::UnsupportedKind`] so callers can skip it.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::digest::{decode_base64, ContentDigest, DigestAlgorithm};
use crate::error::DecodeError;
use crate::types::{DsseEnvelope, RawLogEntry};

/// Entry kind for in-toto attestations.
pub const INTOTO_KIND: &str = "intoto";

/// Schema versions of [`INTOTO_KIND`] this decoder understands.
pub const INTOTO_VERSIONS: &[&str] = &["0.0.1", "0.0.2"];

#[derive(Debug, Deserialize)]
struct ProposedEntryHeader {
    kind: String,
    #[serde(rename = "apiVersion")]
    api_version: String,
    spec: serde_json::Value,
}

/// Entry body decoded into the schema its discriminator names.
#[derive(Debug, Clone)]
pub enum ProposedEntry {
    IntotoV001(IntotoV001Spec),
    IntotoV002(IntotoV002Spec),
}

/// `{algorithm, value}` digest as written in entry specs.
#[derive(Debug, Clone, Deserialize)]
pub struct HashValue {
    pub algorithm: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntotoV001Spec {
    pub content: IntotoV001Content,

    /// Base64 PEM of the signer's key.
    pub public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntotoV001Content {
    /// DSSE envelope serialized as a JSON string.
    #[serde(default)]
    pub envelope: Option<String>,

    #[serde(default)]
    pub hash: Option<HashValue>,

    #[serde(default)]
    pub payload_hash: Option<HashValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntotoV002Spec {
    pub content: IntotoV002Content,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntotoV002Content {
    pub envelope: IntotoV002Envelope,

    #[serde(default)]
    pub hash: Option<HashValue>,

    #[serde(default)]
    pub payload_hash: Option<HashValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntotoV002Envelope {
    pub payload_type: String,

    /// Base64 payload; the log may have encoded it twice.
    #[serde(default)]
    pub payload: Option<String>,

    pub signatures: Vec<IntotoV002Signature>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntotoV002Signature {
    #[serde(default)]
    pub keyid: Option<String>,

    /// Base64 PEM; the log may have encoded it twice.
    pub public_key: String,

    pub sig: String,
}

/// Minimal in-toto statement.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InTotoStatement {
    #[serde(rename = "_type")]
    statement_type: String,

    #[serde(default)]
    predicate_type: Option<String>,

    #[serde(default)]
    subject: Vec<StatementSubject>,
}

#[derive(Debug, Clone, Deserialize)]
struct StatementSubject {
    #[serde(default)]
    name: Option<String>,

    digest: BTreeMap<String, String>,
}

impl ProposedEntry {
    /// Select and decode the schema named by the body's `(kind, apiVersion)`.
    pub fn from_json(body: &[u8]) -> Result<Self, DecodeError> {
        let header: ProposedEntryHeader = serde_json::from_slice(body)
            .map_err(|e| DecodeError::malformed(format!("entry body is not an entry: {}", e)))?;

        match (header.kind.as_str(), header.api_version.as_str()) {
            (INTOTO_KIND, "0.0.1") => decode_spec(header.spec).map(Self::IntotoV001),
            (INTOTO_KIND, "0.0.2") => decode_spec(header.spec).map(Self::IntotoV002),
            (INTOTO_KIND, version) => Err(DecodeError::UnsupportedVersion {
                kind: INTOTO_KIND.to_string(),
                api_version: version.to_string(),
            }),
            (kind, _) => Err(DecodeError::UnsupportedKind {
                kind: kind.to_string(),
            }),
        }
    }

    pub fn kind(&self) -> &'static str {
        INTOTO_KIND
    }

    pub fn api_version(&self) -> &'static str {
        match self {
            Self::IntotoV001(_) => "0.0.1",
            Self::IntotoV002(_) => "0.0.2",
        }
    }
}

fn decode_spec<T: serde::de::DeserializeOwned>(spec: serde_json::Value) -> Result<T, DecodeError> {
    serde_json::from_value(spec).map_err(|e| DecodeError::malformed(format!("invalid spec: {}", e)))
}

/// Attestation fields extracted from one log entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAttestationEntry {
    pub kind: String,
    pub api_version: String,

    /// PEM of the key that signed the attestation.
    pub public_key: Vec<u8>,

    /// Digests of every statement subject, in statement order. The log
    /// indexes each one.
    pub subject_digests: Vec<ContentDigest>,

    /// Digest of the DSSE payload, when the entry records one.
    pub payload_hash: Option<ContentDigest>,

    pub predicate_type: Option<String>,
}

impl DecodedAttestationEntry {
    /// The embedded public key as PEM text.
    pub fn public_key_pem(&self) -> Result<&str, DecodeError> {
        std::str::from_utf8(&self.public_key)
            .map_err(|_| DecodeError::malformed("public key is not UTF-8 PEM"))
    }

    pub fn names_subject(&self, digest: &ContentDigest) -> bool {
        self.subject_digests.contains(digest)
    }
}

/// Decode a raw log entry into its attestation fields.
///
/// Canonical intoto bodies record only hashes of the statement; the
/// statement itself then comes from the entry's attestation.
///
/// Pure: the same entry always yields the same result.
pub fn decode_entry(raw: &RawLogEntry) -> Result<DecodedAttestationEntry, DecodeError> {
    let body = decode_base64(&raw.body)
        .map_err(|e| DecodeError::malformed(format!("entry body: {}", e)))?;
    let proposed = ProposedEntry::from_json(&body)?;
    let attestation = raw
        .attestation
        .as_deref()
        .map(decode_base64)
        .transpose()
        .map_err(|e| DecodeError::malformed(format!("attestation: {}", e)))?;
    decode_proposed(&proposed, attestation.as_deref())
}

/// Extract attestation fields from an already-selected schema.
///
/// `attestation` supplies the statement when the body does not embed one.
pub fn decode_proposed(
    proposed: &ProposedEntry,
    attestation: Option<&[u8]>,
) -> Result<DecodedAttestationEntry, DecodeError> {
    let (public_key, embedded, payload_hash) = match proposed {
        ProposedEntry::IntotoV001(spec) => {
            let public_key = decode_layered(&spec.public_key, is_pem)
                .ok_or_else(|| DecodeError::malformed("publicKey is not base64 PEM"))?;
            let embedded = match spec.content.envelope.as_deref() {
                Some(envelope_json) => {
                    let envelope: DsseEnvelope = serde_json::from_str(envelope_json)
                        .map_err(|e| DecodeError::malformed(format!("invalid envelope: {}", e)))?;
                    Some(envelope_payload(&envelope.payload)?)
                }
                None => None,
            };
            (public_key, embedded, spec.content.payload_hash.as_ref())
        }
        ProposedEntry::IntotoV002(spec) => {
            let envelope = &spec.content.envelope;
            let signature = envelope
                .signatures
                .first()
                .ok_or_else(|| DecodeError::malformed("envelope has no signatures"))?;
            let public_key = decode_layered(&signature.public_key, is_pem)
                .ok_or_else(|| DecodeError::malformed("publicKey is not base64 PEM"))?;
            let embedded = envelope.payload.as_deref().map(envelope_payload).transpose()?;
            (public_key, embedded, spec.content.payload_hash.as_ref())
        }
    };

    let payload_hash = payload_hash
        .map(|h| ContentDigest::from_parts(&h.algorithm, &h.value))
        .transpose()
        .map_err(|e| DecodeError::malformed(format!("payloadHash: {}", e)))?;

    let payload = match embedded {
        Some(payload) => payload,
        None => {
            let attestation =
                attestation.ok_or_else(|| DecodeError::malformed("entry carries no attestation"))?;
            // The attestation sits outside the signed body; only payloadHash binds it.
            if payload_hash.as_ref().map(ContentDigest::algorithm) != Some(DigestAlgorithm::Sha256) {
                return Err(DecodeError::malformed(
                    "attestation is not bound by a sha256 payloadHash",
                ));
            }
            attestation_payload(attestation)?
        }
    };

    if let Some(expected) = &payload_hash {
        if expected.algorithm() == DigestAlgorithm::Sha256 {
            let actual = ContentDigest::sha256_of(&payload);
            if &actual != expected {
                return Err(DecodeError::malformed(format!(
                    "payloadHash {} does not match statement {}",
                    expected, actual
                )));
            }
        }
    }

    let statement: InTotoStatement = serde_json::from_slice(&payload)
        .map_err(|e| DecodeError::malformed(format!("payload is not an in-toto statement: {}", e)))?;
    if !statement.statement_type.starts_with("https://in-toto.io/Statement/") {
        return Err(DecodeError::malformed(format!(
            "unexpected statement type {}",
            statement.statement_type
        )));
    }

    let subject_digests = subject_digests(&statement)?;

    Ok(DecodedAttestationEntry {
        kind: proposed.kind().to_string(),
        api_version: proposed.api_version().to_string(),
        public_key,
        subject_digests,
        payload_hash,
        predicate_type: statement.predicate_type,
    })
}

fn envelope_payload(payload: &str) -> Result<Vec<u8>, DecodeError> {
    decode_layered(payload, is_json)
        .ok_or_else(|| DecodeError::malformed("envelope payload is not base64 JSON"))
}

/// Statement bytes from an attestation, unwrapping a DSSE envelope if the
/// log stored one.
fn attestation_payload(attestation: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if !is_json(attestation) {
        return Err(DecodeError::malformed("attestation is not JSON"));
    }
    match serde_json::from_slice::<DsseEnvelope>(attestation) {
        Ok(envelope) if !envelope.payload_type.is_empty() => envelope_payload(&envelope.payload),
        _ => Ok(attestation.to_vec()),
    }
}

fn subject_digests(statement: &InTotoStatement) -> Result<Vec<ContentDigest>, DecodeError> {
    if statement.subject.is_empty() {
        return Err(DecodeError::malformed("statement has no subject"));
    }

    let mut digests = Vec::with_capacity(statement.subject.len());
    for subject in &statement.subject {
        // Prefer sha256; otherwise the first algorithm we know.
        let chosen = subject.digest.get("sha256").map(|v| ("sha256", v)).or_else(|| {
            subject
                .digest
                .iter()
                .find(|(alg, _)| DigestAlgorithm::from_name(alg).is_ok())
                .map(|(alg, v)| (alg.as_str(), v))
        });
        let Some((algorithm, value)) = chosen else {
            continue;
        };
        let digest = ContentDigest::from_parts(algorithm, value).map_err(|e| {
            DecodeError::malformed(format!(
                "subject {} digest: {}",
                subject.name.as_deref().unwrap_or("<unnamed>"),
                e
            ))
        })?;
        digests.push(digest);
    }

    if digests.is_empty() {
        return Err(DecodeError::malformed("no subject has a supported digest"));
    }
    Ok(digests)
}

/// Base64-decode, decoding a second time when the log wrapped the value twice.
fn decode_layered(input: &str, accept: fn(&[u8]) -> bool) -> Option<Vec<u8>> {
    let once = decode_base64(input).ok()?;
    if accept(&once) {
        return Some(once);
    }
    let text = std::str::from_utf8(&once).ok()?;
    let twice = decode_base64(text).ok()?;
    accept(&twice).then_some(twice)
}

fn is_pem(bytes: &[u8]) -> bool {
    bytes.starts_with(b"-----BEGIN ")
}

fn is_json(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map(|b| *b == b'{')
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    use crate::digest::{encode_base64, ContentDigest};
    use crate::types::RawLogEntry;

    pub const TEST_PEM: &str =
        "-----BEGIN PUBLIC KEY-----\nMCowBQYDK2VwAyEAGb9ECWmEzf6FQbrBZ9w7lshQhqowtrbLDFw4rXAxZuE=\n-----END PUBLIC KEY-----\n";

    pub fn statement(subject: &ContentDigest) -> Vec<u8> {
        statement_for(&[subject])
    }

    pub fn statement_for(subjects: &[&ContentDigest]) -> Vec<u8> {
        let subjects: Vec<_> = subjects
            .iter()
            .enumerate()
            .map(|(i, digest)| {
                json!({
                    "name": format!("us-central1-docker.pkg.dev/proj/repo1/app-{}", i),
                    "digest": { digest.algorithm().name(): digest.hex() }
                })
            })
            .collect();
        serde_json::to_vec(&json!({
            "_type": "https://in-toto.io/Statement/v0.1",
            "predicateType": "https://slsa.dev/provenance/v0.2",
            "subject": subjects,
            "predicate": {}
        }))
        .unwrap()
    }

    /// Base64 attestation as the log serves it beside an entry.
    pub fn attestation(subject: &ContentDigest) -> String {
        encode_base64(&statement(subject))
    }

    /// Canonical v0.0.1 body: hashes only, the statement travels as the
    /// entry's attestation.
    pub fn intoto_v001_body(subject: &ContentDigest, public_key_pem: &str) -> Vec<u8> {
        intoto_v001_body_for(&statement(subject), public_key_pem)
    }

    pub fn intoto_v001_body_for(statement: &[u8], public_key_pem: &str) -> Vec<u8> {
        let envelope = json!({
            "payloadType": "application/vnd.in-toto+json",
            "payload": encode_base64(statement),
            "signatures": [{ "keyid": "", "sig": encode_base64(b"sig") }]
        });
        serde_json::to_vec(&json!({
            "apiVersion": "0.0.1",
            "kind": "intoto",
            "spec": {
                "content": {
                    "hash": { "algorithm": "sha256", "value": ContentDigest::sha256_of(envelope.to_string().as_bytes()).hex() },
                    "payloadHash": { "algorithm": "sha256", "value": ContentDigest::sha256_of(statement).hex() }
                },
                "publicKey": encode_base64(public_key_pem.as_bytes())
            }
        }))
        .unwrap()
    }

    pub fn intoto_v002_body(subject: &ContentDigest, public_key_pem: &str) -> Vec<u8> {
        let payload = statement(subject);
        // v0.0.2 stores payload and key base64-encoded twice.
        let payload_b64 = encode_base64(encode_base64(&payload).as_bytes());
        let key_b64 = encode_base64(encode_base64(public_key_pem.as_bytes()).as_bytes());
        serde_json::to_vec(&json!({
            "apiVersion": "0.0.2",
            "kind": "intoto",
            "spec": {
                "content": {
                    "envelope": {
                        "payloadType": "application/vnd.in-toto+json",
                        "payload": payload_b64,
                        "signatures": [{ "publicKey": key_b64, "sig": encode_base64(b"sig") }]
                    },
                    "payloadHash": { "algorithm": "sha256", "value": ContentDigest::sha256_of(&payload).hex() }
                }
            }
        }))
        .unwrap()
    }

    pub fn raw_entry(uuid: &str, body: &[u8]) -> RawLogEntry {
        RawLogEntry {
            uuid: uuid.to_string(),
            log_index: 2,
            log_id: "00".repeat(32),
            body: encode_base64(body),
            integrated_time: 1_700_000_000,
            signed_entry_timestamp: None,
            attestation: None,
        }
    }

    pub fn attested_entry(uuid: &str, body: &[u8], statement: &[u8]) -> RawLogEntry {
        RawLogEntry {
            attestation: Some(encode_base64(statement)),
            ..raw_entry(uuid, body)
        }
    }
}
