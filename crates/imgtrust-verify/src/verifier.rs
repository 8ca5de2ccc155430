//! End-to-end verification.
//!
//! ```text
//! Start → SearchingLog → DecodingEntries → VerifyingInclusion
//!       → FetchingSignatures → VerifyingSignatures → CrossChecking
//!       → Verified | Rejected
//! ```
//!
//! Each stage moves forward while at least one candidate survives it. A
//! candidate that fails is recorded in the result and the rest carry on.
//! Only transport failures and the deadline abort the call.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bundle::verify_signature_bundle;
use crate::digest::ContentDigest;
use crate::entry::{decode_entry, DecodedAttestationEntry};
use crate::error::{CandidateError, CandidateFailure, SigError, TransportError, VerifyError};
use crate::keys::{LogKey, PublicKey};
use crate::oci::{OciRegistryClient, SignatureSource};
use crate::proof::verify_entry_inclusion;
use crate::reference::ArtifactReference;
use crate::signature::{verify_signature, SignedClaim};
use crate::tlog::{RekorClient, TransparencyLog};
use crate::types::{
    FetchedEntry, ImageSignature, LogEntryId, Stage, VerificationResult, VerifierConfig,
};

/// Per-call policy switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyOptions {
    /// Require the key embedded in the log entry to be the caller's key.
    #[serde(default)]
    pub require_log_key_match: bool,

    /// Require every log entry to carry a signed entry timestamp.
    #[serde(default)]
    pub require_entry_timestamp: bool,
}

/// Everything one verification call needs from its caller.
#[derive(Debug, Clone)]
pub struct VerifyRequest {
    pub digest: ContentDigest,
    pub reference: ArtifactReference,
    pub public_key: PublicKey,
    pub options: VerifyOptions,
}

impl VerifyRequest {
    pub fn new(digest: ContentDigest, reference: ArtifactReference, public_key: PublicKey) -> Self {
        Self {
            digest,
            reference,
            public_key,
            options: VerifyOptions::default(),
        }
    }

    /// Build from the caller's strings: hex digest, reference, PEM key.
    pub fn parse(digest: &str, reference: &str, public_key_pem: &str) -> Result<Self, VerifyError> {
        let digest = ContentDigest::parse(digest)
            .map_err(|e| VerifyError::invalid_request(format!("digest: {}", e)))?;
        let reference = ArtifactReference::parse(reference)
            .map_err(|e| VerifyError::invalid_request(e.to_string()))?;
        let public_key = PublicKey::from_pem(public_key_pem)?;
        Ok(Self::new(digest, reference, public_key))
    }

    pub fn with_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }
}

/// A log entry that passed decoding.
struct DecodedCandidate {
    fetched: FetchedEntry,
    decoded: DecodedAttestationEntry,
}

/// A signature that passed cryptographic verification.
struct SignedCandidate {
    label: String,
    signature: ImageSignature,
    claim: SignedClaim,
}

/// Error accumulator for one call.
#[derive(Default)]
struct Failures(Vec<CandidateFailure>);

impl Failures {
    fn record(&mut self, stage: Stage, candidate: &str, error: impl Into<CandidateError>) {
        let failure = CandidateFailure::new(stage, candidate, error);
        warn!(stage = %stage, candidate = %candidate, error = %failure.error, "candidate rejected");
        self.0.push(failure);
    }
}

/// Composes the log, the registry and the local checks into a decision.
///
/// Clients are read-only after construction; one verifier serves any number
/// of concurrent calls.
#[derive(Debug, Clone)]
pub struct Verifier<L = RekorClient, R = OciRegistryClient> {
    log: L,
    registry: R,
    log_key: LogKey,
    timeout: Duration,
}

impl Verifier<RekorClient, OciRegistryClient> {
    /// Verifier backed by the configured log and registries.
    pub fn from_config(config: &VerifierConfig, log_key: LogKey) -> Result<Self, VerifyError> {
        let log = RekorClient::new(config).map_err(|source| VerifyError::Transport {
            stage: Stage::Start,
            source,
        })?;
        let registry = OciRegistryClient::new(config).map_err(|source| VerifyError::Transport {
            stage: Stage::Start,
            source,
        })?;
        Ok(Self::new(log, registry, log_key).with_timeout(Duration::from_secs(config.timeout_secs)))
    }
}

impl<L: TransparencyLog, R: SignatureSource> Verifier<L, R> {
    pub fn new(log: L, registry: R, log_key: LogKey) -> Self {
        Self {
            log,
            registry,
            log_key,
            timeout: Duration::from_secs(5),
        }
    }

    /// Whole-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Decide whether `request.digest` is signed and logged.
    ///
    /// Returns `Ok` with `verified == false` when every candidate was
    /// rejected; the reasons are in `errors`. Returns `Err` only when the call
    /// could not run to a decision (transport failure, deadline).
    pub async fn verify(&self, request: &VerifyRequest) -> Result<VerificationResult, VerifyError> {
        match tokio::time::timeout(self.timeout, self.run(request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis(), digest = %request.digest, "verification deadline exceeded");
                Err(VerifyError::DeadlineExceeded {
                    timeout: self.timeout,
                })
            }
        }
    }

    async fn run(&self, request: &VerifyRequest) -> Result<VerificationResult, VerifyError> {
        let digest = &request.digest;
        let mut failures = Failures::default();
        debug!(digest = %digest, reference = %request.reference, "starting verification");

        // Searching the log.
        debug!(stage = %Stage::SearchingLog, "entering stage");
        let ids = self
            .log
            .search_by_digest(digest)
            .await
            .map_err(|source| transport(Stage::SearchingLog, source))?;
        if ids.is_empty() {
            failures.record(
                Stage::SearchingLog,
                &digest.to_string(),
                CandidateError::NoLogEntries {
                    digest: digest.to_string(),
                },
            );
            return Ok(rejected(request, Stage::SearchingLog, failures));
        }

        let fetched = join_all(ids.iter().map(|id| self.log.fetch_entry(id))).await;
        let mut entries = Vec::with_capacity(fetched.len());
        for (id, result) in ids.iter().zip(fetched) {
            match result {
                Ok(entry) => entries.push(entry),
                Err(e @ TransportError::NotFound { .. }) => {
                    failures.record(Stage::SearchingLog, id, e)
                }
                Err(source) => return Err(transport(Stage::SearchingLog, source)),
            }
        }

        // Decoding entries.
        debug!(stage = %Stage::DecodingEntries, count = entries.len(), "entering stage");
        let mut decoded = Vec::with_capacity(entries.len());
        for fetched in entries {
            match decode_entry(&fetched.entry) {
                Ok(entry) => decoded.push(DecodedCandidate {
                    fetched,
                    decoded: entry,
                }),
                Err(e) if e.is_unsupported() => {
                    debug!(entry = %fetched.entry.uuid, error = %e, "skipping entry of another type");
                    failures.0.push(CandidateFailure::new(
                        Stage::DecodingEntries,
                        fetched.entry.uuid.clone(),
                        e,
                    ));
                }
                Err(e) => failures.record(Stage::DecodingEntries, &fetched.entry.uuid, e),
            }
        }
        if decoded.is_empty() {
            return Ok(rejected(request, Stage::DecodingEntries, failures));
        }

        // Verifying inclusion.
        debug!(stage = %Stage::VerifyingInclusion, count = decoded.len(), "entering stage");
        let mut included = Vec::with_capacity(decoded.len());
        for candidate in decoded {
            let entry = &candidate.fetched.entry;
            match verify_entry_inclusion(
                entry,
                candidate.fetched.proof.as_ref(),
                &self.log_key,
                request.options.require_entry_timestamp,
            ) {
                Ok(()) => {
                    debug!(entry = %entry.uuid, log_index = entry.log_index, "inclusion verified");
                    included.push(candidate);
                }
                Err(e) => {
                    warn!(entry = %entry.uuid, log_index = entry.log_index, error = %e, "inclusion proof failed, possible tampering");
                    failures.0.push(CandidateFailure::new(
                        Stage::VerifyingInclusion,
                        entry.uuid.clone(),
                        e,
                    ));
                }
            }
        }
        if included.is_empty() {
            return Ok(rejected(request, Stage::VerifyingInclusion, failures));
        }

        // Fetching signatures.
        debug!(stage = %Stage::FetchingSignatures, reference = %request.reference, "entering stage");
        let signatures = self
            .registry
            .fetch_signatures(&request.reference)
            .await
            .map_err(|source| transport(Stage::FetchingSignatures, source))?;
        if signatures.is_empty() {
            failures.record(
                Stage::FetchingSignatures,
                &request.reference.to_string(),
                CandidateError::NoSignatures {
                    reference: request.reference.to_string(),
                },
            );
            return Ok(rejected(request, Stage::FetchingSignatures, failures));
        }

        // Verifying signatures.
        debug!(stage = %Stage::VerifyingSignatures, count = signatures.len(), "entering stage");
        let mut signed = Vec::with_capacity(signatures.len());
        for (index, signature) in signatures.into_iter().enumerate() {
            let label = signature_label(index, &signature);
            let claim = match verify_signature(
                &request.public_key,
                &signature.base64_signature,
                &signature.payload,
            ) {
                Ok(claim) => claim,
                Err(e) => {
                    failures.record(Stage::VerifyingSignatures, &label, e);
                    continue;
                }
            };
            if let Err(e) = verify_signature_bundle(&signature, &self.log_key) {
                failures.record(Stage::VerifyingSignatures, &label, e);
                continue;
            }
            signed.push(SignedCandidate {
                label,
                signature,
                claim,
            });
        }
        if signed.is_empty() {
            return Ok(rejected(request, Stage::VerifyingSignatures, failures));
        }

        // Cross-checking.
        debug!(stage = %Stage::CrossChecking, "entering stage");
        let mut log_entries_verified: Vec<LogEntryId> = Vec::new();
        let mut matched_subjects: Vec<ContentDigest> = Vec::new();
        for candidate in &included {
            let uuid = &candidate.fetched.entry.uuid;
            let checked = check_log_subject(&candidate.decoded, digest).and_then(|()| {
                if request.options.require_log_key_match {
                    check_log_key(&candidate.decoded, &request.public_key)
                } else {
                    Ok(())
                }
            });
            match checked {
                Ok(()) => {
                    log_entries_verified.push(uuid.clone());
                    matched_subjects.extend(candidate.decoded.subject_digests.iter().cloned());
                }
                Err(e) => failures.record(Stage::CrossChecking, uuid, e),
            }
        }

        let mut matched_signatures = Vec::new();
        for candidate in signed {
            let checked = check_signature_subject(&candidate.claim, digest)
                .and_then(|()| check_log_agrees_with_signature(&matched_subjects, &candidate.claim));
            match checked {
                Ok(()) => matched_signatures.push(candidate.signature),
                Err(e) => failures.record(Stage::CrossChecking, &candidate.label, e),
            }
        }

        let verified = !log_entries_verified.is_empty() && !matched_signatures.is_empty();
        let (final_stage, rejected_at) = if verified {
            (Stage::Verified, None)
        } else {
            (Stage::Rejected, Some(Stage::CrossChecking))
        };

        info!(
            digest = %digest,
            reference = %request.reference,
            verified,
            log_entries = log_entries_verified.len(),
            signatures = matched_signatures.len(),
            rejected_candidates = failures.0.len(),
            "verification finished"
        );

        Ok(VerificationResult {
            verified,
            digest: digest.clone(),
            reference: request.reference.to_string(),
            final_stage,
            rejected_at,
            matched_signatures,
            log_entries_verified,
            errors: failures.0,
        })
    }
}

fn transport(stage: Stage, source: TransportError) -> VerifyError {
    warn!(stage = %stage, error = %source, "transport failure, aborting");
    VerifyError::Transport { stage, source }
}

fn rejected(request: &VerifyRequest, stage: Stage, failures: Failures) -> VerificationResult {
    info!(
        digest = %request.digest,
        reference = %request.reference,
        verified = false,
        rejected_at = %stage,
        rejected_candidates = failures.0.len(),
        "verification finished"
    );
    VerificationResult {
        verified: false,
        digest: request.digest.clone(),
        reference: request.reference.to_string(),
        final_stage: Stage::Rejected,
        rejected_at: Some(stage),
        matched_signatures: Vec::new(),
        log_entries_verified: Vec::new(),
        errors: failures.0,
    }
}

fn signature_label(index: usize, signature: &ImageSignature) -> String {
    match &signature.layer_digest {
        Some(digest) => format!("signature[{}] {}", index, digest),
        None => format!("signature[{}]", index),
    }
}

/// One of the log entry's subjects must be the queried digest.
pub fn check_log_subject(
    entry: &DecodedAttestationEntry,
    queried: &ContentDigest,
) -> Result<(), CandidateError> {
    if entry.names_subject(queried) {
        return Ok(());
    }
    Err(CandidateError::DigestMismatch {
        expected: queried.to_string(),
        actual: entry
            .subject_digests
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    })
}

/// The signature's claimed digest must be the queried digest.
pub fn check_signature_subject(
    claim: &SignedClaim,
    queried: &ContentDigest,
) -> Result<(), CandidateError> {
    expect_digest(queried, &claim.subject_digest)
}

/// Some verified log entry must vouch for the digest the signature claims.
pub fn check_log_agrees_with_signature(
    log_subjects: &[ContentDigest],
    claim: &SignedClaim,
) -> Result<(), CandidateError> {
    if log_subjects.contains(&claim.subject_digest) {
        return Ok(());
    }
    Err(CandidateError::DigestMismatch {
        expected: log_subjects
            .first()
            .map(ToString::to_string)
            .unwrap_or_else(|| "<no verified log entry>".to_string()),
        actual: claim.subject_digest.to_string(),
    })
}

/// The key embedded in the log entry must be the caller's key.
pub fn check_log_key(
    entry: &DecodedAttestationEntry,
    expected: &PublicKey,
) -> Result<(), CandidateError> {
    let logged = PublicKey::from_pem_bytes(&entry.public_key).map_err(|e| match e {
        SigError::InvalidKey { reason } => SigError::InvalidKey {
            reason: format!("log entry key: {}", reason),
        },
        other => other,
    })?;
    if &logged != expected {
        return Err(CandidateError::LogKeyMismatch);
    }
    Ok(())
}

fn expect_digest(expected: &ContentDigest, actual: &ContentDigest) -> Result<(), CandidateError> {
    if expected == actual {
        return Ok(());
    }
    Err(CandidateError::DigestMismatch {
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}
