//! Log entry inclusion verification.
//!
//! An entry counts as included only when all of these hold:
//! - it was issued by the trusted log (log ID matches the log key),
//! - its audit path leads from its leaf hash to the proof's root,
//! - a tree head signed by the log key commits to that root and size,
//! - its signed entry timestamp, when present, was signed by the log key.

use serde::Serialize;

use crate::checkpoint::SignedTreeHead;
use crate::digest::decode_base64;
use crate::error::ProofError;
use crate::keys::LogKey;
use crate::merkle::{self, parse_hash};
use crate::types::{InclusionProof, RawLogEntry};

/// Entry metadata the log signs to produce a signed entry timestamp.
#[derive(Serialize)]
pub(crate) struct EntryTimestampPayload<'a> {
    pub(crate) body: &'a str,
    #[serde(rename = "integratedTime")]
    pub(crate) integrated_time: i64,
    #[serde(rename = "logID")]
    pub(crate) log_id: &'a str,
    #[serde(rename = "logIndex")]
    pub(crate) log_index: u64,
}

/// Verify that `entry` is included in the log identified by `log_key`.
pub fn verify_entry_inclusion(
    entry: &RawLogEntry,
    proof: Option<&InclusionProof>,
    log_key: &LogKey,
    require_entry_timestamp: bool,
) -> Result<(), ProofError> {
    let log_id = log_key.log_id();
    if !entry.log_id.eq_ignore_ascii_case(&log_id) {
        return Err(ProofError::UnknownLog {
            log_id: entry.log_id.clone(),
        });
    }

    let proof = proof.ok_or_else(|| ProofError::malformed("entry has no inclusion proof"))?;
    verify_audit_path(entry, proof)?;
    verify_tree_head(proof, log_key)?;

    match &entry.signed_entry_timestamp {
        Some(set) => verify_entry_timestamp(entry, set, log_key)?,
        None if require_entry_timestamp => {
            return Err(ProofError::BadEntryTimestamp {
                reason: "entry has no signed entry timestamp".to_string(),
            })
        }
        None => {}
    }

    Ok(())
}

/// Recompute the root from the entry's leaf and compare it with the proof's.
pub fn verify_audit_path(entry: &RawLogEntry, proof: &InclusionProof) -> Result<(), ProofError> {
    let body = decode_base64(&entry.body)
        .map_err(|e| ProofError::malformed(format!("entry body: {}", e)))?;
    let leaf = merkle::leaf_hash(&body);
    let path = proof
        .hashes
        .iter()
        .map(|h| parse_hash(h))
        .collect::<Result<Vec<_>, _>>()?;
    let root = parse_hash(&proof.root_hash)?;

    merkle::verify_inclusion(&leaf, proof.log_index, proof.tree_size, &path, &root)
}

/// Check the signed tree head commits to the proof's root and size.
pub fn verify_tree_head(proof: &InclusionProof, log_key: &LogKey) -> Result<(), ProofError> {
    let note = proof
        .checkpoint
        .as_deref()
        .ok_or_else(|| ProofError::bad_signature("missing signed tree head"))?;
    let sth = SignedTreeHead::parse(note)?;

    let root = parse_hash(&proof.root_hash)?;
    if sth.root_hash != root {
        return Err(ProofError::RootMismatch {
            expected: hex::encode(sth.root_hash),
            computed: hex::encode(root),
        });
    }
    if sth.tree_size != proof.tree_size {
        return Err(ProofError::malformed(format!(
            "signed tree head size {} does not match proof tree size {}",
            sth.tree_size, proof.tree_size
        )));
    }

    sth.verify(log_key)
}

/// Verify the log's signature over the entry's canonical metadata.
pub fn verify_entry_timestamp(
    entry: &RawLogEntry,
    signed_entry_timestamp: &str,
    log_key: &LogKey,
) -> Result<(), ProofError> {
    let payload = EntryTimestampPayload {
        body: &entry.body,
        integrated_time: entry.integrated_time,
        log_id: &entry.log_id,
        log_index: entry.log_index,
    };
    verify_timestamp_payload(&payload, signed_entry_timestamp, log_key)
}

/// Check a signed entry timestamp against the JCS form of `payload`.
pub(crate) fn verify_timestamp_payload(
    payload: &EntryTimestampPayload<'_>,
    signed_entry_timestamp: &str,
    log_key: &LogKey,
) -> Result<(), ProofError> {
    let bad = |reason: String| ProofError::BadEntryTimestamp { reason };

    let signature = decode_base64(signed_entry_timestamp).map_err(|e| bad(e.to_string()))?;
    let canonical = serde_jcs::to_vec(payload)
        .map_err(|e| bad(format!("canonicalization failed: {}", e)))?;

    log_key
        .verify(&canonical, &signature)
        .map_err(|e| bad(e.to_string()))
}
