//! Signature bundle verification.
//!
//! A signer may attach the log entry for its signature as a bundle
//! annotation. The bundle is only trusted when the log's signed entry
//! timestamp covers it and the bundled entry records the very signature and
//! payload it travels with.

use serde::Deserialize;

use crate::digest::{decode_base64, ContentDigest, DigestAlgorithm};
use crate::entry::HashValue;
use crate::error::ProofError;
use crate::keys::LogKey;
use crate::proof::{verify_timestamp_payload, EntryTimestampPayload};
use crate::types::{ImageSignature, SignatureBundle};

/// Entry kinds whose body records a detached signature over a hashed payload.
const SIGNATURE_KINDS: &[&str] = &["hashedrekord", "rekord"];

#[derive(Debug, Deserialize)]
struct BundledEntry {
    kind: String,
    spec: BundledSpec,
}

#[derive(Debug, Deserialize)]
struct BundledSpec {
    signature: BundledSignature,
    data: BundledData,
}

#[derive(Debug, Deserialize)]
struct BundledSignature {
    content: String,
}

#[derive(Debug, Deserialize)]
struct BundledData {
    #[serde(default)]
    hash: Option<HashValue>,
}

/// Verify the bundle attached to `signature`, if any.
pub fn verify_signature_bundle(
    signature: &ImageSignature,
    log_key: &LogKey,
) -> Result<(), ProofError> {
    match &signature.bundle {
        Some(bundle) => verify_bundle(bundle, &signature.base64_signature, &signature.payload, log_key),
        None => Ok(()),
    }
}

/// Check the bundle's entry timestamp, then that its entry records
/// `signature_b64` over `payload`.
pub fn verify_bundle(
    bundle: &SignatureBundle,
    signature_b64: &str,
    payload: &[u8],
    log_key: &LogKey,
) -> Result<(), ProofError> {
    let recorded = &bundle.payload;
    if !recorded.log_id.eq_ignore_ascii_case(&log_key.log_id()) {
        return Err(ProofError::UnknownLog {
            log_id: recorded.log_id.clone(),
        });
    }

    let timestamp = EntryTimestampPayload {
        body: &recorded.body,
        integrated_time: recorded.integrated_time,
        log_id: &recorded.log_id,
        log_index: recorded.log_index,
    };
    verify_timestamp_payload(&timestamp, &bundle.signed_entry_timestamp, log_key)?;

    check_bundled_entry(&recorded.body, signature_b64, payload)
}

fn check_bundled_entry(body: &str, signature_b64: &str, payload: &[u8]) -> Result<(), ProofError> {
    let mismatch = |reason: String| ProofError::BundleMismatch { reason };

    let body = decode_base64(body).map_err(|e| mismatch(format!("entry body: {}", e)))?;
    let entry: BundledEntry = serde_json::from_slice(&body)
        .map_err(|e| mismatch(format!("entry is not a signature record: {}", e)))?;
    if !SIGNATURE_KINDS.contains(&entry.kind.as_str()) {
        return Err(mismatch(format!(
            "{} entry does not record a detached signature",
            entry.kind
        )));
    }

    let recorded_sig = decode_base64(&entry.spec.signature.content)
        .map_err(|e| mismatch(format!("recorded signature: {}", e)))?;
    let signature = decode_base64(signature_b64)
        .map_err(|e| mismatch(format!("signature: {}", e)))?;
    if recorded_sig != signature {
        return Err(mismatch("recorded signature differs".to_string()));
    }

    let hash = entry
        .spec
        .data
        .hash
        .ok_or_else(|| mismatch("entry records no payload hash".to_string()))?;
    let recorded_hash = ContentDigest::from_parts(&hash.algorithm, &hash.value)
        .map_err(|e| mismatch(format!("recorded payload hash: {}", e)))?;
    if recorded_hash.algorithm() != DigestAlgorithm::Sha256 {
        return Err(mismatch(format!(
            "unsupported payload hash {}",
            recorded_hash
        )));
    }
    let actual = ContentDigest::sha256_of(payload);
    if recorded_hash != actual {
        return Err(mismatch(format!(
            "recorded payload hash {} differs from {}",
            recorded_hash, actual
        )));
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    use crate::digest::{encode_base64, ContentDigest};
    use crate::keys::test_keys::ecdsa_sign;
    use crate::keys::LogKey;
    use crate::types::{BundlePayload, SignatureBundle};

    pub fn hashedrekord_body(signature_b64: &str, payload: &[u8]) -> String {
        let body = json!({
            "apiVersion": "0.0.1",
            "kind": "hashedrekord",
            "spec": {
                "data": { "hash": { "algorithm": "sha256", "value": ContentDigest::sha256_of(payload).hex() } },
                "signature": { "content": signature_b64, "publicKey": { "content": "" } }
            }
        });
        encode_base64(body.to_string().as_bytes())
    }

    /// Bundle for `signature_b64` over `payload`, stamped by `signing`.
    pub fn signed_bundle(
        signature_b64: &str,
        payload: &[u8],
        signing: &p256::ecdsa::SigningKey,
        log_key: &LogKey,
    ) -> SignatureBundle {
        let payload = BundlePayload {
            body: hashedrekord_body(signature_b64, payload),
            integrated_time: 1_700_000_100,
            log_index: 77,
            log_id: log_key.log_id(),
        };
        let canonical = serde_jcs::to_vec(&json!({
            "body": payload.body,
            "integratedTime": payload.integrated_time,
            "logID": payload.log_id,
            "logIndex": payload.log_index,
        }))
        .unwrap();
        SignatureBundle {
            signed_entry_timestamp: encode_base64(&ecdsa_sign(signing, &canonical)),
            payload,
        }
    }
}
