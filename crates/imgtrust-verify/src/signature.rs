//! Detached image signature verification.
//!
//! Signatures cover a "simple signing" claim:
//!
//! ```json
//! {
//!   "critical": {
//!     "identity": { "docker-reference": "ghcr.io/acme/app" },
//!     "image": { "docker-manifest-digest": "sha256:..." },
//!     "type": "cosign container image signature"
//!   },
//!   "optional": null
//! }
//! ```
//!
//! The claimed digest is returned, not compared. Cross-checking belongs to
//! the verifier.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::digest::{decode_base64, ContentDigest};
use crate::error::SigError;
use crate::keys::PublicKey;

/// Claim type written by cosign.
pub const SIMPLE_SIGNING_TYPE: &str = "cosign container image signature";

#[derive(Debug, Deserialize)]
struct SimpleSigning {
    critical: Critical,
    #[serde(default)]
    optional: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct Critical {
    identity: Identity,
    image: Image,
    #[serde(rename = "type")]
    claim_type: String,
}

#[derive(Debug, Deserialize)]
struct Identity {
    #[serde(rename = "docker-reference")]
    docker_reference: String,
}

#[derive(Debug, Deserialize)]
struct Image {
    #[serde(rename = "docker-manifest-digest")]
    docker_manifest_digest: String,
}

/// What a verified signature asserts about the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedClaim {
    /// Repository the signer named.
    pub docker_reference: String,

    /// Digest the signer vouched for.
    pub subject_digest: ContentDigest,

    pub claim_type: String,

    /// Free-form annotations from the `optional` section.
    pub annotations: BTreeMap<String, serde_json::Value>,
}

/// Verify a base64 detached signature over `payload`, then decode the claim.
pub fn verify_signature(
    key: &PublicKey,
    signature_b64: &str,
    payload: &[u8],
) -> Result<SignedClaim, SigError> {
    let signature = decode_base64(signature_b64).map_err(|e| SigError::InvalidSignature {
        reason: format!("signature is not base64: {}", e),
    })?;
    key.verify(payload, &signature)?;
    parse_claim(payload)
}

/// Decode a simple-signing claim without checking any signature.
pub fn parse_claim(payload: &[u8]) -> Result<SignedClaim, SigError> {
    let malformed = |reason: String| SigError::MalformedPayload { reason };

    let claim: SimpleSigning = serde_json::from_slice(payload)
        .map_err(|e| malformed(format!("not a simple signing claim: {}", e)))?;
    let subject_digest = ContentDigest::parse(&claim.critical.image.docker_manifest_digest)
        .map_err(|e| malformed(format!("docker-manifest-digest: {}", e)))?;

    Ok(SignedClaim {
        docker_reference: claim.critical.identity.docker_reference,
        subject_digest,
        claim_type: claim.critical.claim_type,
        annotations: claim.optional.unwrap_or_default(),
    })
}
