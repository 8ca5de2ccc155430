//! Container image trust verification.
//!
//! Decides whether an image digest is both signed by a trusted key and
//! durably recorded in a transparency log:
//!
//! - Log lookup by digest, with in-toto entry decoding
//! - Merkle inclusion proofs checked against a signed tree head
//! - Detached (cosign) signature verification with a caller-supplied key,
//!   including any log bundle the signer attached
//! - Cross-checks between the queried digest, the log entry and the signature
//!
//! # Quick Start
//!
//! ```no_run
//! use imgtrust_verify::{LogKey, Verifier, VerifierConfig, VerifyRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VerifierConfig::from_env();
//! let log_key = LogKey::from_pem(&std::fs::read_to_string("rekor.pub")?)?;
//! let verifier = Verifier::from_config(&config, log_key)?;
//!
//! let request = VerifyRequest::parse(
//!     "a2b109fb9baea555556561317fdd13cef9c3dfac22c8f8fea0c5a0b06ece9d00",
//!     "ghcr.io/acme/app@sha256:a2b109fb9baea555556561317fdd13cef9c3dfac22c8f8fea0c5a0b06ece9d00",
//!     &std::fs::read_to_string("cosign.pub")?,
//! )?;
//!
//! let result = verifier.verify(&request).await?;
//! if !result.verified {
//!     for failure in &result.errors {
//!         eprintln!("{}", failure);
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `IMGTRUST_REKOR_URL` | Transparency log URL (default: `https://rekor.sigstore.dev`) |
//! | `IMGTRUST_REGISTRY_TOKEN` | Registry bearer token |
//! | `IMGTRUST_TIMEOUT` | Whole-call deadline in seconds (default: 5) |
//! | `IMGTRUST_MAX_RETRIES` | Max retries for transient failures (default: 3) |

pub mod auth;
pub mod bundle;
pub mod checkpoint;
pub mod digest;
pub mod entry;
pub mod error;
mod http;
pub mod keys;
pub mod merkle;
pub mod oci;
pub mod proof;
pub mod reference;
pub mod signature;
pub mod tlog;
pub mod types;
pub mod verifier;

// Re-export main types
pub use auth::TokenProvider;
pub use bundle::verify_bundle;
pub use checkpoint::SignedTreeHead;
pub use digest::{ContentDigest, DigestAlgorithm, DigestError};
pub use entry::{decode_entry, DecodedAttestationEntry, ProposedEntry};
pub use error::{
    CandidateError, CandidateFailure, DecodeError, ProofError, SigError, TransportError,
    TransportResult, VerifyError,
};
pub use keys::{load_public_key_pem, KeyAlgorithm, LogKey, PublicKey};
pub use oci::{OciRegistryClient, SignatureSource};
pub use proof::verify_entry_inclusion;
pub use reference::{ArtifactReference, ReferenceError};
pub use signature::{parse_claim, verify_signature, SignedClaim};
pub use tlog::{RekorClient, TransparencyLog};
pub use types::{
    FetchedEntry, ImageSignature, InclusionProof, LogEntryId, RawLogEntry, Stage,
    VerificationResult, VerifierConfig,
};
pub use verifier::{Verifier, VerifyOptions, VerifyRequest};
