//! Signed tree heads in signed-note ("checkpoint") form.
//!
//! ```text
//! rekor.sigstore.dev - 1193050959916656506
//! 538772043
//! 47UyG5C0SdruSFATSNsyL0N32rNwQCkWz/VQhpQfV8w=
//!
//! — rekor.sigstore.dev wNI9ajBEAiAk...
//! ```
//!
//! The signed message is the note text up to and including the newline
//! before the blank line. Each signature line carries a base64 blob whose
//! first four bytes are the signing key's hint.

use crate::digest::decode_base64;
use crate::error::ProofError;
use crate::keys::LogKey;
use crate::merkle::Hash;

const SIGNATURE_PREFIX: &str = "\u{2014} ";

/// One signature line of a signed note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteSignature {
    pub name: String,
    pub key_hint: [u8; 4],
    pub signature: Vec<u8>,
}

/// A parsed signed tree head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTreeHead {
    pub origin: String,
    pub tree_size: u64,
    pub root_hash: Hash,

    /// Optional extension lines after the root hash.
    pub extensions: Vec<String>,

    pub signatures: Vec<NoteSignature>,

    signed_data: String,
}

impl SignedTreeHead {
    /// Parse a signed note.
    pub fn parse(note: &str) -> Result<Self, ProofError> {
        let split = note
            .find("\n\n")
            .ok_or_else(|| ProofError::malformed("checkpoint has no signature block"))?;
        let (body, signature_block) = (&note[..split + 1], &note[split + 2..]);

        let mut lines = body.lines();
        let origin = lines
            .next()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| ProofError::malformed("checkpoint has no origin"))?
            .to_string();
        let tree_size = lines
            .next()
            .ok_or_else(|| ProofError::malformed("checkpoint has no tree size"))?
            .parse::<u64>()
            .map_err(|e| ProofError::malformed(format!("checkpoint tree size: {}", e)))?;
        let root_line = lines
            .next()
            .ok_or_else(|| ProofError::malformed("checkpoint has no root hash"))?;
        let root_bytes = decode_base64(root_line)
            .map_err(|e| ProofError::malformed(format!("checkpoint root hash: {}", e)))?;
        if root_bytes.len() != 32 {
            return Err(ProofError::malformed(format!(
                "checkpoint root hash must be 32 bytes, got {}",
                root_bytes.len()
            )));
        }
        let mut root_hash = [0u8; 32];
        root_hash.copy_from_slice(&root_bytes);
        let extensions = lines.map(str::to_string).collect();

        let signatures = signature_block
            .lines()
            .filter(|l| !l.is_empty())
            .map(parse_signature_line)
            .collect::<Result<Vec<_>, _>>()?;
        if signatures.is_empty() {
            return Err(ProofError::bad_signature("checkpoint is unsigned"));
        }

        Ok(Self {
            origin,
            tree_size,
            root_hash,
            extensions,
            signatures,
            signed_data: body.to_string(),
        })
    }

    /// Bytes covered by the note signatures.
    pub fn signed_data(&self) -> &[u8] {
        self.signed_data.as_bytes()
    }

    /// Check that `log_key` signed this tree head.
    ///
    /// Signature lines from other keys are ignored.
    pub fn verify(&self, log_key: &LogKey) -> Result<(), ProofError> {
        let hint = log_key.key_hint();
        let mut last_error = None;
        for sig in self.signatures.iter().filter(|s| s.key_hint == hint) {
            match log_key.verify(self.signed_data(), &sig.signature) {
                Ok(()) => return Ok(()),
                Err(e) => last_error = Some(e),
            }
        }
        Err(match last_error {
            Some(e) => ProofError::bad_signature(e.to_string()),
            None => ProofError::bad_signature(format!(
                "no signature from log {} on checkpoint",
                log_key.log_id()
            )),
        })
    }
}

fn parse_signature_line(line: &str) -> Result<NoteSignature, ProofError> {
    let rest = line
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or_else(|| ProofError::malformed(format!("bad checkpoint signature line {:?}", line)))?;
    let (name, blob) = rest
        .rsplit_once(' ')
        .ok_or_else(|| ProofError::malformed("checkpoint signature line has no signature"))?;
    let blob = decode_base64(blob)
        .map_err(|e| ProofError::malformed(format!("checkpoint signature: {}", e)))?;
    if blob.len() <= 4 {
        return Err(ProofError::malformed("checkpoint signature is too short"));
    }
    let mut key_hint = [0u8; 4];
    key_hint.copy_from_slice(&blob[..4]);
    Ok(NoteSignature {
        name: name.to_string(),
        key_hint,
        signature: blob[4..].to_vec(),
    })
}
