//! RFC 9162 Merkle tree hashing and inclusion proof checking.
//!
//! Leaves hash as `SHA-256(0x00 || data)`, interior nodes as
//! `SHA-256(0x01 || left || right)`. Domain separation keeps a leaf from
//! being passed off as an interior node.

use sha2::{Digest, Sha256};

use crate::error::ProofError;

/// A SHA-256 tree node.
pub type Hash = [u8; 32];

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

/// Hash of a leaf holding `data`.
pub fn leaf_hash(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([LEAF_PREFIX]);
    hasher.update(data);
    finalize(hasher)
}

/// Hash of an interior node with children `left` and `right`.
pub fn node_hash(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update([NODE_PREFIX]);
    hasher.update(left);
    hasher.update(right);
    finalize(hasher)
}

fn finalize(hasher: Sha256) -> Hash {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Decode a hex node hash, rejecting anything but 32 bytes.
pub fn parse_hash(hex_value: &str) -> Result<Hash, ProofError> {
    let bytes = hex::decode(hex_value)
        .map_err(|e| ProofError::malformed(format!("invalid hash {:?}: {}", hex_value, e)))?;
    if bytes.len() != 32 {
        return Err(ProofError::malformed(format!(
            "hash must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Recompute the root implied by `leaf` at `index` in a tree of `tree_size`
/// leaves, following the audit `path` from leaf to root.
pub fn root_from_inclusion_proof(
    leaf: &Hash,
    index: u64,
    tree_size: u64,
    path: &[Hash],
) -> Result<Hash, ProofError> {
    if index >= tree_size {
        return Err(ProofError::malformed(format!(
            "leaf index {} outside tree of size {}",
            index, tree_size
        )));
    }

    let mut fn_ = index;
    let mut sn = tree_size - 1;
    let mut root = *leaf;

    for sibling in path {
        if sn == 0 {
            return Err(ProofError::malformed("audit path is longer than the tree"));
        }
        if fn_ & 1 == 1 || fn_ == sn {
            root = node_hash(sibling, &root);
            // Skip levels where this node is a left child with no right sibling.
            while fn_ & 1 == 0 && fn_ != 0 {
                fn_ >>= 1;
                sn >>= 1;
            }
        } else {
            root = node_hash(&root, sibling);
        }
        fn_ >>= 1;
        sn >>= 1;
    }

    if sn != 0 {
        return Err(ProofError::malformed("audit path is shorter than the tree"));
    }
    Ok(root)
}

/// Check that `leaf` at `index` is included in the tree with root `expected_root`.
pub fn verify_inclusion(
    leaf: &Hash,
    index: u64,
    tree_size: u64,
    path: &[Hash],
    expected_root: &Hash,
) -> Result<(), ProofError> {
    let computed = root_from_inclusion_proof(leaf, index, tree_size, path)?;
    if &computed != expected_root {
        return Err(ProofError::RootMismatch {
            expected: hex::encode(expected_root),
            computed: hex::encode(computed),
        });
    }
    Ok(())
}
