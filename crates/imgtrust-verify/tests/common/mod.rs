//! Shared fixtures: deterministic keys, a small log, signed payloads.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use imgtrust_verify::merkle::{leaf_hash, node_hash, Hash};
use imgtrust_verify::{ContentDigest, LogKey};
use p256::ecdsa::signature::Signer;
use pkcs8::{EncodePublicKey, LineEnding};
use serde_json::json;

pub const IMAGE_HEX: &str = "a2b109fb9baea555556561317fdd13cef9c3dfac22c8f8fea0c5a0b06ece9d00";

pub struct TestLog {
    pub signing: p256::ecdsa::SigningKey,
    pub key: LogKey,
    pub pem: String,
}

impl TestLog {
    pub fn new(seed: u8) -> Self {
        let signing = p256::ecdsa::SigningKey::from_slice(&[seed; 32]).unwrap();
        let pem = signing
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        let key = LogKey::from_pem(&pem).unwrap();
        Self { signing, key, pem }
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let signature: p256::ecdsa::Signature = self.signing.sign(message);
        signature.to_der().as_bytes().to_vec()
    }

    /// JSON for `GET /api/v1/log/entries/{uuid}`: the entry's body appended
    /// after `filler` other leaves, with proof, checkpoint, entry timestamp
    /// and the attested statement.
    pub fn entry_response(&self, uuid: &str, entry: &IntotoEntry, filler: usize) -> serde_json::Value {
        let body = entry.body.as_slice();
        let mut leaves: Vec<Hash> = (0..filler)
            .map(|i| leaf_hash(format!("leaf-{}", i).as_bytes()))
            .collect();
        leaves.push(leaf_hash(body));
        let index = leaves.len() - 1;
        let root = tree_root(&leaves);

        let note_body = format!(
            "rekor.example.dev - 42\n{}\n{}\n",
            leaves.len(),
            BASE64.encode(root)
        );
        let mut blob = self.key.key_hint().to_vec();
        blob.extend(self.sign(note_body.as_bytes()));
        let checkpoint = format!(
            "{}\n\u{2014} rekor.example.dev {}\n",
            note_body,
            BASE64.encode(&blob)
        );

        let body_b64 = BASE64.encode(body);
        let log_index = 7000 + index as u64;
        let integrated_time = 1_700_000_000i64;
        let set_payload = serde_jcs::to_vec(&json!({
            "body": body_b64,
            "integratedTime": integrated_time,
            "logID": self.key.log_id(),
            "logIndex": log_index,
        }))
        .unwrap();

        json!({
            uuid: {
                "body": body_b64,
                "integratedTime": integrated_time,
                "logID": self.key.log_id(),
                "logIndex": log_index,
                "attestation": { "data": BASE64.encode(&entry.statement) },
                "verification": {
                    "inclusionProof": {
                        "checkpoint": checkpoint,
                        "hashes": audit_path(index, &leaves).iter().map(hex::encode).collect::<Vec<_>>(),
                        "logIndex": index,
                        "rootHash": hex::encode(root),
                        "treeSize": leaves.len()
                    },
                    "signedEntryTimestamp": BASE64.encode(self.sign(&set_payload))
                }
            }
        })
    }
}

pub struct TestSigner {
    pub signing: p256::ecdsa::SigningKey,
    pub pem: String,
}

impl TestSigner {
    pub fn new(seed: u8) -> Self {
        let signing = p256::ecdsa::SigningKey::from_slice(&[seed; 32]).unwrap();
        let pem = signing
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        Self { signing, pem }
    }

    pub fn sign_b64(&self, message: &[u8]) -> String {
        let signature: p256::ecdsa::Signature = self.signing.sign(message);
        BASE64.encode(signature.to_der().as_bytes())
    }
}

fn split(n: usize) -> usize {
    let mut k = 1;
    while k << 1 < n {
        k <<= 1;
    }
    k
}

pub fn tree_root(leaves: &[Hash]) -> Hash {
    if leaves.len() == 1 {
        return leaves[0];
    }
    let k = split(leaves.len());
    node_hash(&tree_root(&leaves[..k]), &tree_root(&leaves[k..]))
}

pub fn audit_path(index: usize, leaves: &[Hash]) -> Vec<Hash> {
    if leaves.len() == 1 {
        return Vec::new();
    }
    let k = split(leaves.len());
    let (mut path, sibling) = if index < k {
        (audit_path(index, &leaves[..k]), tree_root(&leaves[k..]))
    } else {
        (audit_path(index - k, &leaves[k..]), tree_root(&leaves[..k]))
    };
    path.push(sibling);
    path
}

/// Canonical intoto v0.0.1 entry: the body records hashes only and the log
/// serves the statement beside it.
pub struct IntotoEntry {
    pub body: Vec<u8>,
    pub statement: Vec<u8>,
}

/// intoto v0.0.1 entry attesting `subjects`, signed by `public_key_pem`.
pub fn intoto_entry(subjects: &[&ContentDigest], public_key_pem: &str) -> IntotoEntry {
    let subjects: Vec<_> = subjects
        .iter()
        .enumerate()
        .map(|(i, s)| json!({ "name": format!("app-{}", i), "digest": { "sha256": s.hex() } }))
        .collect();
    let statement = serde_json::to_vec(&json!({
        "_type": "https://in-toto.io/Statement/v0.1",
        "predicateType": "https://slsa.dev/provenance/v0.2",
        "subject": subjects,
        "predicate": {}
    }))
    .unwrap();
    let envelope = json!({
        "payloadType": "application/vnd.in-toto+json",
        "payload": BASE64.encode(&statement),
        "signatures": [{ "keyid": "", "sig": BASE64.encode(b"sig") }]
    });
    let body = serde_json::to_vec(&json!({
        "apiVersion": "0.0.1",
        "kind": "intoto",
        "spec": {
            "content": {
                "hash": { "algorithm": "sha256", "value": ContentDigest::sha256_of(envelope.to_string().as_bytes()).hex() },
                "payloadHash": { "algorithm": "sha256", "value": ContentDigest::sha256_of(&statement).hex() }
            },
            "publicKey": BASE64.encode(public_key_pem)
        }
    }))
    .unwrap();
    IntotoEntry { body, statement }
}

/// cosign simple-signing payload for `subject`.
pub fn simple_signing(reference: &str, subject: &ContentDigest) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "critical": {
            "identity": { "docker-reference": reference },
            "image": { "docker-manifest-digest": subject.to_string() },
            "type": "cosign container image signature"
        },
        "optional": null
    }))
    .unwrap()
}

pub fn image_digest() -> ContentDigest {
    ContentDigest::parse(IMAGE_HEX).unwrap()
}
