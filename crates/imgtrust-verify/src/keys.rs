//! Public keys for signature and tree head verification.
//!
//! Keys arrive as PEM `PUBLIC KEY` blocks (SubjectPublicKeyInfo). The
//! algorithm is detected from the key itself: ECDSA P-256 with SHA-256,
//! Ed25519, or RSA with SHA-256 (PKCS#1 v1.5 or PSS padding). Anything else
//! is [`SigError::UnsupportedAlgorithm`].

use std::fmt;
use std::path::Path;

use p256::ecdsa::signature::Verifier as _;
use pkcs8::DecodePublicKey;
use rsa::sha2::Sha256 as RsaSha256;
use rsa::{Pkcs1v15Sign, Pss, RsaPublicKey};

use crate::digest::sha256;
use crate::error::SigError;

const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";

/// Signature algorithm of a [`PublicKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    EcdsaP256Sha256,
    Ed25519,
    RsaSha256,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EcdsaP256Sha256 => f.write_str("ecdsa-p256-sha256"),
            Self::Ed25519 => f.write_str("ed25519"),
            Self::RsaSha256 => f.write_str("rsa-sha256"),
        }
    }
}

#[derive(Clone)]
enum KeyMaterial {
    EcdsaP256(p256::ecdsa::VerifyingKey),
    Ed25519(ed25519_dalek::VerifyingKey),
    Rsa(RsaPublicKey),
}

/// A verification key plus the SPKI DER it was decoded from.
#[derive(Clone)]
pub struct PublicKey {
    material: KeyMaterial,
    spki_der: Vec<u8>,
}

impl PublicKey {
    /// Decode a PEM `PUBLIC KEY` block.
    pub fn from_pem(pem: &str) -> Result<Self, SigError> {
        let pem = pem.trim();
        let label = pem
            .strip_prefix("-----BEGIN ")
            .and_then(|rest| rest.split_once("-----"))
            .map(|(label, _)| label)
            .ok_or_else(|| SigError::InvalidKey {
                reason: "not a PEM document".to_string(),
            })?;
        if label != PUBLIC_KEY_LABEL {
            return Err(SigError::UnsupportedAlgorithm {
                reason: format!("expected a {} block, got {}", PUBLIC_KEY_LABEL, label),
            });
        }
        let (_, document) = pkcs8::Document::from_pem(pem).map_err(|e| SigError::InvalidKey {
            reason: format!("invalid PEM: {}", e),
        })?;
        Self::from_spki_der(document.as_bytes())
    }

    /// Decode PEM bytes (as embedded in log entries).
    pub fn from_pem_bytes(pem: &[u8]) -> Result<Self, SigError> {
        let pem = std::str::from_utf8(pem).map_err(|_| SigError::InvalidKey {
            reason: "PEM is not UTF-8".to_string(),
        })?;
        Self::from_pem(pem)
    }

    /// Decode a DER SubjectPublicKeyInfo.
    pub fn from_spki_der(der: &[u8]) -> Result<Self, SigError> {
        let material = if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_der(der) {
            KeyMaterial::EcdsaP256(key)
        } else if let Ok(key) = ed25519_dalek::VerifyingKey::from_public_key_der(der) {
            KeyMaterial::Ed25519(key)
        } else if let Ok(key) = RsaPublicKey::from_public_key_der(der) {
            KeyMaterial::Rsa(key)
        } else {
            return Err(SigError::UnsupportedAlgorithm {
                reason: "key is not ECDSA P-256, Ed25519 or RSA".to_string(),
            });
        };
        Ok(Self {
            material,
            spki_der: der.to_vec(),
        })
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self.material {
            KeyMaterial::EcdsaP256(_) => KeyAlgorithm::EcdsaP256Sha256,
            KeyMaterial::Ed25519(_) => KeyAlgorithm::Ed25519,
            KeyMaterial::Rsa(_) => KeyAlgorithm::RsaSha256,
        }
    }

    pub fn spki_der(&self) -> &[u8] {
        &self.spki_der
    }

    /// Hex SHA-256 of the SPKI DER.
    pub fn fingerprint(&self) -> String {
        hex::encode(sha256(&self.spki_der))
    }

    /// Verify `signature` over `message`.
    ///
    /// ECDSA signatures may be ASN.1 DER or raw 64-byte `r || s`. RSA
    /// signatures may use PKCS#1 v1.5 or PSS padding.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SigError> {
        match &self.material {
            KeyMaterial::EcdsaP256(key) => {
                let signature = p256::ecdsa::Signature::from_der(signature)
                    .or_else(|_| p256::ecdsa::Signature::from_slice(signature))
                    .map_err(|_| {
                        SigError::invalid(format!(
                            "{}-byte signature is not a valid ECDSA P-256 signature",
                            signature.len()
                        ))
                    })?;
                key.verify(message, &signature)
                    .map_err(|_| SigError::invalid("ecdsa verification failed"))
            }
            KeyMaterial::Ed25519(key) => {
                let signature = ed25519_dalek::Signature::from_slice(signature).map_err(|_| {
                    SigError::UnsupportedAlgorithm {
                        reason: format!(
                            "{}-byte signature is not an Ed25519 signature",
                            signature.len()
                        ),
                    }
                })?;
                key.verify_strict(message, &signature)
                    .map_err(|_| SigError::invalid("ed25519 verification failed"))
            }
            KeyMaterial::Rsa(key) => {
                let hashed = sha256(message);
                key.verify(Pkcs1v15Sign::new::<RsaSha256>(), &hashed, signature)
                    .or_else(|_| key.verify(Pss::new::<RsaSha256>(), &hashed, signature))
                    .map_err(|_| SigError::invalid("rsa verification failed"))
            }
        }
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.spki_der == other.spki_der
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("algorithm", &self.algorithm())
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

/// Read a PEM public key from a file.
pub fn load_public_key_pem(path: &Path) -> Result<PublicKey, SigError> {
    let pem = std::fs::read_to_string(path).map_err(|e| SigError::InvalidKey {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    PublicKey::from_pem(&pem)
}

/// The transparency log's signing key.
///
/// The log ID is the SHA-256 of the key's SPKI DER; signed notes identify
/// the key by the first four bytes of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogKey {
    key: PublicKey,
    log_id: [u8; 32],
}

impl LogKey {
    pub fn new(key: PublicKey) -> Self {
        let log_id = sha256(key.spki_der());
        Self { key, log_id }
    }

    pub fn from_pem(pem: &str) -> Result<Self, SigError> {
        PublicKey::from_pem(pem).map(Self::new)
    }

    pub fn load(path: &Path) -> Result<Self, SigError> {
        load_public_key_pem(path).map(Self::new)
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.key
    }

    /// Hex log ID, as it appears in log entries.
    pub fn log_id(&self) -> String {
        hex::encode(self.log_id)
    }

    /// Key hint carried in signed-note signature lines.
    pub fn key_hint(&self) -> [u8; 4] {
        let mut hint = [0u8; 4];
        hint.copy_from_slice(&self.log_id[..4]);
        hint
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), SigError> {
        self.key.verify(message, signature)
    }
}

#[cfg(test)]
pub(crate) mod test_keys {
    use std::sync::OnceLock;

    use p256::ecdsa::signature::Signer as _;
    use pkcs8::{EncodePublicKey, LineEnding};
    use rsa::sha2::{Digest, Sha256};
    use rsa::{Pkcs1v15Sign, Pss};

    pub fn ecdsa_signing_key(seed: u8) -> p256::ecdsa::SigningKey {
        p256::ecdsa::SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    pub fn ecdsa_pem(key: &p256::ecdsa::SigningKey) -> String {
        key.verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    }

    pub fn ecdsa_sign(key: &p256::ecdsa::SigningKey, message: &[u8]) -> Vec<u8> {
        let signature: p256::ecdsa::Signature = key.sign(message);
        signature.to_der().as_bytes().to_vec()
    }

    pub fn ed25519_signing_key(seed: u8) -> ed25519_dalek::SigningKey {
        ed25519_dalek::SigningKey::from_bytes(&[seed; 32])
    }

    pub fn ed25519_pem(key: &ed25519_dalek::SigningKey) -> String {
        key.verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    }

    pub fn ed25519_sign(key: &ed25519_dalek::SigningKey, message: &[u8]) -> Vec<u8> {
        use ed25519_dalek::Signer as _;
        key.sign(message).to_bytes().to_vec()
    }

    /// One RSA key per test run; generation is slow.
    pub fn rsa_signing_key() -> &'static rsa::RsaPrivateKey {
        static KEY: OnceLock<rsa::RsaPrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            let mut rng = rand::thread_rng();
            rsa::RsaPrivateKey::new(&mut rng, 2048).expect("failed to generate key")
        })
    }

    pub fn rsa_pem(key: &rsa::RsaPrivateKey) -> String {
        key.to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    }

    pub fn rsa_pkcs1v15_sign(key: &rsa::RsaPrivateKey, message: &[u8]) -> Vec<u8> {
        key.sign(Pkcs1v15Sign::new::<Sha256>(), &Sha256::digest(message))
            .unwrap()
    }

    pub fn rsa_pss_sign(key: &rsa::RsaPrivateKey, message: &[u8]) -> Vec<u8> {
        let mut rng = rand::thread_rng();
        key.sign_with_rng(&mut rng, Pss::new::<Sha256>(), &Sha256::digest(message))
            .unwrap()
    }
}
