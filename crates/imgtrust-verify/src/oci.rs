//! Registry client for signature discovery.
//!
//! Signatures follow the cosign tag convention: for an image with manifest
//! digest `sha256:<hex>`, signatures live in the manifest tagged
//! `sha256-<hex>.sig`, one layer per signature. The layer blob is the signed
//! payload and its annotations carry the signature and optional bundle.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::digest::ContentDigest;
use crate::error::{TransportError, TransportResult};
use crate::http::HttpBackend;
use crate::reference::ArtifactReference;
use crate::types::{ImageSignature, OciManifest, SignatureBundle, VerifierConfig};

/// Layer annotation holding the base64 signature.
pub const SIGNATURE_ANNOTATION: &str = "dev.cosignproject.cosign/signature";

/// Layer annotation holding the log bundle JSON.
pub const BUNDLE_ANNOTATION: &str = "dev.sigstore.cosign/bundle";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
                               application/vnd.docker.distribution.manifest.v2+json";

const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

/// Source of detached signatures for an artifact. No verification happens here.
#[async_trait]
pub trait SignatureSource: Send + Sync {
    /// All signatures stored for `reference`. Empty when none exist.
    async fn fetch_signatures(
        &self,
        reference: &ArtifactReference,
    ) -> TransportResult<Vec<ImageSignature>>;
}

/// OCI distribution API client.
#[derive(Debug, Clone)]
pub struct OciRegistryClient {
    http: HttpBackend,
    scheme: String,
}

impl OciRegistryClient {
    pub fn new(config: &VerifierConfig) -> TransportResult<Self> {
        let token_provider = TokenProvider::from_option(config.registry_token.as_deref());
        Self::with_token_provider(config, token_provider)
    }

    pub fn with_token_provider(
        config: &VerifierConfig,
        token_provider: TokenProvider,
    ) -> TransportResult<Self> {
        let http = HttpBackend::new(
            token_provider,
            config.max_retries,
            Duration::from_secs(config.timeout_secs.max(1)),
        )?;
        Ok(Self {
            http,
            scheme: config.registry_scheme.clone(),
        })
    }

    fn manifest_url(&self, reference: &ArtifactReference, manifest: &str) -> String {
        format!(
            "{}://{}/v2/{}/manifests/{}",
            self.scheme,
            reference.registry(),
            reference.repository(),
            manifest
        )
    }

    fn blob_url(&self, reference: &ArtifactReference, digest: &str) -> String {
        format!(
            "{}://{}/v2/{}/blobs/{}",
            self.scheme,
            reference.registry(),
            reference.repository(),
            digest
        )
    }

    /// Manifest digest of `reference`, resolving its tag if it is not pinned.
    pub async fn resolve_digest(
        &self,
        reference: &ArtifactReference,
    ) -> TransportResult<ContentDigest> {
        if let Some(digest) = reference.digest() {
            return Ok(digest.clone());
        }

        let url = self.manifest_url(reference, &reference.manifest_reference());
        debug!(url = %url, "resolving tag");
        let headers = self.http.head(&url, Some(MANIFEST_ACCEPT)).await?;

        match headers
            .get(CONTENT_DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            Some(digest) => ContentDigest::parse(digest).map_err(|e| {
                TransportError::invalid_response(format!("{}: {}", CONTENT_DIGEST_HEADER, e))
            }),
            None => {
                // Registry did not say; hash the manifest ourselves.
                let manifest = self.http.get_bytes(&url).await?;
                Ok(ContentDigest::sha256_of(&manifest))
            }
        }
    }
}

/// Tag under which signatures for `digest` are stored.
pub fn signature_tag(digest: &ContentDigest) -> String {
    format!("{}-{}.sig", digest.algorithm(), digest.hex())
}

#[async_trait]
impl SignatureSource for OciRegistryClient {
    async fn fetch_signatures(
        &self,
        reference: &ArtifactReference,
    ) -> TransportResult<Vec<ImageSignature>> {
        let digest = self.resolve_digest(reference).await?;
        let url = self.manifest_url(reference, &signature_tag(&digest));
        debug!(url = %url, "fetching signature manifest");

        let manifest: OciManifest = match self.http.get_json(&url, Some(MANIFEST_ACCEPT)).await {
            Ok(manifest) => manifest,
            Err(TransportError::NotFound { .. }) => {
                debug!(reference = %reference, "no signature manifest (image may be unsigned)");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut signatures = Vec::with_capacity(manifest.layers.len());
        for layer in &manifest.layers {
            let Some(signature) = layer.annotations.get(SIGNATURE_ANNOTATION) else {
                debug!(layer = %layer.digest, "layer has no signature annotation, skipping");
                continue;
            };

            let layer_digest = ContentDigest::parse(&layer.digest).map_err(|e| {
                TransportError::invalid_response(format!("layer digest {}: {}", layer.digest, e))
            })?;
            let payload = self
                .http
                .get_bytes(&self.blob_url(reference, &layer.digest))
                .await?;
            if ContentDigest::sha256_of(&payload) != layer_digest {
                return Err(TransportError::invalid_response(format!(
                    "blob content does not match digest {}",
                    layer.digest
                )));
            }

            let bundle = layer.annotations.get(BUNDLE_ANNOTATION).and_then(|raw| {
                serde_json::from_str::<SignatureBundle>(raw)
                    .map_err(|e| warn!(layer = %layer.digest, error = %e, "ignoring unparseable bundle"))
                    .ok()
            });

            signatures.push(ImageSignature {
                base64_signature: signature.clone(),
                payload,
                layer_digest: Some(layer_digest),
                bundle,
            });
        }

        debug!(count = signatures.len(), "signature discovery complete");
        Ok(signatures)
    }
}
