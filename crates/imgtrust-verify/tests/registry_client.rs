//! Integration tests for OciRegistryClient.
//!
//! Uses wiremock as a fake OCI distribution endpoint. Tests cover tag
//! resolution, the `.sig` manifest convention, auth and error mapping.

mod common;

use imgtrust_verify::oci::{signature_tag, BUNDLE_ANNOTATION, SIGNATURE_ANNOTATION};
use imgtrust_verify::{
    ArtifactReference, ContentDigest, OciRegistryClient, SignatureSource, TransportError,
    VerifierConfig,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{image_digest, simple_signing, TestSigner};

fn create_test_client(token: Option<&str>) -> OciRegistryClient {
    let mut config = VerifierConfig::default()
        .with_insecure_registry(true)
        .with_max_retries(0);
    if let Some(token) = token {
        config = config.with_registry_token(token);
    }
    OciRegistryClient::new(&config).expect("failed to create client")
}

fn reference(mock_server: &MockServer, suffix: &str) -> ArtifactReference {
    ArtifactReference::parse(&format!("{}/acme/app{}", mock_server.address(), suffix))
        .expect("valid reference")
}

fn signature_manifest(layers: &[(&[u8], Vec<(&str, String)>)]) -> serde_json::Value {
    let layers: Vec<_> = layers
        .iter()
        .map(|(payload, annotations)| {
            let annotations: serde_json::Map<String, serde_json::Value> = annotations
                .iter()
                .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
                .collect();
            serde_json::json!({
                "mediaType": "application/vnd.dev.cosign.simplesigning.v1+json",
                "digest": ContentDigest::sha256_of(payload).to_string(),
                "size": payload.len(),
                "annotations": annotations
            })
        })
        .collect();
    serde_json::json!({
        "schemaVersion": 2,
        "mediaType": "application/vnd.oci.image.manifest.v1+json",
        "layers": layers
    })
}

async fn mount_blob(mock_server: &MockServer, payload: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!(
            "/v2/acme/app/blobs/{}",
            ContentDigest::sha256_of(payload)
        )))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(payload.to_vec()))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_fetch_signatures_by_digest() {
    let mock_server = MockServer::start().await;
    let digest = image_digest();
    let signer = TestSigner::new(3);
    let payload = simple_signing("registry.test/acme/app", &digest);
    let signature = signer.sign_b64(&payload);

    Mock::given(method("GET"))
        .and(path(format!(
            "/v2/acme/app/manifests/{}",
            signature_tag(&digest)
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(signature_manifest(&[(
            payload.as_slice(),
            vec![(SIGNATURE_ANNOTATION, signature.clone())],
        )])))
        .mount(&mock_server)
        .await;
    mount_blob(&mock_server, &payload).await;

    let client = create_test_client(None);
    let signatures = client
        .fetch_signatures(&reference(&mock_server, &format!("@{}", digest)))
        .await
        .expect("fetch failed");

    assert_eq!(signatures.len(), 1);
    assert_eq!(signatures[0].base64_signature, signature);
    assert_eq!(signatures[0].payload, payload);
    assert_eq!(
        signatures[0].layer_digest,
        Some(ContentDigest::sha256_of(&payload))
    );
    assert!(signatures[0].bundle.is_none());
}

#[tokio::test]
async fn test_tag_resolved_from_digest_header() {
    let mock_server = MockServer::start().await;
    let digest = image_digest();
    let payload = simple_signing("registry.test/acme/app", &digest);

    Mock::given(method("HEAD"))
        .and(path("/v2/acme/app/manifests/v1"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("docker-content-digest", digest.to_string()),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/v2/acme/app/manifests/{}",
            signature_tag(&digest)
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(signature_manifest(&[(
            payload.as_slice(),
            vec![(SIGNATURE_ANNOTATION, "c2ln".to_string())],
        )])))
        .mount(&mock_server)
        .await;
    mount_blob(&mock_server, &payload).await;

    let client = create_test_client(None);
    let signatures = client
        .fetch_signatures(&reference(&mock_server, ":v1"))
        .await
        .expect("fetch failed");
    assert_eq!(signatures.len(), 1);
}

#[tokio::test]
async fn test_tag_resolved_by_hashing_manifest() {
    let mock_server = MockServer::start().await;
    let manifest = br#"{"schemaVersion":2,"layers":[]}"#.to_vec();
    let digest = ContentDigest::sha256_of(&manifest);

    Mock::given(method("HEAD"))
        .and(path("/v2/acme/app/manifests/v2"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/acme/app/manifests/v2"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(manifest))
        .mount(&mock_server)
        .await;

    let client = create_test_client(None);
    let resolved = client
        .resolve_digest(&reference(&mock_server, ":v2"))
        .await
        .expect("resolve failed");
    assert_eq!(resolved, digest);
}

#[tokio::test]
async fn test_unsigned_image_yields_empty_list() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/v2/acme/app/manifests/{}",
            signature_tag(&image_digest())
        )))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = create_test_client(None);
    let signatures = client
        .fetch_signatures(&reference(&mock_server, &format!("@{}", image_digest())))
        .await
        .expect("404 is not an error");
    assert!(signatures.is_empty());
}

#[tokio::test]
async fn test_layers_without_signature_are_skipped() {
    let mock_server = MockServer::start().await;
    let digest = image_digest();
    let signed = simple_signing("registry.test/acme/app", &digest);
    let other = b"attestation".to_vec();
    let bundle = serde_json::json!({
        "SignedEntryTimestamp": "c2V0",
        "Payload": {
            "body": "Ym9keQ==",
            "integratedTime": 1_700_000_000,
            "logIndex": 12,
            "logID": "c0d23d6a"
        }
    })
    .to_string();

    Mock::given(method("GET"))
        .and(path(format!(
            "/v2/acme/app/manifests/{}",
            signature_tag(&digest)
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(signature_manifest(&[
            (other.as_slice(), vec![]),
            (
                signed.as_slice(),
                vec![
                    (SIGNATURE_ANNOTATION, "c2ln".to_string()),
                    (BUNDLE_ANNOTATION, bundle),
                ],
            ),
        ])))
        .mount(&mock_server)
        .await;
    mount_blob(&mock_server, &signed).await;

    let client = create_test_client(None);
    let signatures = client
        .fetch_signatures(&reference(&mock_server, &format!("@{}", digest)))
        .await
        .expect("fetch failed");

    assert_eq!(signatures.len(), 1);
    let bundle = signatures[0].bundle.as_ref().expect("bundle parsed");
    assert_eq!(bundle.payload.log_index, 12);
}

#[tokio::test]
async fn test_blob_digest_mismatch_is_rejected() {
    let mock_server = MockServer::start().await;
    let digest = image_digest();
    let payload = simple_signing("registry.test/acme/app", &digest);

    Mock::given(method("GET"))
        .and(path(format!(
            "/v2/acme/app/manifests/{}",
            signature_tag(&digest)
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(signature_manifest(&[(
            payload.as_slice(),
            vec![(SIGNATURE_ANNOTATION, "c2ln".to_string())],
        )])))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/v2/acme/app/blobs/{}",
            ContentDigest::sha256_of(&payload)
        )))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tampered".to_vec()))
        .mount(&mock_server)
        .await;

    let client = create_test_client(None);
    let result = client
        .fetch_signatures(&reference(&mock_server, &format!("@{}", digest)))
        .await;
    assert!(matches!(result, Err(TransportError::InvalidResponse { .. })));
}

#[tokio::test]
async fn test_bearer_token_is_sent() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/v2/acme/app/manifests/{}",
            signature_tag(&image_digest())
        )))
        .and(header("authorization", "Bearer registry-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(signature_manifest(&[])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(Some("registry-token"));
    let signatures = client
        .fetch_signatures(&reference(&mock_server, &format!("@{}", image_digest())))
        .await
        .expect("fetch failed");
    assert!(signatures.is_empty());
}

#[tokio::test]
async fn test_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(format!(
            "/v2/acme/app/manifests/{}",
            signature_tag(&image_digest())
        )))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let client = create_test_client(None);
    let result = client
        .fetch_signatures(&reference(&mock_server, &format!("@{}", image_digest())))
        .await;
    assert!(matches!(result, Err(TransportError::Unauthorized { .. })));
}
