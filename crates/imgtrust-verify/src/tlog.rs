//! Transparency log client.
//!
//! Public API: no status code knowledge. All HTTP/status mapping in http.rs.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::auth::TokenProvider;
use crate::digest::ContentDigest;
use crate::error::{TransportError, TransportResult};
use crate::http::HttpBackend;
use crate::types::{FetchedEntry, LogEntryId, LogEntryResponse, SearchIndexRequest, VerifierConfig};

/// Read side of a transparency log. No verification happens here.
#[async_trait]
pub trait TransparencyLog: Send + Sync {
    /// Identifiers of entries indexed under `digest`. Empty means none.
    async fn search_by_digest(&self, digest: &ContentDigest) -> TransportResult<Vec<LogEntryId>>;

    /// Entry plus proof material. `NotFound` if the identifier does not resolve.
    async fn fetch_entry(&self, id: &str) -> TransportResult<FetchedEntry>;
}

/// Rekor REST client.
#[derive(Debug, Clone)]
pub struct RekorClient {
    http: HttpBackend,
    base_url: String,
}

impl RekorClient {
    pub fn new(config: &VerifierConfig) -> TransportResult<Self> {
        let http = HttpBackend::new(
            TokenProvider::None,
            config.max_retries,
            Duration::from_secs(config.timeout_secs.max(1)),
        )?;

        Ok(Self {
            http,
            base_url: config.rekor_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TransparencyLog for RekorClient {
    async fn search_by_digest(&self, digest: &ContentDigest) -> TransportResult<Vec<LogEntryId>> {
        let url = format!("{}/api/v1/index/retrieve", self.base_url);
        debug!(url = %url, digest = %digest, "searching log index");

        let request = SearchIndexRequest {
            hash: digest.to_string(),
        };
        let ids: Vec<LogEntryId> = self.http.post_json(&url, &request).await?;

        // The index can list an entry more than once.
        let mut unique: Vec<LogEntryId> = Vec::with_capacity(ids.len());
        for id in ids {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        debug!(count = unique.len(), "log index search complete");
        Ok(unique)
    }

    async fn fetch_entry(&self, id: &str) -> TransportResult<FetchedEntry> {
        let url = format!("{}/api/v1/log/entries/{}", self.base_url, id);
        debug!(url = %url, "fetching log entry");

        let response: LogEntryResponse = self.http.get_json(&url, Some("application/json")).await?;
        let (_, wire) = response
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::invalid_response(format!("entry {} missing from response", id)))?;

        Ok(FetchedEntry::from_wire(id, wire))
    }
}
