//! HTTP collaborators for the upstream data sources.
//!
//! Two hosts are involved: the source-control host (tag listings and file
//! contents at a ref) and the SDK package repository (platform archives).
//! Both clients translate HTTP status into [`FetchError`] so callers can tell
//! expected absence (`NotFound`) apart from everything else. Neither client
//! retries; fallback over *versions* is the resolver's job and transient
//! transport faults are fatal to the run.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by the HTTP collaborators.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The resource does not exist at the requested location. Expected for
    /// sparse version spaces; callers map this to a not-found outcome.
    #[error("not found: {url}")]
    NotFound { url: String },

    /// Any non-2xx status other than 404.
    #[error("request for {url} failed with status {status}")]
    Status { url: String, status: StatusCode },

    /// Connection, TLS, or timeout failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response arrived but could not be decoded.
    #[error("malformed response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// Local I/O failure while persisting a download.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Builds the HTTP client shared by all collaborators.
pub fn build_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
}

// ============================================================================
// Source-control host
// ============================================================================

/// Client for the source-control host (Gitiles-style endpoints).
pub struct GitilesClient {
    client: Client,
    base: String,
}

impl GitilesClient {
    pub fn new(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }

    async fn get(&self, url: String) -> Result<reqwest::Response, FetchError> {
        debug!(url = %url, "GET");
        let response = self.client.get(&url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(FetchError::NotFound { url }),
            status => Err(FetchError::Status { url, status }),
        }
    }

    /// Fetches one source file of `project` at `reference`.
    ///
    /// The host serves file contents base64-encoded (`?format=TEXT`); the
    /// decoded UTF-8 text is returned.
    ///
    /// # Errors
    ///
    /// `NotFound` when the path or the ref does not exist; `Decode` when the
    /// payload is not valid base64/UTF-8.
    pub async fn source_file(
        &self,
        project: &str,
        reference: &str,
        path: &str,
    ) -> Result<String, FetchError> {
        let url = format!(
            "{}/{}/+/{}/{}?format=TEXT",
            self.base, project, reference, path
        );
        let body = self.get(url.clone()).await?.text().await?;
        decode_text_payload(&body).map_err(|reason| FetchError::Decode { url, reason })
    }

    /// Lists all tag names of `project`.
    pub async fn list_tags(&self, project: &str) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/{}/+refs/tags?format=JSON", self.base, project);
        let body = self.get(url.clone()).await?.text().await?;
        parse_ref_listing(&body).map_err(|reason| FetchError::Decode { url, reason })
    }
}

/// Decodes a base64 `?format=TEXT` payload into UTF-8 text.
fn decode_text_payload(body: &str) -> Result<String, String> {
    // The encoder may wrap lines; strip all whitespace before decoding.
    let compact: String = body.split_whitespace().collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|e| format!("invalid base64: {e}"))?;
    String::from_utf8(bytes).map_err(|e| format!("invalid UTF-8: {e}"))
}

/// Parses a `+refs` JSON listing into its ref names.
///
/// The host prefixes JSON responses with the `)]}'` anti-XSSI marker.
fn parse_ref_listing(body: &str) -> Result<Vec<String>, String> {
    let json = body
        .strip_prefix(")]}'")
        .map(|rest| rest.trim_start_matches('\n'))
        .unwrap_or(body);
    let refs: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(json).map_err(|e| format!("invalid JSON: {e}"))?;
    Ok(refs.into_keys().collect())
}

// ============================================================================
// SDK package repository
// ============================================================================

/// Client for the SDK package repository.
pub struct SdkRepoClient {
    client: Client,
    base: String,
}

impl SdkRepoClient {
    /// Name of the repository index document.
    pub const REPOSITORY_INDEX: &'static str = "repository2-1.xml";

    pub fn new(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }

    async fn get(&self, url: String) -> Result<reqwest::Response, FetchError> {
        debug!(url = %url, "GET");
        let response = self.client.get(&url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(FetchError::NotFound { url }),
            status => Err(FetchError::Status { url, status }),
        }
    }

    /// Fetches the raw repository index XML.
    pub async fn repository_index(&self) -> Result<String, FetchError> {
        let url = format!("{}/{}", self.base, Self::REPOSITORY_INDEX);
        Ok(self.get(url).await?.text().await?)
    }

    /// Downloads `archive_name` into `dest_dir`, returning the local path.
    ///
    /// An archive already present on disk is reused without a fetch.
    pub async fn download_archive(
        &self,
        archive_name: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, FetchError> {
        let local_path = dest_dir.join(archive_name);
        if local_path.is_file() {
            debug!(path = %local_path.display(), "archive already cached");
            return Ok(local_path);
        }

        let url = format!("{}/{}", self.base, archive_name);
        let bytes = self.get(url).await?.bytes().await?;

        tokio::fs::create_dir_all(dest_dir).await?;
        // Whole-file write to a temp sibling, then rename: an interrupt never
        // leaves a truncated archive that a later run would trust.
        let tmp_path = local_path.with_extension("part");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, &local_path).await?;

        Ok(local_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_payload_decodes_with_line_wrapping() {
        // "hello\nworld" encoded, wrapped across lines
        let body = "aGVsbG8K\nd29ybGQ=\n";
        assert_eq!(decode_text_payload(body).unwrap(), "hello\nworld");
    }

    #[test]
    fn test_text_payload_rejects_invalid_base64() {
        assert!(decode_text_payload("!!not base64!!").is_err());
    }

    #[test]
    fn test_ref_listing_strips_anti_xssi_prefix() {
        let body = ")]}'\n{\"android-11.0.0_r1\": {\"value\": \"abc\"}, \"android-1.6_r2\": {\"value\": \"def\"}}";
        let tags = parse_ref_listing(body).unwrap();
        assert_eq!(tags, vec!["android-1.6_r2", "android-11.0.0_r1"]);
    }

    #[test]
    fn test_ref_listing_accepts_plain_json() {
        let tags = parse_ref_listing("{\"android-4.4_r1\": {}}").unwrap();
        assert_eq!(tags, vec!["android-4.4_r1"]);
    }
}
