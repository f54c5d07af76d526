use anyhow::Context;
use async_trait::async_trait;
use cleaner::ports::{
    ArtifactDeleter, DeleteFailure, DigestResolution, DigestResolver, InventoryFetcher,
    ManifestCoordinates,
};
use common::config::RegistryConfig;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap};
use serde::Deserialize;
use serde_json::Value;

use crate::SdkError;

/// Header carrying the number of inventory pages.
const PAGE_TOTAL_HEADER: &str = "x-pagination-pagetotal";
/// Header authenticating package API requests.
const API_KEY_HEADER: &str = "x-api-key";
/// Media type requested from the container registry.
const MANIFEST_LIST_MEDIA_TYPE: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// HTTP client for the Cloudsmith package API and container registry
pub struct CloudsmithClient {
    api_url: String,
    docker_registry: String,
    owner: String,
    repo: String,
    page_size: usize,
    username: String,
    api_key: String,
    http: reqwest::Client,
}

impl CloudsmithClient {
    /// Create a new client for the repository named in `config`
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            docker_registry: config.docker_registry.trim_end_matches('/').to_string(),
            owner: config.owner.clone(),
            repo: config.repo.clone(),
            page_size: config.page_size,
            username: config.username.clone(),
            api_key: config.api_key.clone(),
            http: reqwest::Client::new(),
        }
    }

    fn packages_url(&self) -> String {
        format!("{}/packages/{}/{}/", self.api_url, self.owner, self.repo)
    }

    fn package_url(&self, identifier: &str) -> String {
        format!("{}{identifier}/", self.packages_url())
    }

    fn manifest_url(&self, coordinates: &ManifestCoordinates) -> String {
        format!("{}/v2/{}", self.docker_registry, coordinates.path())
    }

    /// Fetch one inventory page, returning its records and the total page count
    async fn fetch_page(&self, query: &str, page: usize) -> Result<(Vec<Value>, usize), SdkError> {
        let resp = self
            .http
            .get(self.packages_url())
            .header(API_KEY_HEADER, &self.api_key)
            .query(&[
                ("page", page.to_string()),
                ("page_size", self.page_size.to_string()),
                ("query", query.to_string()),
            ])
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        let pages = page_total(resp.headers()).unwrap_or(1);
        let body = resp.text().await?;
        Ok((serde_json::from_str(&body)?, pages))
    }

    async fn fetch_manifest(
        &self,
        coordinates: &ManifestCoordinates,
    ) -> Result<DigestResolution, SdkError> {
        let resp = self
            .http
            .get(self.manifest_url(coordinates))
            .basic_auth(&self.username, Some(&self.api_key))
            .header(ACCEPT, MANIFEST_LIST_MEDIA_TYPE)
            .send()
            .await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(DigestResolution::NotFound);
        }
        let resp = ensure_success(resp).await?;
        let body = resp.text().await?;
        let digests = manifest_digests(&body).unwrap_or_else(|| {
            tracing::warn!(
                manifest = %coordinates,
                "Manifest contains no data, treating it as having no children"
            );
            Vec::new()
        });
        Ok(DigestResolution::Found(digests))
    }
}

#[async_trait]
impl InventoryFetcher for CloudsmithClient {
    async fn fetch_all(&self, query: &str) -> anyhow::Result<Vec<Value>> {
        let mut records = Vec::new();
        let mut page = 1;
        loop {
            tracing::info!(page, "Fetching inventory page");
            let (batch, pages) = self
                .fetch_page(query, page)
                .await
                .with_context(|| format!("Failed to fetch inventory page {page}"))?;
            tracing::info!(page, pages, records = batch.len(), "Fetched inventory page");
            records.extend(batch);

            if page >= pages {
                break;
            }
            page += 1;
        }
        Ok(records)
    }
}

#[async_trait]
impl DigestResolver for CloudsmithClient {
    async fn list_manifest_digests(
        &self,
        coordinates: &ManifestCoordinates,
    ) -> anyhow::Result<DigestResolution> {
        let resolution = self
            .fetch_manifest(coordinates)
            .await
            .with_context(|| format!("Failed to fetch manifest {coordinates}"))?;
        Ok(resolution)
    }
}

#[async_trait]
impl ArtifactDeleter for CloudsmithClient {
    async fn delete(&self, identifier: &str) -> Result<(), DeleteFailure> {
        let resp = self
            .http
            .delete(self.package_url(identifier))
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(|e| DeleteFailure::new(e.status().map(|s| s.as_u16()), e.to_string()))?;

        tracing::debug!(identifier, status = resp.status().as_u16(), "Delete response");
        match ensure_success(resp).await {
            Ok(_) => Ok(()),
            Err(e) => Err(DeleteFailure::new(e.status(), delete_details(e))),
        }
    }
}

fn delete_details(error: SdkError) -> String {
    match error {
        SdkError::Api { message, .. } => message,
        other => other.to_string(),
    }
}

async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response, SdkError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        let status = resp.status().as_u16();
        let message = resp.text().await.unwrap_or_default();
        Err(SdkError::Api { status, message })
    }
}

/// Parse the total page count. A missing or malformed header means one page.
fn page_total(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(PAGE_TOTAL_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[derive(Debug, Deserialize)]
struct ManifestList {
    #[serde(default)]
    manifests: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    digest: Option<String>,
}

/// Digests referenced by a manifest list body, without their `sha256:` prefix.
///
/// Returns `None` when the body is not a manifest document at all.
fn manifest_digests(body: &str) -> Option<Vec<String>> {
    let list: ManifestList = serde_json::from_str(body).ok()?;
    Some(
        list.manifests
            .into_iter()
            .filter_map(|entry| entry.digest)
            .map(|digest| cleaner::model::strip_digest_prefix(&digest).to_string())
            .collect(),
    )
}
