//! Registry lookups: resolves a package name (or name plus version) to
//! concrete [`PackageInfo`] metadata.
//!
//! A 404 means "not resolvable" (unpublished, removed), which is a skip
//! for the caller, never an error to propagate.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::PackageInfo;

/// The registry-lookup boundary.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves the latest published version of `name`. `Ok(None)` means
    /// the package does not resolve (404).
    async fn resolve_latest(&self, name: &str) -> Result<Option<PackageInfo>>;

    /// Resolves one specific version of `name`.
    async fn resolve_version(&self, name: &str, version: &str) -> Result<Option<PackageInfo>>;
}

/// Registry package document, as much of it as regwatch reads.
#[derive(Debug, Deserialize)]
struct PackageDocument {
    name: Option<String>,
    version: Option<String>,
    description: Option<String>,
    #[serde(rename = "_npmUser")]
    npm_user: Option<UserField>,
    #[serde(default)]
    maintainers: Vec<UserField>,
    repository: Option<RepositoryField>,
    #[serde(default)]
    dependencies: HashMap<String, String>,
    #[serde(rename = "devDependencies", default)]
    dev_dependencies: HashMap<String, String>,
    dist: Option<DistField>,
    time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserField {
    name: Option<String>,
}

/// The `repository` field is either a bare URL string or an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RepositoryField {
    Url(String),
    Object { url: Option<String> },
}

#[derive(Debug, Deserialize)]
struct DistField {
    tarball: Option<String>,
}

impl PackageDocument {
    fn into_info(self, fallback_name: &str) -> Option<PackageInfo> {
        let version = self.version?;
        let name = self.name.unwrap_or_else(|| fallback_name.to_string());
        let publisher = self
            .npm_user
            .and_then(|user| user.name)
            .or_else(|| self.maintainers.into_iter().find_map(|m| m.name));
        let repository = match self.repository {
            Some(RepositoryField::Url(url)) => Some(url),
            Some(RepositoryField::Object { url }) => url,
            None => None,
        };
        let published_at = self
            .time
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok());

        Some(PackageInfo {
            name,
            version,
            published_at,
            publisher,
            description: self.description,
            repository,
            dependencies: self.dependencies,
            dev_dependencies: self.dev_dependencies,
            tarball_url: self.dist.and_then(|dist| dist.tarball),
        })
    }
}

/// HTTP implementation against an npm-style registry.
pub struct HttpResolver {
    client: reqwest::Client,
    base_url: String,
}

impl HttpResolver {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn fetch(&self, name: &str, selector: &str) -> Result<Option<PackageInfo>> {
        // Scoped names keep their slash; registries accept it encoded or not.
        let url = format!("{}/{}/{}", self.base_url, name, selector);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("registry lookup failed for {}", name))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = response
            .error_for_status()
            .with_context(|| format!("registry returned an error status for {}", name))?;

        let document: PackageDocument = response
            .json()
            .await
            .with_context(|| format!("failed to decode registry document for {}", name))?;
        Ok(document.into_info(name))
    }
}

#[async_trait]
impl Resolver for HttpResolver {
    async fn resolve_latest(&self, name: &str) -> Result<Option<PackageInfo>> {
        self.fetch(name, "latest").await
    }

    async fn resolve_version(&self, name: &str, version: &str) -> Result<Option<PackageInfo>> {
        self.fetch(name, version).await
    }
}
