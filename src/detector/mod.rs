//! Security detectors and the pipeline that runs them over one package.
//!
//! Four independent detectors feed the risk aggregator:
//!
//! | Detector | Source of truth | Output |
//! |----------|-----------------|--------|
//! | [`AuditRunner`] | `osv-scanner` subprocess | vulnerabilities |
//! | [`CodeScanner`] | regex rules over source files | code issues |
//! | [`SecretScanner`] | regex credential patterns | secret findings |
//! | [`MetadataChecker`] | registry document + manifest | metadata issues |
//!
//! Detectors are read-only over an immutable extracted copy, so within
//! one package they run concurrently. A detector failing or missing its
//! underlying tool degrades to an empty collection; only the tarball
//! download itself can abort a package's scan.

mod audit;
mod code;
mod metadata;
mod secrets;

pub use audit::AuditRunner;
pub use code::CodeScanner;
pub use metadata::MetadataChecker;
pub use secrets::SecretScanner;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::model::{Findings, PackageInfo};
use crate::sandbox;

/// The scan-pipeline boundary consumed by the scan coordinator.
/// Implemented by [`DetectorPipeline`] in production and by fakes in
/// coordinator tests.
#[async_trait]
pub trait ScanPipeline: Send + Sync {
    async fn scan(&self, package: &PackageInfo) -> Result<Findings>;
}

/// Production pipeline: download, extract, run all detectors, merge.
pub struct DetectorPipeline {
    client: reqwest::Client,
    audit: AuditRunner,
    code: Arc<CodeScanner>,
    secrets: Arc<SecretScanner>,
    metadata: MetadataChecker,
    max_tarball_bytes: u64,
    extract_timeout: Duration,
}

impl DetectorPipeline {
    pub fn new(
        client: reqwest::Client,
        max_tarball_bytes: u64,
        subprocess_timeout: Duration,
    ) -> Self {
        Self {
            client,
            audit: AuditRunner::new(subprocess_timeout),
            code: Arc::new(CodeScanner::new()),
            secrets: Arc::new(SecretScanner::new()),
            metadata: MetadataChecker::new(),
            max_tarball_bytes,
            extract_timeout: subprocess_timeout,
        }
    }
}

#[async_trait]
impl ScanPipeline for DetectorPipeline {
    async fn scan(&self, package: &PackageInfo) -> Result<Findings> {
        let Some(tarball_url) = package.tarball_url.as_deref() else {
            bail!("package {} has no tarball url", package.id());
        };

        let workspace = sandbox::fetch_package(
            &self.client,
            tarball_url,
            self.max_tarball_bytes,
            self.extract_timeout,
        )
        .await?;
        let root = workspace.root().to_path_buf();

        // The file-walking detectors are synchronous; run them off the
        // async worker while the audit subprocess runs.
        let code_root = root.clone();
        let code = tokio::task::spawn_blocking({
            let scanner = Arc::clone(&self.code);
            move || scanner.scan(&code_root)
        });
        let secret_root = root.clone();
        let secrets = tokio::task::spawn_blocking({
            let scanner = Arc::clone(&self.secrets);
            move || scanner.scan(&secret_root)
        });

        let (vulnerabilities, code_issues, secret_findings) =
            futures::join!(self.audit.run(&root), code, secrets);

        let findings = Findings {
            vulnerabilities,
            code_issues: code_issues.unwrap_or_default(),
            secrets: secret_findings.unwrap_or_default(),
            metadata_issues: self.metadata.check(package, &root),
        };

        Ok(findings)
    }
}
