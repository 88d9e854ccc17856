//! Scanning: drains the pending set (discovered minus scanned), runs the
//! detector pipeline per package, aggregates risk, and reports findings
//! that clear the bar.
//!
//! One package failing never aborts the batch; the package is simply not
//! marked scanned and comes back on the next run. The only failure that
//! aborts a whole run is exhausting retries on the scanned-state commit,
//! because silently losing durable state is worse than a loud failure.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::detector::ScanPipeline;
use crate::model::{PackageId, PackageInfo, ScanReport};
use crate::registry::Resolver;
use crate::report::Reporter;
use crate::retry::RetryPolicy;
use crate::risk;
use crate::state::StateStore;

/// Summary of one scan run.
#[derive(Debug, Clone, Default)]
pub struct ScanRun {
    /// Canonical ids successfully scanned and committed.
    pub scanned: Vec<String>,
    /// How many scans produced a report that was handed to the reporter.
    pub reported: usize,
    /// Packages that failed and will be retried on a later run.
    pub failed: usize,
}

pub struct ScanCoordinator<'a> {
    store: &'a StateStore,
    resolver: &'a dyn Resolver,
    pipeline: &'a dyn ScanPipeline,
    reporter: Option<&'a dyn Reporter>,
    max_per_run: usize,
    retry: RetryPolicy,
}

impl<'a> ScanCoordinator<'a> {
    pub fn new(
        store: &'a StateStore,
        resolver: &'a dyn Resolver,
        pipeline: &'a dyn ScanPipeline,
        reporter: Option<&'a dyn Reporter>,
        max_per_run: usize,
    ) -> Self {
        Self {
            store,
            resolver,
            pipeline,
            reporter,
            max_per_run,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Computes the pending set: discovered minus scanned, sorted for a
    /// stable walk order, capped at the per-run limit. Identifiers that
    /// fail to parse are logged and dropped.
    pub fn pending(&self) -> Vec<PackageId> {
        let discovered = self.store.load_discovered();
        let scanned = self.store.load_scanned();

        let mut pending: Vec<&String> = discovered.difference(&scanned).collect();
        pending.sort();
        pending
            .into_iter()
            .take(self.max_per_run)
            .filter_map(|canonical| {
                let parsed = PackageId::parse(canonical);
                if parsed.is_none() {
                    warn!(id = %canonical, "dropping unparseable identifier from pending set");
                }
                parsed
            })
            .collect()
    }

    /// Runs one scan cycle over the pending set.
    pub async fn run(&self) -> Result<ScanRun> {
        let pending = self.pending();
        if pending.is_empty() {
            info!("nothing pending to scan");
            return Ok(ScanRun::default());
        }
        info!(pending = pending.len(), "starting scan run");

        let mut outcome = ScanRun::default();

        for id in &pending {
            match self.scan_one(id).await {
                Ok(report) => {
                    if risk::should_report(&report.risk) {
                        if let Some(reporter) = self.reporter {
                            if let Err(err) = reporter.report(&report).await {
                                // Not marked scanned, so the report is
                                // retried along with the rescan.
                                warn!(package = %id, error = %err, "failed to report findings");
                                outcome.failed += 1;
                                continue;
                            }
                        }
                        outcome.reported += 1;
                    }
                    info!(
                        package = %id,
                        score = report.risk.total,
                        level = %report.risk.level,
                        "scan complete"
                    );
                    outcome.scanned.push(id.canonical());
                }
                Err(err) => {
                    warn!(package = %id, error = %err, "scan failed, will retry on a later run");
                    outcome.failed += 1;
                }
            }
        }

        self.mark_scanned(&outcome.scanned).await?;
        info!(
            scanned = outcome.scanned.len(),
            reported = outcome.reported,
            failed = outcome.failed,
            "scan run complete"
        );
        Ok(outcome)
    }

    /// Scans a single identifier: best-effort re-resolution (the
    /// discovery-time metadata is not retained), pipeline, aggregation.
    pub async fn scan_one(&self, id: &PackageId) -> Result<ScanReport> {
        let package = match self.resolver.resolve_version(&id.name, &id.version).await {
            Ok(Some(info)) => info,
            Ok(None) | Err(_) => PackageInfo::from_id(id),
        };
        self.scan_package(&package).await
    }

    /// Scans an already-resolved package. Used by `scan_one` and by the
    /// ad-hoc `scan <package>` CLI path.
    pub async fn scan_package(&self, package: &PackageInfo) -> Result<ScanReport> {
        let findings = self
            .pipeline
            .scan(package)
            .await
            .with_context(|| format!("detector pipeline failed for {}", package.id()))?;
        let score = risk::score(&findings);
        Ok(ScanReport::new(package.clone(), findings, score))
    }

    /// Commits the scanned ids under the retry policy, re-raising the
    /// final failure.
    async fn mark_scanned(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.retry
            .run("commit scanned set", || async {
                self.store.commit_scanned(ids)
            })
            .await
            .context("exhausted retries committing the scanned set")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Findings, IssueSeverity, MetadataIssue, Severity, Vulnerability};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeResolver;

    #[async_trait]
    impl Resolver for FakeResolver {
        async fn resolve_latest(&self, name: &str) -> Result<Option<PackageInfo>> {
            Ok(Some(PackageInfo::new(name, "0.0.0")))
        }

        async fn resolve_version(
            &self,
            name: &str,
            version: &str,
        ) -> Result<Option<PackageInfo>> {
            Ok(Some(PackageInfo::new(name, version)))
        }
    }

    /// Pipeline returning canned findings per canonical id; ids mapped to
    /// `None` simulate a scan failure.
    struct FakePipeline {
        findings: HashMap<String, Option<Findings>>,
    }

    impl FakePipeline {
        fn clean_for(ids: &[&str]) -> Self {
            Self {
                findings: ids
                    .iter()
                    .map(|id| (id.to_string(), Some(Findings::default())))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl ScanPipeline for FakePipeline {
        async fn scan(&self, package: &PackageInfo) -> Result<Findings> {
            match self.findings.get(&package.id().canonical()) {
                Some(Some(findings)) => Ok(findings.clone()),
                Some(None) => anyhow::bail!("simulated detector crash"),
                None => Ok(Findings::default()),
            }
        }
    }

    struct RecordingReporter {
        seen: Mutex<Vec<String>>,
    }

    impl RecordingReporter {
        fn new() -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Reporter for RecordingReporter {
        async fn report(&self, report: &ScanReport) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(report.package.id().canonical());
            Ok(())
        }
    }

    fn store_with(discovered: &[&str], scanned: &[&str]) -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        let discovered: Vec<String> = discovered.iter().map(|s| s.to_string()).collect();
        store.commit(1, &discovered).unwrap();
        let scanned: Vec<String> = scanned.iter().map(|s| s.to_string()).collect();
        store.commit_scanned(&scanned).unwrap();
        (dir, store)
    }

    #[test]
    fn test_pending_is_discovered_minus_scanned() {
        let (_dir, store) = store_with(&["a@1.0.0", "b@1.0.0", "c@1.0.0"], &["b@1.0.0"]);
        let pipeline = FakePipeline::clean_for(&[]);
        let coordinator = ScanCoordinator::new(&store, &FakeResolver, &pipeline, None, 100);

        let pending = coordinator.pending();
        let canonical: Vec<String> = pending.iter().map(|id| id.canonical()).collect();
        assert_eq!(canonical, vec!["a@1.0.0", "c@1.0.0"]);
    }

    #[test]
    fn test_pending_respects_cap_and_drops_garbage() {
        let (_dir, store) = store_with(&["a@1.0.0", "b@1.0.0", "garbage-no-version"], &[]);
        let pipeline = FakePipeline::clean_for(&[]);
        let coordinator = ScanCoordinator::new(&store, &FakeResolver, &pipeline, None, 2);

        let pending = coordinator.pending();
        // Sorted order admits "a@1.0.0" and "b@1.0.0" within the cap; the
        // unparseable id is dropped.
        assert_eq!(pending.len(), 2);
        assert!(pending.iter().all(|id| !id.version.is_empty()));
    }

    #[tokio::test]
    async fn test_run_marks_scanned() {
        let (_dir, store) = store_with(&["a@1.0.0", "b@1.0.0"], &[]);
        let pipeline = FakePipeline::clean_for(&["a@1.0.0", "b@1.0.0"]);
        let coordinator = ScanCoordinator::new(&store, &FakeResolver, &pipeline, None, 100);

        let run = coordinator.run().await.unwrap();
        assert_eq!(run.scanned.len(), 2);
        assert_eq!(run.failed, 0);

        let scanned = store.load_scanned();
        assert!(scanned.contains("a@1.0.0"));
        assert!(scanned.contains("b@1.0.0"));
        assert!(coordinator.pending().is_empty());
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_batch() {
        let (_dir, store) = store_with(&["bad@1.0.0", "good@1.0.0"], &[]);
        let pipeline = FakePipeline {
            findings: [
                ("bad@1.0.0".to_string(), None),
                ("good@1.0.0".to_string(), Some(Findings::default())),
            ]
            .into_iter()
            .collect(),
        };
        let coordinator = ScanCoordinator::new(&store, &FakeResolver, &pipeline, None, 100);

        let run = coordinator.run().await.unwrap();
        assert_eq!(run.scanned, vec!["good@1.0.0"]);
        assert_eq!(run.failed, 1);

        // The failed package stays pending for the next run.
        let pending = coordinator.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].canonical(), "bad@1.0.0");
    }

    #[tokio::test]
    async fn test_reportable_findings_reach_reporter() {
        let (_dir, store) = store_with(&["evil@6.6.6", "fine@1.0.0"], &[]);
        let hot = Findings {
            vulnerabilities: vec![Vulnerability {
                id: "GHSA-evil".to_string(),
                severity: Severity::Critical,
                title: "backdoor".to_string(),
                fixed_version: None,
            }],
            ..Default::default()
        };
        let pipeline = FakePipeline {
            findings: [
                ("evil@6.6.6".to_string(), Some(hot)),
                ("fine@1.0.0".to_string(), Some(Findings::default())),
            ]
            .into_iter()
            .collect(),
        };
        let reporter = RecordingReporter::new();
        let coordinator =
            ScanCoordinator::new(&store, &FakeResolver, &pipeline, Some(&reporter), 100);

        let run = coordinator.run().await.unwrap();
        assert_eq!(run.reported, 1);
        assert_eq!(run.scanned.len(), 2);
        assert_eq!(*reporter.seen.lock().unwrap(), vec!["evil@6.6.6"]);
    }

    #[tokio::test]
    async fn test_low_noise_is_not_reported() {
        let (_dir, store) = store_with(&["meh@1.0.0"], &[]);
        let mild = Findings {
            metadata_issues: vec![MetadataIssue {
                severity: IssueSeverity::Low,
                title: "no description".to_string(),
                description: String::new(),
            }],
            ..Default::default()
        };
        let pipeline = FakePipeline {
            findings: [("meh@1.0.0".to_string(), Some(mild))].into_iter().collect(),
        };
        let reporter = RecordingReporter::new();
        let coordinator =
            ScanCoordinator::new(&store, &FakeResolver, &pipeline, Some(&reporter), 100);

        let run = coordinator.run().await.unwrap();
        assert_eq!(run.reported, 0);
        assert!(reporter.seen.lock().unwrap().is_empty());
        // Still marked scanned: deciding not to report is a completed scan.
        assert!(store.load_scanned().contains("meh@1.0.0"));
    }
}
