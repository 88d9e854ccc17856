//! Vulnerability detector: subprocess wrapper around `osv-scanner`.
//!
//! The tool is optional. A missing binary or a timeout degrades to an
//! empty finding list; only the scanner's own output format is trusted,
//! and findings with unrecognized severities are dropped at the boundary.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::model::{Severity, Vulnerability};

const SCANNER_BIN: &str = "osv-scanner";

/// Minimal slice of the scanner's JSON output.
#[derive(Debug, Deserialize)]
struct ScannerOutput {
    #[serde(default)]
    results: Vec<ScannerResult>,
}

#[derive(Debug, Deserialize)]
struct ScannerResult {
    #[serde(default)]
    packages: Vec<ScannerPackage>,
}

#[derive(Debug, Deserialize)]
struct ScannerPackage {
    #[serde(default)]
    vulnerabilities: Vec<ScannerVuln>,
}

#[derive(Debug, Deserialize)]
struct ScannerVuln {
    id: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    database_specific: Option<DatabaseSpecific>,
    #[serde(default)]
    affected: Vec<ScannerAffected>,
}

#[derive(Debug, Deserialize)]
struct DatabaseSpecific {
    severity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScannerAffected {
    #[serde(default)]
    ranges: Vec<ScannerRange>,
}

#[derive(Debug, Deserialize)]
struct ScannerRange {
    #[serde(default)]
    events: Vec<ScannerEvent>,
}

#[derive(Debug, Deserialize)]
struct ScannerEvent {
    fixed: Option<String>,
}

pub struct AuditRunner {
    timeout: Duration,
}

impl AuditRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Runs the scanner over the extracted tree. Every failure mode maps
    /// to "no findings from this source" except deliberately nothing:
    /// this detector can never abort a package scan.
    pub async fn run(&self, root: &Path) -> Vec<Vulnerability> {
        match self.invoke(root).await {
            Ok(vulns) => vulns,
            Err(err) => {
                warn!(error = %err, "vulnerability scan unavailable, continuing without it");
                Vec::new()
            }
        }
    }

    async fn invoke(&self, root: &Path) -> Result<Vec<Vulnerability>> {
        let child = Command::new(SCANNER_BIN)
            .arg("--format")
            .arg("json")
            .arg("-r")
            .arg(root)
            .output();

        let output = match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("{} is not installed", SCANNER_BIN);
                return Ok(Vec::new());
            }
            Ok(Err(err)) => return Err(err).context("failed to execute osv-scanner"),
            Err(_) => bail!("osv-scanner timed out after {:?}", self.timeout),
        };

        // Exit code 1 means "vulnerabilities found" and still carries
        // valid JSON; anything else without output is a real failure.
        if output.stdout.is_empty() {
            if output.status.success() {
                return Ok(Vec::new());
            }
            bail!("osv-scanner exited with {} and no output", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: ScannerOutput =
            serde_json::from_str(&stdout).context("failed to parse osv-scanner output")?;
        Ok(collect(parsed))
    }
}

fn collect(output: ScannerOutput) -> Vec<Vulnerability> {
    let mut vulnerabilities = Vec::new();
    for result in output.results {
        for package in result.packages {
            for vuln in package.vulnerabilities {
                let severity = match vuln
                    .database_specific
                    .as_ref()
                    .and_then(|db| db.severity.as_deref())
                {
                    Some(raw) => match raw.parse::<Severity>() {
                        Ok(severity) => severity,
                        Err(_) => {
                            debug!(id = %vuln.id, raw, "dropping advisory with unknown severity");
                            continue;
                        }
                    },
                    // No severity at all: keep the advisory, score it
                    // conservatively.
                    None => Severity::Low,
                };

                let fixed_version = vuln
                    .affected
                    .iter()
                    .flat_map(|affected| &affected.ranges)
                    .flat_map(|range| &range.events)
                    .find_map(|event| event.fixed.clone());

                vulnerabilities.push(Vulnerability {
                    title: vuln
                        .summary
                        .unwrap_or_else(|| "Unknown vulnerability".to_string()),
                    id: vuln.id,
                    severity,
                    fixed_version,
                });
            }
        }
    }
    vulnerabilities
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_parses_scanner_output() {
        let output: ScannerOutput = serde_json::from_str(
            r#"{
                "results": [{
                    "packages": [{
                        "vulnerabilities": [{
                            "id": "GHSA-aaaa",
                            "summary": "prototype pollution",
                            "database_specific": {"severity": "HIGH"},
                            "affected": [{"ranges": [{"events": [{"introduced": "0"}, {"fixed": "4.17.21"}]}]}]
                        }]
                    }]
                }]
            }"#,
        )
        .unwrap();

        let vulns = collect(output);
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].id, "GHSA-aaaa");
        assert_eq!(vulns[0].severity, Severity::High);
        assert_eq!(vulns[0].fixed_version.as_deref(), Some("4.17.21"));
    }

    #[test]
    fn test_collect_drops_unknown_severity() {
        let output: ScannerOutput = serde_json::from_str(
            r#"{
                "results": [{
                    "packages": [{
                        "vulnerabilities": [
                            {"id": "GHSA-bbbb", "database_specific": {"severity": "WHATEVER"}},
                            {"id": "GHSA-cccc", "database_specific": {"severity": "MODERATE"}}
                        ]
                    }]
                }]
            }"#,
        )
        .unwrap();

        let vulns = collect(output);
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].id, "GHSA-cccc");
        assert_eq!(vulns[0].severity, Severity::Medium);
    }

    #[test]
    fn test_collect_defaults_missing_severity_to_low() {
        let output: ScannerOutput = serde_json::from_str(
            r#"{"results": [{"packages": [{"vulnerabilities": [{"id": "GHSA-dddd"}]}]}]}"#,
        )
        .unwrap();

        let vulns = collect(output);
        assert_eq!(vulns.len(), 1);
        assert_eq!(vulns[0].severity, Severity::Low);
        assert_eq!(vulns[0].title, "Unknown vulnerability");
    }

    #[test]
    fn test_collect_empty_output() {
        let output: ScannerOutput = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert!(collect(output).is_empty());
    }
}
