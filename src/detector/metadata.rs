//! Metadata detector: heuristics over the registry document and the
//! extracted package manifest.

use std::path::Path;

use chrono::Utc;
use serde::Deserialize;

use crate::model::{IssueSeverity, MetadataIssue, PackageInfo};

/// Dependency counts above this suggest either a generated manifest or
/// dependency confusion bait.
const DEPENDENCY_COUNT_THRESHOLD: usize = 100;

/// Versions younger than this get a note; most malicious uploads are
/// reported within their first two days.
const FRESH_PUBLISH_HOURS: i64 = 48;

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    scripts: std::collections::HashMap<String, String>,
}

pub struct MetadataChecker;

impl Default for MetadataChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataChecker {
    pub fn new() -> Self {
        Self
    }

    /// Runs every heuristic. Never fails; an unreadable manifest just
    /// contributes no manifest-based issues.
    pub fn check(&self, package: &PackageInfo, root: &Path) -> Vec<MetadataIssue> {
        let mut issues = Vec::new();

        if let Some(manifest) = read_manifest(root) {
            for hook in ["preinstall", "install", "postinstall"] {
                if let Some(command) = manifest.scripts.get(hook) {
                    issues.push(MetadataIssue {
                        severity: IssueSeverity::High,
                        title: format!("install-time script: {}", hook),
                        description: format!("runs `{}` on install", command),
                    });
                }
            }
        }

        if package.repository.is_none() {
            issues.push(MetadataIssue {
                severity: IssueSeverity::Low,
                title: "no repository".to_string(),
                description: "package declares no source repository".to_string(),
            });
        }

        if package
            .description
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
        {
            issues.push(MetadataIssue {
                severity: IssueSeverity::Low,
                title: "no description".to_string(),
                description: "package has no description".to_string(),
            });
        }

        let dependency_count = package.dependencies.len();
        if dependency_count > DEPENDENCY_COUNT_THRESHOLD {
            issues.push(MetadataIssue {
                severity: IssueSeverity::Medium,
                title: "oversized dependency tree".to_string(),
                description: format!("{} direct dependencies", dependency_count),
            });
        }

        if let Some(published_at) = package.published_at {
            let age = Utc::now().signed_duration_since(published_at);
            if age.num_hours() < FRESH_PUBLISH_HOURS && age.num_hours() >= 0 {
                issues.push(MetadataIssue {
                    severity: IssueSeverity::Low,
                    title: "freshly published".to_string(),
                    description: format!("published {} hours ago", age.num_hours()),
                });
            }
        }

        issues
    }
}

fn read_manifest(root: &Path) -> Option<Manifest> {
    let content = std::fs::read_to_string(root.join("package.json")).ok()?;
    serde_json::from_str(&content).ok()
}
