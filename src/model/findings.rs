use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::PackageInfo;
use crate::risk::RiskScore;

/// Vulnerability severity, as reported by the advisory source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Severity::Critical),
            "high" => Ok(Severity::High),
            "medium" | "moderate" => Ok(Severity::Medium),
            "low" => Ok(Severity::Low),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a code-pattern or metadata finding. Detectors in this
/// category never emit CRITICAL; that level is reserved for the
/// aggregated score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    High,
    Medium,
    Low,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueSeverity::High => "high",
            IssueSeverity::Medium => "medium",
            IssueSeverity::Low => "low",
        }
    }
}

impl std::fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Confidence of a secret-pattern match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A known vulnerability affecting the scanned version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vulnerability {
    /// Advisory identifier (CVE, GHSA, OSV id).
    pub id: String,
    pub severity: Severity,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_version: Option<String>,
}

/// A suspicious code pattern matched in the extracted package contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeIssue {
    /// Stable rule name, e.g. `eval-usage` or `install-script`.
    pub rule: String,
    pub severity: IssueSeverity,
    pub file: String,
    pub line: usize,
    pub excerpt: String,
}

/// A credential-looking string found in the package contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretFinding {
    /// Human-readable secret type, e.g. `AWS Access Key`.
    pub secret_type: String,
    pub confidence: Confidence,
    pub file: String,
    pub line: usize,
}

/// A suspicious property of the package manifest or registry metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataIssue {
    pub severity: IssueSeverity,
    pub title: String,
    pub description: String,
}

/// The four independent detector-output collections for one package.
///
/// Ordering within each collection is irrelevant; the risk aggregator
/// only folds over them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Findings {
    pub vulnerabilities: Vec<Vulnerability>,
    pub code_issues: Vec<CodeIssue>,
    pub secrets: Vec<SecretFinding>,
    pub metadata_issues: Vec<MetadataIssue>,
}

impl Findings {
    pub fn is_empty(&self) -> bool {
        self.vulnerabilities.is_empty()
            && self.code_issues.is_empty()
            && self.secrets.is_empty()
            && self.metadata_issues.is_empty()
    }

    pub fn total(&self) -> usize {
        self.vulnerabilities.len()
            + self.code_issues.len()
            + self.secrets.len()
            + self.metadata_issues.len()
    }
}

/// Complete result of scanning one package version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub package: PackageInfo,
    pub findings: Findings,
    pub risk: RiskScore,
    pub scanned_at: DateTime<Utc>,
}

impl ScanReport {
    pub fn new(package: PackageInfo, findings: Findings, risk: RiskScore) -> Self {
        Self {
            package,
            findings,
            risk,
            scanned_at: Utc::now(),
        }
    }
}
