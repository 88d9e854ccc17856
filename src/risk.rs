//! Risk aggregation: folds the four detector-output collections into a
//! single weighted score, a discrete risk level, and a reporting decision.
//!
//! Weights and thresholds are fixed constants. Re-scanning an unchanged
//! package must produce a bit-identical [`RiskScore`], so nothing here
//! reads configuration or ambient state.

use serde::{Deserialize, Serialize};

use crate::model::{Confidence, Findings, IssueSeverity, Severity};

/// Discrete risk level for a scanned package version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Critical => "critical",
            RiskLevel::High => "high",
            RiskLevel::Medium => "medium",
            RiskLevel::Low => "low",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregated risk for one scan. Derived fresh per scan, never merged
/// across scans of the same package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub total: f64,
    pub level: RiskLevel,
    pub vulnerability_count: usize,
    pub code_issue_count: usize,
    pub secret_count: usize,
    pub metadata_issue_count: usize,
}

const LEVEL_CRITICAL_AT: f64 = 80.0;
const LEVEL_HIGH_AT: f64 = 40.0;
const LEVEL_MEDIUM_AT: f64 = 15.0;

fn vulnerability_points(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 40.0,
        Severity::High => 20.0,
        Severity::Medium => 8.0,
        Severity::Low => 2.0,
    }
}

fn code_issue_points(severity: IssueSeverity) -> f64 {
    match severity {
        IssueSeverity::High => 15.0,
        IssueSeverity::Medium => 5.0,
        IssueSeverity::Low => 1.0,
    }
}

fn secret_points(confidence: Confidence) -> f64 {
    match confidence {
        Confidence::High => 25.0,
        Confidence::Medium => 10.0,
        Confidence::Low => 3.0,
    }
}

fn metadata_points(severity: IssueSeverity) -> f64 {
    match severity {
        IssueSeverity::High => 10.0,
        IssueSeverity::Medium => 5.0,
        IssueSeverity::Low => 1.0,
    }
}

/// Multiplier by rule category. Rules that put the package in a position
/// to run or fetch arbitrary code weigh double; rules that merely widen
/// its reach weigh 1.5.
fn rule_multiplier(rule: &str) -> f64 {
    match rule {
        "eval-usage" | "dynamic-function" | "child-process" | "install-script"
        | "miner-signature" => 2.0,
        "network-access" | "fs-write" | "obfuscation" => 1.5,
        _ => 1.0,
    }
}

/// Multiplier by secret type. The top tier is credentials that grant
/// write access to infrastructure or supply chains.
fn secret_multiplier(secret_type: &str) -> f64 {
    match secret_type {
        "AWS Access Key" | "AWS Secret Key" | "Private Key" | "npm Token" | "GitHub Token"
        | "GitLab Token" => 2.5,
        "Google API Key" | "Slack Token" | "Discord Bot Token" | "Telegram Bot Token"
        | "Stripe Key" => 2.0,
        _ => 1.0,
    }
}

fn level_for(total: f64) -> RiskLevel {
    if total >= LEVEL_CRITICAL_AT {
        RiskLevel::Critical
    } else if total >= LEVEL_HIGH_AT {
        RiskLevel::High
    } else if total >= LEVEL_MEDIUM_AT {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Computes the aggregated risk score for one set of findings.
pub fn score(findings: &Findings) -> RiskScore {
    let mut total = 0.0;

    for vuln in &findings.vulnerabilities {
        total += vulnerability_points(vuln.severity);
    }

    for issue in &findings.code_issues {
        total += code_issue_points(issue.severity) * rule_multiplier(&issue.rule);
    }

    for secret in &findings.secrets {
        total += secret_points(secret.confidence) * secret_multiplier(&secret.secret_type);
    }

    for issue in &findings.metadata_issues {
        total += metadata_points(issue.severity);
    }

    RiskScore {
        total,
        level: level_for(total),
        vulnerability_count: findings.vulnerabilities.len(),
        code_issue_count: findings.code_issues.len(),
        secret_count: findings.secrets.len(),
        metadata_issue_count: findings.metadata_issues.len(),
    }
}

/// Whether a score warrants creating or updating a tracking issue.
///
/// CRITICAL and HIGH always report. MEDIUM reports only when backed by a
/// real vulnerability or secret, which suppresses noise from purely
/// cosmetic metadata and code-pattern findings. LOW never reports.
pub fn should_report(score: &RiskScore) -> bool {
    match score.level {
        RiskLevel::Critical | RiskLevel::High => true,
        RiskLevel::Medium => score.vulnerability_count > 0 || score.secret_count > 0,
        RiskLevel::Low => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CodeIssue, MetadataIssue, SecretFinding, Vulnerability};

    fn vuln(severity: Severity) -> Vulnerability {
        Vulnerability {
            id: "GHSA-test".to_string(),
            severity,
            title: "test advisory".to_string(),
            fixed_version: None,
        }
    }

    fn code_issue(rule: &str, severity: IssueSeverity) -> CodeIssue {
        CodeIssue {
            rule: rule.to_string(),
            severity,
            file: "index.js".to_string(),
            line: 1,
            excerpt: String::new(),
        }
    }

    fn secret(secret_type: &str, confidence: Confidence) -> SecretFinding {
        SecretFinding {
            secret_type: secret_type.to_string(),
            confidence,
            file: "config.js".to_string(),
            line: 1,
        }
    }

    #[test]
    fn test_empty_findings_score_zero_low_no_report() {
        let result = score(&Findings::default());
        assert_eq!(result.total, 0.0);
        assert_eq!(result.level, RiskLevel::Low);
        assert!(!should_report(&result));
    }

    #[test]
    fn test_single_critical_vuln_is_high_and_reported() {
        let findings = Findings {
            vulnerabilities: vec![vuln(Severity::Critical)],
            ..Default::default()
        };
        let result = score(&findings);
        assert_eq!(result.total, 40.0);
        assert_eq!(result.level, RiskLevel::High);
        assert!(should_report(&result));
    }

    #[test]
    fn test_eval_plus_aws_key_scenario() {
        // MEDIUM eval-usage: 5 x 2.0 = 10. HIGH AWS key: 25 x 2.5 = 62.5.
        let findings = Findings {
            code_issues: vec![code_issue("eval-usage", IssueSeverity::Medium)],
            secrets: vec![secret("AWS Access Key", Confidence::High)],
            ..Default::default()
        };
        let result = score(&findings);
        assert_eq!(result.total, 72.5);
        assert_eq!(result.level, RiskLevel::High);
        assert!(should_report(&result));
    }

    #[test]
    fn test_vulnerability_weights() {
        for (severity, expected) in [
            (Severity::Critical, 40.0),
            (Severity::High, 20.0),
            (Severity::Medium, 8.0),
            (Severity::Low, 2.0),
        ] {
            let findings = Findings {
                vulnerabilities: vec![vuln(severity)],
                ..Default::default()
            };
            assert_eq!(score(&findings).total, expected);
        }
    }

    #[test]
    fn test_rule_multipliers() {
        assert_eq!(rule_multiplier("eval-usage"), 2.0);
        assert_eq!(rule_multiplier("child-process"), 2.0);
        assert_eq!(rule_multiplier("install-script"), 2.0);
        assert_eq!(rule_multiplier("miner-signature"), 2.0);
        assert_eq!(rule_multiplier("network-access"), 1.5);
        assert_eq!(rule_multiplier("fs-write"), 1.5);
        assert_eq!(rule_multiplier("obfuscation"), 1.5);
        assert_eq!(rule_multiplier("deprecated-api"), 1.0);
    }

    #[test]
    fn test_secret_multipliers() {
        assert_eq!(secret_multiplier("AWS Access Key"), 2.5);
        assert_eq!(secret_multiplier("GitHub Token"), 2.5);
        assert_eq!(secret_multiplier("npm Token"), 2.5);
        assert_eq!(secret_multiplier("Slack Token"), 2.0);
        assert_eq!(secret_multiplier("Stripe Key"), 2.0);
        assert_eq!(secret_multiplier("Generic API Key"), 1.0);
    }

    #[test]
    fn test_level_thresholds() {
        assert_eq!(level_for(0.0), RiskLevel::Low);
        assert_eq!(level_for(14.9), RiskLevel::Low);
        assert_eq!(level_for(15.0), RiskLevel::Medium);
        assert_eq!(level_for(39.9), RiskLevel::Medium);
        assert_eq!(level_for(40.0), RiskLevel::High);
        assert_eq!(level_for(79.9), RiskLevel::High);
        assert_eq!(level_for(80.0), RiskLevel::Critical);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let findings = Findings {
            vulnerabilities: vec![vuln(Severity::High), vuln(Severity::Low)],
            code_issues: vec![code_issue("network-access", IssueSeverity::Low)],
            secrets: vec![secret("Slack Token", Confidence::Medium)],
            metadata_issues: vec![MetadataIssue {
                severity: IssueSeverity::Medium,
                title: "install script".to_string(),
                description: String::new(),
            }],
        };
        let a = score(&findings);
        let b = score(&findings);
        assert_eq!(a, b);
    }

    #[test]
    fn test_adding_critical_vuln_never_lowers_level() {
        let base = Findings {
            code_issues: vec![code_issue("fs-write", IssueSeverity::Medium)],
            metadata_issues: vec![MetadataIssue {
                severity: IssueSeverity::Low,
                title: "no repository".to_string(),
                description: String::new(),
            }],
            ..Default::default()
        };
        let before = score(&base);

        let mut widened = base.clone();
        widened.vulnerabilities.push(vuln(Severity::Critical));
        let after = score(&widened);

        assert!(after.level >= before.level);
        assert!(after.total > before.total);
    }

    #[test]
    fn test_medium_without_vulns_or_secrets_not_reported() {
        // Two HIGH metadata issues: 20 points -> MEDIUM, but nothing real.
        let findings = Findings {
            metadata_issues: vec![
                MetadataIssue {
                    severity: IssueSeverity::High,
                    title: "install script".to_string(),
                    description: String::new(),
                },
                MetadataIssue {
                    severity: IssueSeverity::High,
                    title: "no repository".to_string(),
                    description: String::new(),
                },
            ],
            ..Default::default()
        };
        let result = score(&findings);
        assert_eq!(result.level, RiskLevel::Medium);
        assert!(!should_report(&result));
    }

    #[test]
    fn test_medium_with_vuln_is_reported() {
        let findings = Findings {
            vulnerabilities: vec![vuln(Severity::Medium), vuln(Severity::Medium)],
            ..Default::default()
        };
        let result = score(&findings);
        assert_eq!(result.level, RiskLevel::Medium);
        assert!(should_report(&result));
    }
}
