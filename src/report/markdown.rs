//! Markdown rendering for tracking issues.

use crate::model::ScanReport;

/// Issue title. This is the idempotency key for the reporter: one open
/// issue per canonical identifier.
pub fn issue_title(report: &ScanReport) -> String {
    format!(
        "Security review: {}@{}",
        report.package.name, report.package.version
    )
}

/// Full issue body.
pub fn issue_body(report: &ScanReport) -> String {
    let package = &report.package;
    let findings = &report.findings;
    let mut body = String::new();

    body.push_str(&format!(
        "## `{}@{}`\n\n",
        package.name, package.version
    ));
    body.push_str(&format!(
        "**Risk: {} ({:.1} points)**\n\n",
        report.risk.level.as_str().to_uppercase(),
        report.risk.total
    ));

    body.push_str("| | |\n|---|---|\n");
    if let Some(publisher) = &package.publisher {
        body.push_str(&format!("| Publisher | {} |\n", publisher));
    }
    if let Some(published_at) = &package.published_at {
        body.push_str(&format!(
            "| Published | {} |\n",
            published_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    if let Some(repository) = &package.repository {
        body.push_str(&format!("| Repository | {} |\n", repository));
    }
    body.push_str(&format!(
        "| Registry | https://www.npmjs.com/package/{} |\n",
        package.name
    ));
    body.push('\n');

    if let Some(description) = &package.description {
        if !description.trim().is_empty() {
            body.push_str(&format!("> {}\n\n", description.trim()));
        }
    }

    if !findings.vulnerabilities.is_empty() {
        body.push_str(&format!(
            "### Vulnerabilities ({})\n\n| Advisory | Severity | Title | Fixed in |\n|---|---|---|---|\n",
            findings.vulnerabilities.len()
        ));
        for vuln in &findings.vulnerabilities {
            body.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                vuln.id,
                vuln.severity,
                vuln.title,
                vuln.fixed_version.as_deref().unwrap_or("-")
            ));
        }
        body.push('\n');
    }

    if !findings.code_issues.is_empty() {
        body.push_str(&format!(
            "### Code patterns ({})\n\n| Rule | Severity | Location |\n|---|---|---|\n",
            findings.code_issues.len()
        ));
        for issue in &findings.code_issues {
            body.push_str(&format!(
                "| `{}` | {} | `{}:{}` |\n",
                issue.rule, issue.severity, issue.file, issue.line
            ));
        }
        body.push('\n');
    }

    if !findings.secrets.is_empty() {
        body.push_str(&format!(
            "### Possible secrets ({})\n\n| Type | Confidence | Location |\n|---|---|---|\n",
            findings.secrets.len()
        ));
        // Locations only; never echo the matched value into an issue.
        for secret in &findings.secrets {
            body.push_str(&format!(
                "| {} | {} | `{}:{}` |\n",
                secret.secret_type, secret.confidence, secret.file, secret.line
            ));
        }
        body.push('\n');
    }

    if !findings.metadata_issues.is_empty() {
        body.push_str(&format!(
            "### Metadata ({})\n\n",
            findings.metadata_issues.len()
        ));
        for issue in &findings.metadata_issues {
            body.push_str(&format!(
                "- **{}** ({}): {}\n",
                issue.title, issue.severity, issue.description
            ));
        }
        body.push('\n');
    }

    if findings.is_empty() {
        body.push_str("No findings.\n\n");
    }

    body.push_str(&format!(
        "---\n_Scanned {} by regwatch._\n",
        report.scanned_at.format("%Y-%m-%d %H:%M UTC")
    ));

    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Confidence, Findings, PackageInfo, SecretFinding, Severity, Vulnerability,
    };
    use crate::risk;

    fn report_with(findings: Findings) -> ScanReport {
        let mut package = PackageInfo::new("@scope/pkg", "1.2.3");
        package.publisher = Some("mallory".to_string());
        package.description = Some("utility helpers".to_string());
        let score = risk::score(&findings);
        ScanReport::new(package, findings, score)
    }

    #[test]
    fn test_title_is_canonical() {
        let report = report_with(Findings::default());
        assert_eq!(issue_title(&report), "Security review: @scope/pkg@1.2.3");
    }

    #[test]
    fn test_body_includes_sections_with_findings() {
        let findings = Findings {
            vulnerabilities: vec![Vulnerability {
                id: "GHSA-xyz".to_string(),
                severity: Severity::High,
                title: "prototype pollution".to_string(),
                fixed_version: Some("1.2.4".to_string()),
            }],
            secrets: vec![SecretFinding {
                secret_type: "AWS Access Key".to_string(),
                confidence: Confidence::High,
                file: "lib/creds.js".to_string(),
                line: 14,
            }],
            ..Default::default()
        };
        let body = issue_body(&report_with(findings));

        assert!(body.contains("### Vulnerabilities (1)"));
        assert!(body.contains("GHSA-xyz"));
        assert!(body.contains("1.2.4"));
        assert!(body.contains("### Possible secrets (1)"));
        assert!(body.contains("`lib/creds.js:14`"));
        assert!(body.contains("mallory"));
    }

    #[test]
    fn test_body_for_empty_findings() {
        let body = issue_body(&report_with(Findings::default()));
        assert!(body.contains("No findings."));
        assert!(!body.contains("### Vulnerabilities"));
    }
}
