//! Static code-pattern detector: a fixed table of regex rules run over
//! the extracted package contents.
//!
//! Rules are intentionally shallow. They flag capability, not intent:
//! `eval-usage` in a template engine and in a dropper look the same here,
//! and the risk aggregator decides what the combination is worth.

use std::path::Path;

use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

use crate::model::{CodeIssue, IssueSeverity};

/// Files larger than this are skipped; bundled artifacts dwarf any
/// hand-written malicious payload.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

const SCAN_EXTENSIONS: &[&str] = &["js", "mjs", "cjs", "ts", "jsx", "tsx", "json"];

struct Rule {
    name: &'static str,
    severity: IssueSeverity,
    pattern: Regex,
    /// Some rules only make sense in the package manifest.
    manifest_only: bool,
}

fn rules() -> Vec<Rule> {
    let rule = |name, severity, pattern: &str, manifest_only| Rule {
        name,
        severity,
        pattern: Regex::new(pattern).expect("invalid built-in rule pattern"),
        manifest_only,
    };

    vec![
        rule("eval-usage", IssueSeverity::High, r"\beval\s*\(", false),
        rule(
            "dynamic-function",
            IssueSeverity::High,
            r"new\s+Function\s*\(",
            false,
        ),
        rule(
            "child-process",
            IssueSeverity::High,
            r#"require\s*\(\s*['"]child_process['"]\s*\)|from\s+['"]child_process['"]|\b(?:execSync|spawnSync)\s*\("#,
            false,
        ),
        rule(
            "install-script",
            IssueSeverity::High,
            r#""(?:preinstall|install|postinstall)"\s*:"#,
            true,
        ),
        rule(
            "miner-signature",
            IssueSeverity::High,
            r"(?i)coinhive|cryptonight|stratum\+tcp://|minerd",
            false,
        ),
        rule(
            "network-access",
            IssueSeverity::Medium,
            r#"require\s*\(\s*['"](?:https?|net|dgram)['"]\s*\)|\bXMLHttpRequest\b"#,
            false,
        ),
        rule(
            "fs-write",
            IssueSeverity::Medium,
            r"\bfs\.(?:writeFile|writeFileSync|appendFile|appendFileSync|unlink|unlinkSync|chmod|chmodSync|rm|rmSync)\s*\(",
            false,
        ),
        rule(
            "obfuscation",
            IssueSeverity::Medium,
            r"_0x[0-9a-fA-F]{4,}|(?:\\x[0-9a-fA-F]{2}){10,}",
            false,
        ),
        rule(
            "buffer-constructor",
            IssueSeverity::Low,
            r"new\s+Buffer\s*\(",
            false,
        ),
    ]
}

pub struct CodeScanner {
    rules: Vec<Rule>,
}

impl Default for CodeScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeScanner {
    pub fn new() -> Self {
        Self { rules: rules() }
    }

    /// Scans the extracted tree. I/O problems on individual files are
    /// skipped; the scan itself never fails.
    pub fn scan(&self, root: &Path) -> Vec<CodeIssue> {
        let mut issues = Vec::new();

        for entry in WalkDir::new(root).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if !SCAN_EXTENSIONS.contains(&extension) {
                continue;
            }
            if entry.metadata().map(|m| m.len() > MAX_FILE_BYTES).unwrap_or(true) {
                debug!(file = %path.display(), "skipping oversized file");
                continue;
            }
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(_) => continue,
            };
            let content = String::from_utf8_lossy(&bytes);
            let is_manifest = path.file_name().and_then(|n| n.to_str()) == Some("package.json");
            let relative = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .to_string();

            self.scan_content(&content, &relative, is_manifest, &mut issues);
        }

        issues
    }

    fn scan_content(
        &self,
        content: &str,
        file: &str,
        is_manifest: bool,
        issues: &mut Vec<CodeIssue>,
    ) {
        for (line_no, line) in content.lines().enumerate() {
            for rule in &self.rules {
                if rule.manifest_only && !is_manifest {
                    continue;
                }
                if rule.pattern.is_match(line) {
                    issues.push(CodeIssue {
                        rule: rule.name.to_string(),
                        severity: rule.severity,
                        file: file.to_string(),
                        line: line_no + 1,
                        excerpt: truncate(line.trim(), 160),
                    });
                }
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}
