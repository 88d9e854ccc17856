//! GitHub issue reporter.
//!
//! Idempotent by canonical identifier: an existing open issue whose title
//! carries `name@version` is updated in place, otherwise a new issue is
//! created. Labels carry the risk level so triage can filter.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::info;

use super::{markdown, Reporter};
use crate::model::ScanReport;

const API_BASE: &str = "https://api.github.com";

pub struct GithubReporter {
    client: reqwest::Client,
    /// `owner/repo`.
    repo: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    items: Vec<IssueItem>,
}

#[derive(Debug, Deserialize)]
struct IssueItem {
    number: u64,
}

impl GithubReporter {
    pub fn new(repo: impl Into<String>, token: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static("regwatch/0.1.0"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token))
                .context("invalid GitHub token")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to build GitHub client")?;

        Ok(Self {
            client,
            repo: repo.into(),
            base_url: API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn find_open_issue(&self, title: &str) -> Result<Option<u64>> {
        let query = format!("repo:{} is:issue is:open in:title \"{}\"", self.repo, title);
        let url = format!("{}/search/issues", self.base_url);
        let response: SearchResponse = self
            .client
            .get(&url)
            .query(&[("q", query.as_str()), ("per_page", "1")])
            .send()
            .await
            .context("issue search failed")?
            .error_for_status()
            .context("issue search returned an error status")?
            .json()
            .await
            .context("failed to decode issue search response")?;

        Ok(response.items.first().map(|item| item.number))
    }

    async fn create_issue(&self, title: &str, body: &str, labels: &[String]) -> Result<()> {
        let url = format!("{}/repos/{}/issues", self.base_url, self.repo);
        self.client
            .post(&url)
            .json(&json!({"title": title, "body": body, "labels": labels}))
            .send()
            .await
            .context("issue creation failed")?
            .error_for_status()
            .context("issue creation returned an error status")?;
        Ok(())
    }

    async fn update_issue(&self, number: u64, body: &str, labels: &[String]) -> Result<()> {
        let url = format!("{}/repos/{}/issues/{}", self.base_url, self.repo, number);
        self.client
            .patch(&url)
            .json(&json!({"body": body, "labels": labels}))
            .send()
            .await
            .context("issue update failed")?
            .error_for_status()
            .context("issue update returned an error status")?;
        Ok(())
    }
}

#[async_trait]
impl Reporter for GithubReporter {
    async fn report(&self, report: &ScanReport) -> Result<()> {
        let title = markdown::issue_title(report);
        let body = markdown::issue_body(report);
        let labels = vec![
            "regwatch".to_string(),
            format!("risk:{}", report.risk.level),
        ];

        match self.find_open_issue(&title).await? {
            Some(number) => {
                info!(issue = number, title = %title, "updating existing issue");
                self.update_issue(number, &body, &labels).await
            }
            None => {
                info!(title = %title, "creating issue");
                self.create_issue(&title, &body, &labels).await
            }
        }
    }
}
