//! Reporting: turning a [`ScanReport`] into a tracking issue.
//!
//! [`ScanReport`]: crate::model::ScanReport

mod github;
pub mod markdown;

pub use github::GithubReporter;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::ScanReport;

/// The reporting boundary. Idempotent by `name@version` identity: calling
/// `report` twice for the same scan must not produce two issues.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report(&self, report: &ScanReport) -> Result<()>;
}
