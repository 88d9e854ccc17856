//! Change-feed client: polls the registry's append-only `_changes` feed
//! with a resumable cursor.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

/// One entry in the change feed.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEntry {
    pub seq: u64,
    pub id: String,
    #[serde(default)]
    pub deleted: bool,
}

/// One page of the change feed. `last_seq` is the feed's high-water mark
/// for the page when the server reports one.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedPage {
    pub results: Vec<FeedEntry>,
    #[serde(default)]
    pub last_seq: Option<u64>,
}

/// The change-feed boundary. Implemented over HTTP in production and by
/// in-memory fakes in coordinator tests.
#[async_trait]
pub trait Feed: Send + Sync {
    /// Fetches up to `limit` entries after `since`. `None` means from the
    /// beginning of the feed (true cold start only).
    async fn changes(&self, since: Option<u64>, limit: usize) -> Result<FeedPage>;

    /// The feed's current high-water mark, used to seed the cursor on
    /// first run so history is not replayed.
    async fn high_water(&self) -> Result<u64>;
}

/// HTTP implementation against a CouchDB-style `_changes` endpoint.
pub struct HttpFeed {
    client: reqwest::Client,
    url: String,
}

impl HttpFeed {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Feed for HttpFeed {
    async fn changes(&self, since: Option<u64>, limit: usize) -> Result<FeedPage> {
        let mut request = self
            .client
            .get(&self.url)
            .query(&[("limit", limit.to_string())]);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_string())]);
        }

        let response = request
            .send()
            .await
            .context("change feed request failed")?
            .error_for_status()
            .context("change feed returned an error status")?;

        let page: FeedPage = response
            .json()
            .await
            .context("failed to decode change feed page")?;
        Ok(page)
    }

    async fn high_water(&self) -> Result<u64> {
        // One entry in descending order carries the newest sequence.
        let response = self
            .client
            .get(&self.url)
            .query(&[("descending", "true"), ("limit", "1")])
            .send()
            .await
            .context("high-water request failed")?
            .error_for_status()
            .context("high-water request returned an error status")?;

        let page: FeedPage = response
            .json()
            .await
            .context("failed to decode high-water page")?;

        page.last_seq
            .or_else(|| page.results.iter().map(|entry| entry.seq).max())
            .context("feed reported no sequence numbers")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_deleted_defaults_false() {
        let entry: FeedEntry = serde_json::from_str(r#"{"seq": 12, "id": "lodash"}"#).unwrap();
        assert_eq!(entry.seq, 12);
        assert!(!entry.deleted);
    }

    #[test]
    fn test_page_decodes_with_and_without_last_seq() {
        let page: FeedPage = serde_json::from_str(
            r#"{"results": [{"seq": 5, "id": "a", "deleted": true}], "last_seq": 9}"#,
        )
        .unwrap();
        assert_eq!(page.last_seq, Some(9));
        assert!(page.results[0].deleted);

        let page: FeedPage = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert_eq!(page.last_seq, None);
        assert!(page.results.is_empty());
    }
}
