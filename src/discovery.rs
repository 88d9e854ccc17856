//! Discovery: drains the change feed from the last committed cursor,
//! resolves entries to concrete versions, dedups against the discovered
//! set, and commits the new identifiers plus the advanced cursor.
//!
//! Discovery is version-aware: every feed entry is resolved to the
//! version it names, so a version bump within an already-known package is
//! still a new identifier.

use std::collections::HashSet;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::feed::{Feed, FeedEntry};
use crate::model::PackageId;
use crate::registry::Resolver;
use crate::state::StateStore;

/// Feed ids with this prefix are registry-internal design documents, not
/// packages.
const DESIGN_DOC_PREFIX: &str = "_design/";

/// Some registries serialize a missing version as this literal.
const UNDEFINED_VERSION: &str = "undefined";

/// Why a feed entry was skipped. Skips are expected flow, distinct from
/// failures: a skip never aborts the batch and is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The entry carries the `deleted` flag.
    Deleted,
    /// The id names a registry-internal design document.
    DesignDoc,
    /// The registry lookup returned 404 or failed; logged and dropped.
    Unresolvable,
    /// The resolved document has no usable version. Malformed, not retried.
    MissingVersion,
    /// The canonical id is already in the discovered set.
    AlreadyDiscovered,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Deleted => "deleted",
            SkipReason::DesignDoc => "design-doc",
            SkipReason::Unresolvable => "unresolvable",
            SkipReason::MissingVersion => "missing-version",
            SkipReason::AlreadyDiscovered => "already-discovered",
        }
    }
}

/// Outcome of examining one feed entry.
enum EntryOutcome {
    Discovered(PackageId),
    Skipped(SkipReason),
}

/// Summary of one discovery run.
#[derive(Debug, Clone)]
pub struct DiscoveryRun {
    /// Canonical ids newly added to the discovered set, in feed order.
    pub discovered: Vec<String>,
    /// The committed cursor after the run.
    pub cursor: u64,
    /// Feed entries examined, including skips.
    pub entries_seen: usize,
}

pub struct DiscoveryCoordinator<'a> {
    feed: &'a dyn Feed,
    resolver: &'a dyn Resolver,
    store: &'a StateStore,
    page_size: usize,
    /// Cap on *newly discovered* ids per run. Each discovery costs a
    /// registry round-trip, so a feed burst must not make one run
    /// unbounded. Skipped and duplicate entries do not count, so the
    /// cursor still advances past them.
    max_new_per_run: usize,
}

impl<'a> DiscoveryCoordinator<'a> {
    pub fn new(
        feed: &'a dyn Feed,
        resolver: &'a dyn Resolver,
        store: &'a StateStore,
        page_size: usize,
        max_new_per_run: usize,
    ) -> Self {
        Self {
            feed,
            resolver,
            store,
            page_size,
            max_new_per_run,
        }
    }

    /// Runs one discovery cycle: load state, walk a feed page, commit.
    pub async fn run(&self) -> Result<DiscoveryRun> {
        let cursor = match self.store.load_cursor() {
            Some(cursor) => Some(cursor),
            None => {
                // First run: seed from the current high-water mark so the
                // entire feed history is not replayed.
                let seeded = self.feed.high_water().await.context(
                    "no prior cursor and the feed's high-water mark is unavailable",
                )?;
                info!(cursor = seeded, "no prior state, seeding cursor from feed high-water mark");
                Some(seeded)
            }
        };
        let mut discovered_set = self.store.load_discovered();

        let page = self
            .feed
            .changes(cursor, self.page_size)
            .await
            .context("failed to fetch change feed page")?;

        let entries_seen = page.results.len();
        let mut newly_discovered: Vec<String> = Vec::new();
        let mut max_seq = cursor.unwrap_or(0);

        for entry in &page.results {
            max_seq = max_seq.max(entry.seq);

            match self.examine(entry, &discovered_set).await {
                EntryOutcome::Discovered(id) => {
                    let canonical = id.canonical();
                    debug!(package = %canonical, seq = entry.seq, "discovered new version");
                    discovered_set.insert(canonical.clone());
                    newly_discovered.push(canonical);
                    if newly_discovered.len() >= self.max_new_per_run {
                        info!(cap = self.max_new_per_run, "per-run discovery cap reached");
                        break;
                    }
                }
                EntryOutcome::Skipped(reason) => {
                    debug!(id = %entry.id, seq = entry.seq, reason = reason.as_str(), "skipped feed entry");
                }
            }
        }

        // The explicit high-water mark wins even when entries were
        // skipped; those entries are never re-examined.
        let next_cursor = page.last_seq.unwrap_or(max_seq);

        self.store
            .commit(next_cursor, &newly_discovered)
            .context("failed to commit discovery state")?;

        info!(
            entries = entries_seen,
            discovered = newly_discovered.len(),
            cursor = next_cursor,
            "discovery run complete"
        );

        Ok(DiscoveryRun {
            discovered: newly_discovered,
            cursor: next_cursor,
            entries_seen,
        })
    }

    async fn examine(&self, entry: &FeedEntry, discovered: &HashSet<String>) -> EntryOutcome {
        if entry.deleted {
            return EntryOutcome::Skipped(SkipReason::Deleted);
        }
        if entry.id.starts_with(DESIGN_DOC_PREFIX) {
            return EntryOutcome::Skipped(SkipReason::DesignDoc);
        }

        let info = match self.resolver.resolve_latest(&entry.id).await {
            Ok(Some(info)) => info,
            Ok(None) => return EntryOutcome::Skipped(SkipReason::Unresolvable),
            Err(err) => {
                // Resolution failure is isolated to this entry.
                warn!(id = %entry.id, error = %err, "registry lookup failed, skipping entry");
                return EntryOutcome::Skipped(SkipReason::Unresolvable);
            }
        };

        if info.version.is_empty() || info.version == UNDEFINED_VERSION {
            return EntryOutcome::Skipped(SkipReason::MissingVersion);
        }

        let id = info.id();
        if discovered.contains(&id.canonical()) {
            return EntryOutcome::Skipped(SkipReason::AlreadyDiscovered);
        }

        EntryOutcome::Discovered(id)
    }
}
