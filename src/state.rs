//! Durable discovery/scan state: the feed cursor plus the discovered and
//! scanned identifier sets.
//!
//! # On-disk layout
//!
//! Everything lives under a single state directory:
//!
//! - `cursor` - the feed cursor as a bare integer
//! - `discovered.txt` - newline-delimited canonical `name@version` ids
//! - `scanned.txt` - same format, independent failure domain
//!
//! The set files are append-only: a commit appends only the new ids, so
//! repeated commits with overlapping ids are harmless (membership is a
//! set, duplicates on disk collapse at load time). The cursor is a full
//! rewrite of a single scalar.
//!
//! Load errors are deliberately non-fatal. This system prefers
//! availability over perfect resumption: duplicate discovery is cheap,
//! while refusing to run loses feed entries for good once a later run
//! advances the cursor.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

const CURSOR_FILE: &str = "cursor";
const DISCOVERED_FILE: &str = "discovered.txt";
const SCANNED_FILE: &str = "scanned.txt";

/// Error writing durable state. Reads never produce this; a failed read
/// degrades to "no prior state".
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Owns all persistence for the discovery and scan phases.
pub struct StateStore {
    dir: PathBuf,
}

impl StateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<(), StateError> {
        fs::create_dir_all(&self.dir).map_err(|source| StateError::Write {
            path: self.dir.clone(),
            source,
        })
    }

    /// Loads the feed cursor. `None` means no usable prior state; the
    /// discovery coordinator then seeds from the feed's current
    /// high-water mark instead of replaying history from zero.
    pub fn load_cursor(&self) -> Option<u64> {
        let path = self.dir.join(CURSOR_FILE);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(_) => return None,
        };
        match content.trim().parse::<u64>() {
            Ok(cursor) => Some(cursor),
            Err(_) => {
                warn!(path = %path.display(), "cursor file is unreadable, treating as no prior state");
                None
            }
        }
    }

    /// Loads the discovered set. Read errors degrade to an empty set.
    pub fn load_discovered(&self) -> HashSet<String> {
        self.load_set(DISCOVERED_FILE)
    }

    /// Loads the scanned set. Read errors degrade to an empty set.
    pub fn load_scanned(&self) -> HashSet<String> {
        self.load_set(SCANNED_FILE)
    }

    fn load_set(&self, file: &str) -> HashSet<String> {
        let path = self.dir.join(file);
        match fs::read_to_string(&path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => HashSet::new(),
        }
    }

    /// Persists the advanced cursor and appends newly discovered ids.
    ///
    /// Safe to call with ids that were already committed: the file gains
    /// duplicate lines but membership is unchanged.
    pub fn commit(&self, cursor: u64, newly_discovered: &[String]) -> Result<(), StateError> {
        self.ensure_dir()?;
        self.append_set(DISCOVERED_FILE, newly_discovered)?;
        // Cursor last: a crash before this point re-walks the same page,
        // which dedup absorbs. A crash after an early cursor write would
        // skip the page's ids entirely.
        let path = self.dir.join(CURSOR_FILE);
        fs::write(&path, format!("{}\n", cursor))
            .map_err(|source| StateError::Write { path, source })
    }

    /// Appends ids to the scanned set. Independent of [`commit`]: a crash
    /// between the two leaves each file individually consistent.
    ///
    /// [`commit`]: StateStore::commit
    pub fn commit_scanned(&self, ids: &[String]) -> Result<(), StateError> {
        self.ensure_dir()?;
        self.append_set(SCANNED_FILE, ids)
    }

    fn append_set(&self, file: &str, ids: &[String]) -> Result<(), StateError> {
        if ids.is_empty() {
            return Ok(());
        }
        let path = self.dir.join(file);
        let mut handle = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| StateError::Write {
                path: path.clone(),
                source,
            })?;
        let mut block = String::with_capacity(ids.iter().map(|id| id.len() + 1).sum());
        for id in ids {
            block.push_str(id);
            block.push('\n');
        }
        handle
            .write_all(block.as_bytes())
            .map_err(|source| StateError::Write { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn test_empty_store_has_no_state() {
        let (_dir, store) = store();
        assert_eq!(store.load_cursor(), None);
        assert!(store.load_discovered().is_empty());
        assert!(store.load_scanned().is_empty());
    }

    #[test]
    fn test_commit_round_trip() {
        let (_dir, store) = store();
        store
            .commit(42, &["lodash@4.17.21".to_string(), "left-pad@1.3.0".to_string()])
            .unwrap();

        assert_eq!(store.load_cursor(), Some(42));
        let discovered = store.load_discovered();
        assert_eq!(discovered.len(), 2);
        assert!(discovered.contains("lodash@4.17.21"));
        assert!(discovered.contains("left-pad@1.3.0"));
    }

    #[test]
    fn test_commit_is_idempotent_under_overlap() {
        let (_dir, store) = store();
        let ids = vec!["lodash@4.17.21".to_string()];
        store.commit(10, &ids).unwrap();
        store.commit(11, &ids).unwrap();

        assert_eq!(store.load_cursor(), Some(11));
        assert_eq!(store.load_discovered().len(), 1);
    }

    #[test]
    fn test_commit_appends_across_runs() {
        let (_dir, store) = store();
        store.commit(1, &["a@1.0.0".to_string()]).unwrap();
        store.commit(2, &["b@2.0.0".to_string()]).unwrap();

        let discovered = store.load_discovered();
        assert_eq!(discovered.len(), 2);
        assert!(discovered.contains("a@1.0.0"));
        assert!(discovered.contains("b@2.0.0"));
    }

    #[test]
    fn test_scanned_is_independent_of_discovered() {
        let (_dir, store) = store();
        store.commit_scanned(&["a@1.0.0".to_string()]).unwrap();

        assert!(store.load_discovered().is_empty());
        assert_eq!(store.load_scanned().len(), 1);
        assert_eq!(store.load_cursor(), None);
    }

    #[test]
    fn test_corrupt_cursor_degrades_to_none() {
        let (dir, store) = store();
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join(CURSOR_FILE), "not a number").unwrap();
        assert_eq!(store.load_cursor(), None);
    }

    #[test]
    fn test_set_load_skips_blank_lines() {
        let (dir, store) = store();
        fs::write(dir.path().join(DISCOVERED_FILE), "a@1.0.0\n\n  \nb@2.0.0\n").unwrap();
        let discovered = store.load_discovered();
        assert_eq!(discovered.len(), 2);
    }

    #[test]
    fn test_scoped_ids_survive_round_trip() {
        let (_dir, store) = store();
        store.commit(5, &["@types/node@20.1.0".to_string()]).unwrap();
        assert!(store.load_discovered().contains("@types/node@20.1.0"));
    }
}
