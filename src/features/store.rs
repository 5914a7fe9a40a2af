//! Durable known-contest store.
//!
//! A plain JSON file — `{ "ids": [ ... ] }` — holding the ids already
//! notified about. Chosen over anything heavier for the same reasons a lookup
//! table of O(100) entries never needs a database: sub-millisecond reads,
//! no external process, readable and editable by the operator.
//!
//! Writes are atomic (write-to-temp then rename) so a concurrent reader can
//! never observe a partial file. The set is replaced wholesale on every save;
//! ids absent from the latest snapshot age out and will re-notify if the
//! contest reappears.
//!
//! One guard applies: an empty set is never allowed to replace a non-empty
//! one unless the existing file can be read back and confirmed empty. A read
//! glitch during that check also refuses the write — history survives
//! transient filesystem trouble.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write known-contest store: {0}")]
    Write(#[source] std::io::Error),

    #[error("failed to serialize known-contest store: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    ids: Vec<String>,
}

pub struct ContestStore {
    path: PathBuf,
}

impl ContestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted id set.
    ///
    /// An absent file is "no known contests", not an error. Unreadable or
    /// unparseable files degrade to the empty set with a warning — the
    /// defensive guard in [`ContestStore::save`] keeps the on-disk history
    /// intact in that case.
    pub fn load(&self) -> HashSet<String> {
        if !self.path.exists() {
            return HashSet::new();
        }
        match self.read_back() {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!(
                    "contest store: could not load {} ({}) — treating as empty",
                    self.path.display(),
                    e
                );
                HashSet::new()
            }
        }
    }

    /// Persist `ids` wholesale, replacing the previous set.
    ///
    /// Refuses (with a warning, not an error) to overwrite when `ids` is
    /// empty and the existing file either holds a non-empty set or cannot be
    /// read back.
    pub fn save(&self, ids: &HashSet<String>) -> Result<(), StoreError> {
        if ids.is_empty() && self.path.exists() {
            match self.read_back() {
                Ok(existing) if !existing.is_empty() => {
                    warn!(
                        "contest store: refusing to overwrite {} known ids with an empty set",
                        existing.len()
                    );
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        "contest store: could not read back {} ({}) — refusing empty overwrite",
                        self.path.display(),
                        e
                    );
                    return Ok(());
                }
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Write)?;
        }

        let mut sorted: Vec<String> = ids.iter().cloned().collect();
        sorted.sort();
        let json = serde_json::to_string_pretty(&StoreFile { ids: sorted })
            .map_err(StoreError::Serialize)?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &json).map_err(StoreError::Write)?;
        std::fs::rename(&tmp, &self.path).map_err(StoreError::Write)?;
        Ok(())
    }

    fn read_back(&self) -> anyhow::Result<Vec<String>> {
        let raw = std::fs::read_to_string(&self.path)?;
        let parsed: StoreFile = serde_json::from_str(&raw)?;
        Ok(parsed.ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static COUNTER: AtomicUsize = AtomicUsize::new(0);

    fn temp_store() -> ContestStore {
        let dir = std::env::temp_dir().join(format!(
            "matchwatch-store-{}-{}",
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        ContestStore::new(dir.join("contests.json"))
    }

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_absent_file_loads_empty() {
        let store = temp_store();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_save_then_load_roundtrips() {
        let store = temp_store();
        store.save(&ids(&["12", "7", "99"])).unwrap();
        assert_eq!(store.load(), ids(&["7", "12", "99"]));
    }

    #[test]
    fn test_save_replaces_wholesale() {
        let store = temp_store();
        store.save(&ids(&["1", "2"])).unwrap();
        store.save(&ids(&["2", "3"])).unwrap();
        assert_eq!(store.load(), ids(&["2", "3"]));
    }

    #[test]
    fn test_refuses_empty_overwrite_of_nonempty_set() {
        let store = temp_store();
        store.save(&ids(&["1", "2"])).unwrap();
        store.save(&HashSet::new()).unwrap();
        assert_eq!(store.load(), ids(&["1", "2"]));
    }

    #[test]
    fn test_refuses_empty_overwrite_when_readback_fails() {
        let store = temp_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();

        store.save(&HashSet::new()).unwrap();

        // File must be untouched, not replaced with an empty set.
        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, "{not json");
    }

    #[test]
    fn test_allows_empty_write_over_empty_file() {
        let store = temp_store();
        store.save(&HashSet::new()).unwrap();
        assert!(store.path().exists());
        assert!(store.load().is_empty());

        store.save(&HashSet::new()).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty_with_history_preserved() {
        let store = temp_store();
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "][").unwrap();
        assert!(store.load().is_empty());
        // The corrupt file itself is left alone until a non-empty save.
        assert!(store.path().exists());
    }
}
