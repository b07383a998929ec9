// =============================================================================
// JSON File Store — watch-list documents persisted as one JSON array
// =============================================================================
//
// The whole document list is kept in memory and rewritten on every mutation
// using an atomic tmp + rename so a crash mid-write never leaves a truncated
// file behind. A missing file on open is an empty watch-list.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{insert_into, remove_from, StockDocument, WatchlistStore};
use crate::types::StockCode;

pub struct JsonFileStore {
    path: PathBuf,
    docs: RwLock<Vec<StockDocument>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading existing documents if the file exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let docs = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read watch-list from {}", path.display()))?;
            if content.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&content).with_context(|| {
                    format!("failed to parse watch-list from {}", path.display())
                })?
            }
        } else {
            Vec::new()
        };

        info!(path = %path.display(), count = docs.len(), "watch-list store opened");

        Ok(Self {
            path,
            docs: RwLock::new(docs),
        })
    }

    fn persist(&self, docs: &[StockDocument]) -> Result<()> {
        let content =
            serde_json::to_string_pretty(docs).context("failed to serialise watch-list to JSON")?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create watch-list directory {}", parent.display())
                })?;
            }
        }

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp watch-list to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path).with_context(|| {
            format!("failed to rename tmp watch-list to {}", self.path.display())
        })?;

        debug!(path = %self.path.display(), count = docs.len(), "watch-list saved");
        Ok(())
    }
}

impl WatchlistStore for JsonFileStore {
    fn list(&self) -> Result<Vec<StockDocument>> {
        Ok(self.docs.read().clone())
    }

    fn insert(&self, stock: StockCode) -> Result<Option<StockDocument>> {
        let mut docs = self.docs.write();
        let Some(doc) = insert_into(&mut docs, stock) else {
            return Ok(None);
        };
        if let Err(e) = self.persist(&docs) {
            // Keep memory and disk in agreement.
            docs.pop();
            return Err(e);
        }
        Ok(Some(doc))
    }

    fn remove(&self, stock: &StockCode) -> Result<Option<StockDocument>> {
        let mut docs = self.docs.write();
        let before = docs.clone();
        let Some(doc) = remove_from(&mut docs, stock) else {
            return Ok(None);
        };
        if let Err(e) = self.persist(&docs) {
            *docs = before;
            return Err(e);
        }
        Ok(Some(doc))
    }
}

impl std::fmt::Debug for JsonFileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonFileStore")
            .field("path", &self.path)
            .field("count", &self.docs.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> StockCode {
        s.parse().unwrap()
    }

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("stockwatch-test-{}", uuid::Uuid::new_v4()))
            .join("watchlist.json")
    }

    #[test]
    fn missing_file_is_empty() {
        let store = JsonFileStore::open(temp_path()).unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn documents_survive_reopen() {
        let path = temp_path();
        {
            let store = JsonFileStore::open(&path).unwrap();
            store.insert(code("AAPL")).unwrap();
            store.insert(code("MSFT")).unwrap();
            store.insert(code("GOOG")).unwrap();
            store.remove(&code("MSFT")).unwrap();
        }
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.stocks().unwrap(), vec![code("AAPL"), code("GOOG")]);
        assert!(!path.with_extension("json.tmp").exists());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn duplicate_insert_does_not_touch_disk() {
        let path = temp_path();
        let store = JsonFileStore::open(&path).unwrap();
        let first = store.insert(code("AAPL")).unwrap().unwrap();
        assert!(store.insert(code("AAPL")).unwrap().is_none());

        let reopened = JsonFileStore::open(&path).unwrap();
        let docs = reopened.list().unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, first.id);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn failed_write_rolls_back_insert() {
        let path = temp_path();
        let dir = path.parent().unwrap().to_path_buf();
        std::fs::create_dir_all(&dir).unwrap();
        // A plain file where the store expects a directory.
        let blocker = dir.join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let store = JsonFileStore::open(blocker.join("watchlist.json")).unwrap();
        assert!(store.insert(code("AAPL")).is_err());
        assert!(store.list().unwrap().is_empty());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn failed_write_rolls_back_remove() {
        let path = temp_path();
        let dir = path.parent().unwrap().to_path_buf();
        let store = JsonFileStore::open(&path).unwrap();
        store.insert(code("AAPL")).unwrap();
        store.insert(code("MSFT")).unwrap();

        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::write(&dir, "").unwrap();

        assert!(store.remove(&code("AAPL")).is_err());
        assert_eq!(store.stocks().unwrap(), vec![code("AAPL"), code("MSFT")]);

        let _ = std::fs::remove_file(dir);
    }
}
