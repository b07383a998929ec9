use anyhow::Result;
use parking_lot::RwLock;

use super::{insert_into, remove_from, StockDocument, WatchlistStore};
use crate::types::StockCode;

/// Non-persistent store. Used when no watch-list file is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<Vec<StockDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatchlistStore for MemoryStore {
    fn list(&self) -> Result<Vec<StockDocument>> {
        Ok(self.docs.read().clone())
    }

    fn insert(&self, stock: StockCode) -> Result<Option<StockDocument>> {
        Ok(insert_into(&mut self.docs.write(), stock))
    }

    fn remove(&self, stock: &StockCode) -> Result<Option<StockDocument>> {
        Ok(remove_from(&mut self.docs.write(), stock))
    }
}
