// =============================================================================
// Watch-list Store — persisted documents, one per tracked stock
// =============================================================================
//
// The store holds nothing but the symbol list; price history always comes
// from the upstream API. Implementations must keep documents in insertion
// order and never hold two documents for the same stock.

pub mod json_file;
pub mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::StockCode;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;

/// A single watch-list entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockDocument {
    pub id: Uuid,
    pub stock: StockCode,
    pub added_at: DateTime<Utc>,
}

impl StockDocument {
    pub fn new(stock: StockCode) -> Self {
        Self {
            id: Uuid::new_v4(),
            stock,
            added_at: Utc::now(),
        }
    }
}

/// Persistence seam for the watch-list.
pub trait WatchlistStore: Send + Sync {
    /// All documents, oldest first.
    fn list(&self) -> Result<Vec<StockDocument>>;

    /// Add `stock`. Returns `None` without writing if it is already tracked.
    fn insert(&self, stock: StockCode) -> Result<Option<StockDocument>>;

    /// Remove `stock`, returning the deleted document if there was one.
    fn remove(&self, stock: &StockCode) -> Result<Option<StockDocument>>;

    fn contains(&self, stock: &StockCode) -> Result<bool> {
        Ok(self.list()?.iter().any(|doc| &doc.stock == stock))
    }

    /// Just the stock codes, oldest first.
    fn stocks(&self) -> Result<Vec<StockCode>> {
        Ok(self.list()?.into_iter().map(|doc| doc.stock).collect())
    }
}

/// Shared insert/remove logic over an in-memory document list.
pub(crate) fn insert_into(
    docs: &mut Vec<StockDocument>,
    stock: StockCode,
) -> Option<StockDocument> {
    if docs.iter().any(|doc| doc.stock == stock) {
        return None;
    }
    let doc = StockDocument::new(stock);
    docs.push(doc.clone());
    Some(doc)
}

pub(crate) fn remove_from(
    docs: &mut Vec<StockDocument>,
    stock: &StockCode,
) -> Option<StockDocument> {
    let pos = docs.iter().position(|doc| &doc.stock == stock)?;
    Some(docs.remove(pos))
}
