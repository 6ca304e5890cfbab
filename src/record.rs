// Storable record trait and indexable values

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Core trait that any storable record must implement
pub trait Record: Serialize + for<'de> Deserialize<'de> + Clone + Send + Sync + 'static {
    /// Unique identifier for this record
    fn id(&self) -> &str;

    /// Timestamp when this record was last updated (milliseconds since epoch)
    fn updated_at(&self) -> i64;

    /// Collection name for this record type, also the JSONL filename stem
    fn collection_name() -> &'static str
    where
        Self: Sized;

    /// Fields available to range search and filtering
    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        HashMap::new()
    }
}

/// Value types that can be indexed for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexValue {
    Int(i64),
}
