// In-process backend

use crate::backend::Backend;
use crate::record::Record;
use eyre::{Context, Result, eyre};
use std::collections::{BTreeSet, HashMap};

/// Backend held in process memory.
///
/// Documents are kept as serialized JSON so reads go through the same
/// deserialization as the SQLite store. There is no range search, so callers
/// fall back to scanning. `set_offline(true)` makes every call fail.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    documents: HashMap<(String, String), String>,
    sets: HashMap<String, BTreeSet<String>>,
    offline: bool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Store a raw JSON document, bypassing serialization
    pub fn insert_raw(&mut self, collection: &str, id: &str, json: &str) {
        self.documents
            .insert((collection.to_string(), id.to_string()), json.to_string());
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            return Err(eyre!("Memory backend is offline"));
        }
        Ok(())
    }

    fn key<T: Record>(id: &str) -> (String, String) {
        (T::collection_name().to_string(), id.to_string())
    }
}

impl Backend for MemoryBackend {
    fn init<T: Record>(&mut self, _set: &str) -> Result<()> {
        self.check_online()
    }

    fn insert<T: Record>(&mut self, record: &T) -> Result<()> {
        self.check_online()?;
        let json = serde_json::to_string(record).context("Failed to serialize record")?;
        self.documents.insert(Self::key::<T>(record.id()), json);
        Ok(())
    }

    fn fetch<T: Record>(&self, id: &str) -> Result<Option<T>> {
        self.check_online()?;
        match self.documents.get(&Self::key::<T>(id)) {
            Some(json) => Ok(Some(
                serde_json::from_str(json).context("Failed to deserialize record")?,
            )),
            None => Ok(None),
        }
    }

    fn replace<T: Record>(&mut self, record: &T) -> Result<bool> {
        self.check_online()?;
        let key = Self::key::<T>(record.id());
        if !self.documents.contains_key(&key) {
            return Ok(false);
        }
        let json = serde_json::to_string(record).context("Failed to serialize record")?;
        self.documents.insert(key, json);
        Ok(true)
    }

    fn remove<T: Record>(&mut self, id: &str) -> Result<bool> {
        self.check_online()?;
        Ok(self.documents.remove(&Self::key::<T>(id)).is_some())
    }

    fn add_member(&mut self, set: &str, member: &str) -> Result<()> {
        self.check_online()?;
        self.sets
            .entry(set.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    fn remove_member(&mut self, set: &str, member: &str) -> Result<bool> {
        self.check_online()?;
        Ok(self
            .sets
            .get_mut(set)
            .is_some_and(|members| members.remove(member)))
    }

    fn members(&self, set: &str) -> Result<Vec<String>> {
        self.check_online()?;
        Ok(self
            .sets
            .get(set)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default())
    }

    fn ping(&self) -> Result<()> {
        self.check_online()
    }
}
