// Task persistence using JSONL + SQLite

use crate::backend::Backend;
use crate::clock::now_ms;
use crate::filter::Filter;
use crate::jsonl;
use crate::record::{IndexValue, Record};
use eyre::{Context, Result, eyre};
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CURRENT_VERSION: u32 = 1;
const STORE_DIR: &str = ".timetrack";
const DB_FILE: &str = "timetrack.db";
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Persistent store with SQLite cache and JSONL source of truth
pub struct Store {
    base_path: PathBuf,
    db: Connection,
    /// Collections reloaded from JSONL whose typed indexes and sets need rebuilding
    pending_rebuild: HashSet<String>,
}

impl Store {
    /// Open or create a store at the given path
    ///
    /// The store will be created in a `.timetrack` subdirectory of the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let base_path = path.as_ref().join(STORE_DIR);

        fs::create_dir_all(&base_path).context("Failed to create store directory")?;

        let db_path = base_path.join(DB_FILE);
        let db = Connection::open(&db_path).context("Failed to open SQLite database")?;
        db.busy_timeout(BUSY_TIMEOUT)?;

        let mut store = Self {
            base_path,
            db,
            pending_rebuild: HashSet::new(),
        };

        store.create_schema()?;
        store.create_gitignore()?;
        store.write_version()?;

        if store.is_stale()? {
            info!(path = ?store.base_path, "Database is stale, syncing from JSONL files");
            store.sync()?;
        }

        Ok(store)
    }

    /// Get the base path of this store
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn jsonl_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    /// Create database schema
    fn create_schema(&self) -> Result<()> {
        debug!("Creating database schema");

        self.db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            );

            CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection);

            -- Indexed field values; rows are removed alongside their record
            CREATE TABLE IF NOT EXISTS record_indexes (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                field_name TEXT NOT NULL,
                field_value_int INTEGER NOT NULL,
                PRIMARY KEY (collection, id, field_name)
            );

            -- Named sets (live-id index)
            CREATE TABLE IF NOT EXISTS set_members (
                set_name TEXT NOT NULL,
                member TEXT NOT NULL,
                PRIMARY KEY (set_name, member)
            );

            -- Sync metadata for staleness detection
            CREATE TABLE IF NOT EXISTS sync_metadata (
                collection TEXT PRIMARY KEY,
                last_sync_time INTEGER NOT NULL,
                file_mtime INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Create .gitignore file
    fn create_gitignore(&self) -> Result<()> {
        let gitignore_path = self.base_path.join(".gitignore");
        if !gitignore_path.exists() {
            fs::write(
                gitignore_path,
                "timetrack.db\ntimetrack.db-shm\ntimetrack.db-wal\ntimetrack.db-journal\n",
            )?;
        }
        Ok(())
    }

    /// Write version file
    fn write_version(&self) -> Result<()> {
        let version_path = self.base_path.join(".version");
        if !version_path.exists() {
            fs::write(version_path, CURRENT_VERSION.to_string())?;
        }
        Ok(())
    }

    /// Check if database needs syncing from JSONL
    ///
    /// Returns true if any JSONL file has been modified since it was last
    /// synced or written through this store, or has never been synced.
    pub fn is_stale(&self) -> Result<bool> {
        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();

            if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
                continue;
            }

            let collection = match path.file_stem().and_then(|s| s.to_str()) {
                Some(c) => c,
                None => continue,
            };

            let file_mtime = file_mtime(&path)?;

            let stored_mtime: Option<i64> = self
                .db
                .query_row(
                    "SELECT file_mtime FROM sync_metadata WHERE collection = ?1",
                    [collection],
                    |row| row.get(0),
                )
                .optional()?;

            match stored_mtime {
                None => return Ok(true),                              // Never synced
                Some(mtime) if file_mtime > mtime => return Ok(true), // File modified
                _ => continue,
            }
        }

        Ok(false)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// List records matching every filter, ordered by id
    ///
    /// With `set`, only records whose id is a member of that set are returned.
    pub fn list<T: Record>(&self, set: Option<&str>, filters: &[Filter]) -> Result<Vec<T>> {
        let collection = T::collection_name();

        let mut query = String::from(
            "SELECT r.data_json
             FROM records r
             WHERE r.collection = ?1",
        );

        // Bind parameters: collection, then field name and value per filter, then the set
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        params.push(Box::new(collection.to_string()));

        for (i, filter) in filters.iter().enumerate() {
            Self::validate_field_name(&filter.field)?;

            let IndexValue::Int(value) = filter.value;
            query.push_str(&format!(
                " AND EXISTS (
                    SELECT 1 FROM record_indexes {alias}
                    WHERE {alias}.collection = r.collection
                      AND {alias}.id = r.id
                      AND {alias}.field_name = ?{name_param}
                      AND {alias}.field_value_int {op} ?{value_param})",
                alias = format!("idx{}", i),
                name_param = params.len() + 1,
                op = filter.op.to_sql(),
                value_param = params.len() + 2,
            ));
            params.push(Box::new(filter.field.clone()));
            params.push(Box::new(value));
        }

        if let Some(set) = set {
            query.push_str(&format!(
                " AND EXISTS (
                    SELECT 1 FROM set_members m
                    WHERE m.set_name = ?{set_param}
                      AND m.member = r.id)",
                set_param = params.len() + 1,
            ));
            params.push(Box::new(set.to_string()));
        }

        query.push_str(" ORDER BY r.id");

        let mut stmt = self.db.prepare(&query)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), |row| row.get::<_, String>(0))?;

        let mut results = Vec::new();
        for row_result in rows {
            let data_json = row_result?;
            let record: T = serde_json::from_str(&data_json).context("Failed to deserialize record")?;
            results.push(record);
        }

        Ok(results)
    }

    // ========================================================================
    // Write helpers
    // ========================================================================

    /// Append to JSONL and upsert into SQLite under one write transaction.
    ///
    /// With `must_exist`, nothing is written when the record is absent.
    fn write_record<T: Record>(&mut self, record: &T, must_exist: bool) -> Result<bool> {
        let collection = T::collection_name();
        Self::validate_collection_name(collection)?;

        let id = record.id();
        Self::validate_id(id)?;

        let data_json = serde_json::to_string(record).context("Failed to serialize record")?;
        let jsonl_path = self.jsonl_path(collection);

        let tx = self.db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if must_exist && Self::stored_updated_at(&tx, collection, id)?.is_none() {
            debug!(collection, id, "write_record: no existing record, skipping");
            return Ok(false);
        }

        // Appending while holding the write lock keeps JSONL order equal to commit order
        jsonl::append_jsonl(&jsonl_path, record)?;

        tx.execute(
            "INSERT OR REPLACE INTO records (collection, id, data_json, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![collection, id, data_json, record.updated_at()],
        )?;

        Self::update_indexes_tx(&tx, collection, id, &record.indexed_fields())?;
        Self::record_sync_tx(&tx, collection, &jsonl_path)?;

        tx.commit()?;
        Ok(true)
    }

    fn stored_updated_at(tx: &Transaction, collection: &str, id: &str) -> Result<Option<i64>> {
        let updated_at = tx
            .query_row(
                "SELECT updated_at FROM records WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(updated_at)
    }

    /// Remember the JSONL mtime so our own appends do not look stale on reopen
    fn record_sync_tx(tx: &Transaction, collection: &str, jsonl_path: &Path) -> Result<()> {
        tx.execute(
            "INSERT OR REPLACE INTO sync_metadata (collection, last_sync_time, file_mtime)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![collection, now_ms(), file_mtime(jsonl_path)?],
        )?;
        Ok(())
    }

    fn update_indexes_tx(
        tx: &Transaction,
        collection: &str,
        id: &str,
        fields: &HashMap<String, IndexValue>,
    ) -> Result<()> {
        debug!(collection, id, field_count = fields.len(), "update_indexes_tx: called");

        tx.execute(
            "DELETE FROM record_indexes WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id],
        )?;

        for (field_name, value) in fields {
            debug!(collection, id, field_name, ?value, "update_indexes_tx: inserting index");
            Self::validate_field_name(field_name)?;

            let IndexValue::Int(value) = value;
            tx.execute(
                "INSERT INTO record_indexes (collection, id, field_name, field_value_int)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![collection, id, field_name, value],
            )?;
        }

        Ok(())
    }

    fn validate_collection_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(eyre!("Collection name cannot be empty"));
        }
        if name.len() > 64 {
            return Err(eyre!("Collection name too long: {} (max 64 chars)", name));
        }
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-') {
            return Err(eyre!(
                "Invalid collection name: {} (must be alphanumeric with _/-)",
                name
            ));
        }
        Ok(())
    }

    fn validate_field_name(name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(eyre!("Field name cannot be empty"));
        }
        if name.len() > 64 {
            return Err(eyre!("Field name too long: {} (max 64 chars)", name));
        }
        if !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return Err(eyre!("Invalid field name: {} (must be alphanumeric with _)", name));
        }
        Ok(())
    }

    /// Validate record ID
    fn validate_id(id: &str) -> Result<()> {
        if id.trim().is_empty() {
            return Err(eyre!("Record ID cannot be empty or whitespace-only"));
        }

        // Prevent huge keys
        if id.len() > 256 {
            return Err(eyre!("Record ID too long: {} chars (max 256)", id.len()));
        }

        Ok(())
    }

    // ========================================================================
    // Sync operations
    // ========================================================================

    /// Reload SQLite records from JSONL files
    ///
    /// Typed indexes and sets are rebuilt by the next `init::<T>()`.
    pub fn sync(&mut self) -> Result<usize> {
        info!(path = ?self.base_path, "Syncing database from JSONL files");

        let tx = self.db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute("DELETE FROM record_indexes", [])?;
        tx.execute("DELETE FROM records", [])?;
        // Re-recorded below for every JSONL file still present
        tx.execute("DELETE FROM sync_metadata", [])?;

        let mut total = 0;

        for entry in fs::read_dir(&self.base_path)? {
            let path = entry?.path();

            if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
                continue;
            }

            let collection = path
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| eyre!("Invalid JSONL filename: {:?}", path))?
                .to_string();

            debug!(collection, "Syncing collection");

            let records = jsonl::read_jsonl_latest(&path)?;

            for (id, record) in records {
                if jsonl::is_tombstone(&record) {
                    continue;
                }

                tx.execute(
                    "INSERT OR REPLACE INTO records (collection, id, data_json, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![&collection, &id, serde_json::to_string(&record)?, jsonl::updated_at_of(&record)],
                )?;
                total += 1;
            }

            Self::record_sync_tx(&tx, &collection, &path)?;
            self.pending_rebuild.insert(collection);
        }

        tx.commit()?;

        info!(records = total, "Sync complete");
        Ok(total)
    }

    /// Rebuild indexes for a specific record type after sync
    ///
    /// Records in the collection that don't deserialize to `T` are skipped
    /// with a warning. Returns the number of records indexed.
    pub fn rebuild_indexes<T: Record>(&mut self) -> Result<usize> {
        let collection = T::collection_name();

        // Block scope drops stmt before the transaction starts
        let records_data: Vec<(String, String)> = {
            let mut stmt = self
                .db
                .prepare("SELECT id, data_json FROM records WHERE collection = ?1")?;

            let rows = stmt.query_map([collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;

            rows.filter_map(|r| r.ok()).collect()
        };

        let tx = self.db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM record_indexes WHERE collection = ?1", [collection])?;

        let mut count = 0;

        for (id, data_json) in records_data {
            let record: T = match serde_json::from_str(&data_json) {
                Ok(r) => r,
                Err(e) => {
                    warn!(
                        collection = collection,
                        id = &id,
                        error = ?e,
                        "Skipping record that doesn't match type"
                    );
                    continue;
                }
            };

            Self::update_indexes_tx(&tx, collection, &id, &record.indexed_fields())?;
            count += 1;
        }

        tx.commit()?;
        debug!(collection = collection, count = count, "Rebuilt indexes for collection");
        Ok(count)
    }

    /// Replace a set's members with the ids of every record in `T`'s collection
    pub fn rebuild_members<T: Record>(&mut self, set: &str) -> Result<usize> {
        let collection = T::collection_name();

        let tx = self.db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM set_members WHERE set_name = ?1", [set])?;
        let count = tx.execute(
            "INSERT INTO set_members (set_name, member)
             SELECT ?1, id FROM records WHERE collection = ?2",
            rusqlite::params![set, collection],
        )?;
        tx.commit()?;

        debug!(set, collection, count, "Rebuilt set members");
        Ok(count)
    }
}

impl Backend for Store {
    fn init<T: Record>(&mut self, set: &str) -> Result<()> {
        let collection = T::collection_name();
        if self.pending_rebuild.contains(collection) {
            self.rebuild_indexes::<T>()?;
            self.rebuild_members::<T>(set)?;
            self.pending_rebuild.remove(collection);
        }
        Ok(())
    }

    fn ensure_range_index<T: Record>(&mut self, field: &str) -> Result<bool> {
        Self::validate_collection_name(T::collection_name())?;
        Self::validate_field_name(field)?;

        self.db.execute_batch(
            "CREATE INDEX IF NOT EXISTS idx_record_indexes_field_int
             ON record_indexes(collection, field_name, field_value_int);",
        )?;
        Ok(true)
    }

    fn insert<T: Record>(&mut self, record: &T) -> Result<()> {
        self.write_record(record, false)?;
        Ok(())
    }

    fn fetch<T: Record>(&self, id: &str) -> Result<Option<T>> {
        let collection = T::collection_name();

        let mut stmt = self
            .db
            .prepare("SELECT data_json FROM records WHERE collection = ?1 AND id = ?2")?;

        let result = stmt
            .query_row(rusqlite::params![collection, id], |row| row.get::<_, String>(0))
            .optional()?;

        match result {
            Some(json) => {
                let record: T = serde_json::from_str(&json).context("Failed to deserialize record from database")?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn replace<T: Record>(&mut self, record: &T) -> Result<bool> {
        self.write_record(record, true)
    }

    fn remove<T: Record>(&mut self, id: &str) -> Result<bool> {
        let collection = T::collection_name();
        let jsonl_path = self.jsonl_path(collection);

        let tx = self.db.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some(stored_updated_at) = Self::stored_updated_at(&tx, collection, id)? else {
            return Ok(false);
        };

        // Tombstone must outrank the record it deletes when JSONL is replayed
        let deleted_at = now_ms().max(stored_updated_at + 1);
        jsonl::append_jsonl(&jsonl_path, &jsonl::tombstone(id, deleted_at))?;

        tx.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id],
        )?;
        tx.execute(
            "DELETE FROM record_indexes WHERE collection = ?1 AND id = ?2",
            rusqlite::params![collection, id],
        )?;
        Self::record_sync_tx(&tx, collection, &jsonl_path)?;

        tx.commit()?;
        Ok(true)
    }

    fn add_member(&mut self, set: &str, member: &str) -> Result<()> {
        self.db.execute(
            "INSERT OR IGNORE INTO set_members (set_name, member) VALUES (?1, ?2)",
            rusqlite::params![set, member],
        )?;
        Ok(())
    }

    fn remove_member(&mut self, set: &str, member: &str) -> Result<bool> {
        let removed = self.db.execute(
            "DELETE FROM set_members WHERE set_name = ?1 AND member = ?2",
            rusqlite::params![set, member],
        )?;
        Ok(removed > 0)
    }

    fn members(&self, set: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .db
            .prepare("SELECT member FROM set_members WHERE set_name = ?1 ORDER BY member")?;
        let rows = stmt.query_map([set], |row| row.get::<_, String>(0))?;

        let mut members = Vec::new();
        for row in rows {
            members.push(row?);
        }
        Ok(members)
    }

    fn range_search<T: Record>(&self, set: &str, filters: &[Filter]) -> Result<Option<Vec<T>>> {
        self.list(Some(set), filters).map(Some)
    }

    fn ping(&self) -> Result<()> {
        if !self.base_path.is_dir() {
            return Err(eyre!("Store directory missing: {:?}", self.base_path));
        }
        self.db
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("SQLite ping failed")?;
        Ok(())
    }
}

/// File modification time in whole seconds since the epoch
fn file_mtime(path: &Path) -> Result<i64> {
    let mtime = fs::metadata(path)?
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    Ok(mtime)
}
