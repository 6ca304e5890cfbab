// Persistence backend primitives

use crate::filter::Filter;
use crate::record::Record;
use eyre::Result;

/// Document storage plus named sets of members.
///
/// Documents are keyed by `(T::collection_name(), id)`. Range search over
/// indexed fields is optional: a backend that returns `None` from
/// [`Backend::range_search`] is scanned instead.
pub trait Backend {
    /// Idempotent setup run once per handle before any other call
    fn init<T: Record>(&mut self, _set: &str) -> Result<()> {
        Ok(())
    }

    /// Prepare numeric range search on an indexed field.
    ///
    /// Returns whether [`Backend::range_search`] can be used for it.
    fn ensure_range_index<T: Record>(&mut self, _field: &str) -> Result<bool> {
        Ok(false)
    }

    /// Store a new document
    fn insert<T: Record>(&mut self, record: &T) -> Result<()>;

    /// Fetch a document by id
    fn fetch<T: Record>(&self, id: &str) -> Result<Option<T>>;

    /// Overwrite an existing document; never creates one.
    ///
    /// Returns false when no document with that id exists.
    fn replace<T: Record>(&mut self, record: &T) -> Result<bool>;

    /// Delete a document, returning whether it existed
    fn remove<T: Record>(&mut self, id: &str) -> Result<bool>;

    /// Add a member to a set
    fn add_member(&mut self, set: &str, member: &str) -> Result<()>;

    /// Remove a member from a set, returning whether it was present
    fn remove_member(&mut self, set: &str, member: &str) -> Result<bool>;

    /// All members of a set, in ascending order
    fn members(&self, set: &str) -> Result<Vec<String>>;

    /// Documents that are members of `set` and match every filter, in ascending id order
    fn range_search<T: Record>(&self, _set: &str, _filters: &[Filter]) -> Result<Option<Vec<T>>> {
        Ok(None)
    }

    /// Check the backend is reachable
    fn ping(&self) -> Result<()>;
}
