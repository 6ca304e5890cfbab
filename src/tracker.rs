// Task store over a persistence backend

use crate::backend::Backend;
use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::error::TaskError;
use crate::export;
use crate::filter::Filter;
use crate::record::Record;
use crate::store::Store;
use crate::task::{LIVE_IDS, NewTask, START_TIME_FIELD, Task, TaskPatch};
use crate::timestamp::{self, TimeInput};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Log the backend failure and report it without detail
fn unavailable(operation: &'static str) -> impl FnOnce(eyre::Report) -> TaskError {
    move |err| {
        warn!(operation, error = ?err, "Backend operation failed");
        TaskError::Unavailable
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    Connected,
    Disconnected,
}

/// Result of a health check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: HealthStatus,
    pub backend: Connectivity,
}

impl Health {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Task store over a [`Backend`].
///
/// Documents are written before their live-id entry and removed before it,
/// so the only inconsistency a reader can observe is a live id without a
/// document, which listing skips.
pub struct Tracker<B: Backend> {
    backend: B,
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    range_index: bool,
}

impl<B: Backend> Tracker<B> {
    pub fn new(backend: B, config: TrackerConfig) -> Result<Self, TaskError> {
        Self::with_clock(backend, config, Arc::new(SystemClock))
    }

    /// Build a tracker, running the backend's one-time setup.
    ///
    /// Range index setup is best effort: on failure range queries scan.
    pub fn with_clock(mut backend: B, config: TrackerConfig, clock: Arc<dyn Clock>) -> Result<Self, TaskError> {
        backend.init::<Task>(LIVE_IDS).map_err(unavailable("init"))?;

        let range_index = match backend.ensure_range_index::<Task>(START_TIME_FIELD) {
            Ok(available) => available,
            Err(e) => {
                warn!(error = ?e, "Range index setup failed, range queries will scan");
                false
            }
        };

        debug!(range_index, ?config, "Tracker ready");

        Ok(Self {
            backend,
            config,
            clock,
            range_index,
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn normalize(&self, field: &'static str, input: &TimeInput) -> Result<i64, TaskError> {
        self.config
            .timestamp_policy
            .resolve(field, timestamp::normalize(input), || self.clock.now_ms())
    }

    fn check_order(&self, start: i64, end: i64) -> Result<(), TaskError> {
        if self.config.require_end_after_start && end < start {
            return Err(TaskError::EndBeforeStart { start, end });
        }
        Ok(())
    }

    /// Create a task, returning its new id
    pub fn create(&mut self, new: NewTask) -> Result<String, TaskError> {
        if new.description.trim().is_empty() {
            return Err(TaskError::EmptyDescription);
        }

        let reference_tickets = match new.reference_tickets {
            Some(tickets) if tickets.is_empty() => return Err(TaskError::EmptyReferenceTickets),
            Some(tickets) => tickets,
            None if self.config.require_reference_tickets => {
                return Err(TaskError::MissingField("reference_tickets"));
            }
            None => Vec::new(),
        };

        let start_time = self.normalize("start_time", &new.start_time)?;
        let end_time = self.normalize("end_time", &new.end_time)?;
        self.check_order(start_time, end_time)?;

        let now = self.clock.now_ms();
        let task = Task {
            id: Uuid::now_v7().to_string(),
            description: new.description,
            start_time,
            end_time,
            reference_tickets,
            created_at: now,
            updated_at: now,
        };

        self.backend.insert(&task).map_err(unavailable("create"))?;

        if let Err(e) = self.backend.add_member(LIVE_IDS, &task.id) {
            // Undo the document so it cannot linger outside the live-id index
            if let Err(cleanup) = self.backend.remove::<Task>(&task.id) {
                warn!(id = %task.id, error = ?cleanup, "Failed to remove unindexed task");
            }
            return Err(unavailable("create")(e));
        }

        info!(id = %task.id, start_time, end_time, "Created task");
        Ok(task.id)
    }

    /// Look up a task by id
    pub fn get(&self, id: &str) -> Result<Option<Task>, TaskError> {
        self.backend.fetch::<Task>(id).map_err(unavailable("get"))
    }

    /// Apply a partial update.
    ///
    /// Returns false when the task does not exist. `updated_at` moves forward
    /// on every successful call, even when the patch is empty.
    pub fn update(&mut self, id: &str, patch: TaskPatch) -> Result<bool, TaskError> {
        if patch.reference_tickets.as_ref().is_some_and(Vec::is_empty) {
            return Err(TaskError::EmptyReferenceTickets);
        }

        let start_time = patch
            .start_time
            .as_ref()
            .map(|input| self.normalize("start_time", input))
            .transpose()?;
        let end_time = patch
            .end_time
            .as_ref()
            .map(|input| self.normalize("end_time", input))
            .transpose()?;

        let Some(mut task) = self.get(id)? else {
            debug!(id, "Update target not found");
            return Ok(false);
        };

        if let Some(description) = patch.description {
            task.description = description;
        }
        if let Some(tickets) = patch.reference_tickets {
            task.reference_tickets = tickets;
        }
        if start_time.is_some() || end_time.is_some() {
            task.start_time = start_time.unwrap_or(task.start_time);
            task.end_time = end_time.unwrap_or(task.end_time);
            self.check_order(task.start_time, task.end_time)?;
        }

        task.updated_at = self.clock.now_ms().max(task.updated_at + 1);

        let replaced = self.backend.replace(&task).map_err(unavailable("update"))?;
        if replaced {
            info!(id, updated_at = task.updated_at, "Updated task");
        }
        Ok(replaced)
    }

    /// Delete a task; false when it did not exist
    pub fn delete(&mut self, id: &str) -> Result<bool, TaskError> {
        let existed = self.backend.remove::<Task>(id).map_err(unavailable("delete"))?;
        let indexed = self
            .backend
            .remove_member(LIVE_IDS, id)
            .map_err(unavailable("delete"))?;

        if existed {
            info!(id, "Deleted task");
        } else if indexed {
            warn!(id, "Removed live id that had no document");
        }
        Ok(existed)
    }

    /// Every live task, ascending by start time
    pub fn list_all(&self) -> Result<Vec<Task>, TaskError> {
        let ids = self.backend.members(LIVE_IDS).map_err(unavailable("list"))?;

        let mut tasks = Vec::with_capacity(ids.len());
        for id in &ids {
            match self.get(id)? {
                Some(task) => tasks.push(task),
                None => debug!(id, "Live id has no document, skipping"),
            }
        }

        sort_by_start(&mut tasks);
        Ok(tasks)
    }

    /// Tasks starting within `[start_date 00:00:00, end_date 23:59:59]` local time.
    ///
    /// Only `start_time` decides inclusion.
    pub fn list_in_range(&self, start_date: NaiveDate, end_date: NaiveDate) -> Result<Vec<Task>, TaskError> {
        let from = self.normalize("start_date", &TimeInput::Text(format!("{}T00:00:00", start_date)))?;
        let to = self.normalize("end_date", &TimeInput::Text(format!("{}T23:59:59", end_date)))?;
        let filters = Filter::int_between(START_TIME_FIELD, from, to);

        if self.range_index {
            match self.backend.range_search::<Task>(LIVE_IDS, &filters).map_err(unavailable("range"))? {
                Some(mut tasks) => {
                    sort_by_start(&mut tasks);
                    return Ok(tasks);
                }
                None => debug!("Backend has no range search, scanning"),
            }
        }

        let mut tasks = self.list_all()?;
        tasks.retain(|task| {
            let fields = task.indexed_fields();
            filters.iter().all(|filter| filter.matches(&fields))
        });
        Ok(tasks)
    }

    /// Timesheet CSV for tasks starting in the date range
    pub fn export_csv(&self, start_date: NaiveDate, end_date: NaiveDate) -> Result<String, TaskError> {
        let tasks = self.list_in_range(start_date, end_date)?;
        debug!(count = tasks.len(), %start_date, %end_date, "Exporting CSV");
        Ok(export::render_csv(&tasks))
    }

    pub fn health(&self) -> Health {
        match self.backend.ping() {
            Ok(()) => Health {
                status: HealthStatus::Healthy,
                backend: Connectivity::Connected,
            },
            Err(e) => {
                warn!(error = ?e, "Health check failed");
                Health {
                    status: HealthStatus::Unhealthy,
                    backend: Connectivity::Disconnected,
                }
            }
        }
    }
}

impl Tracker<Store> {
    /// Reload the store from its JSONL files and rebuild the live-id index
    pub fn resync(&mut self) -> Result<usize, TaskError> {
        let count = self.backend.sync().map_err(unavailable("sync"))?;
        self.backend.init::<Task>(LIVE_IDS).map_err(unavailable("sync"))?;
        Ok(count)
    }
}

// Stable, so equal start times keep backend (id) order
fn sort_by_start(tasks: &mut [Task]) {
    tasks.sort_by_key(|task| task.start_time);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SteppingClock;
    use crate::memory::MemoryBackend;
    use crate::timestamp::{TimestampPolicy, parse_iso8601};
    use std::fs;
    use std::thread;
    use tempfile::TempDir;

    const T0: i64 = 1_700_000_000_000;

    fn clock() -> Arc<dyn Clock> {
        Arc::new(SteppingClock::new(T0, 1000))
    }

    fn tracker_with(config: TrackerConfig) -> Tracker<MemoryBackend> {
        Tracker::with_clock(MemoryBackend::new(), config, clock()).unwrap()
    }

    fn tracker() -> Tracker<MemoryBackend> {
        tracker_with(TrackerConfig::default())
    }

    fn store_tracker(temp: &TempDir) -> Tracker<Store> {
        let store = Store::open(temp.path()).unwrap();
        Tracker::with_clock(store, TrackerConfig::default(), clock()).unwrap()
    }

    fn at(text: &str) -> i64 {
        parse_iso8601(text).unwrap()
    }

    fn date(text: &str) -> NaiveDate {
        text.parse().unwrap()
    }

    fn new_task(description: &str, start: &str, end: &str) -> NewTask {
        NewTask::new(description, start, end).with_tickets(["PROJ-1"])
    }

    fn descriptions(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.description.as_str()).collect()
    }

    // ------------------------------------------------------------------
    // create / get
    // ------------------------------------------------------------------

    #[test]
    fn test_create_and_get_round_trip() {
        let mut tracker = tracker();

        let id = tracker
            .create(new_task("Code review", "2024-06-15T09:00:00Z", "2024-06-15T11:00:00+02:00"))
            .unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        let task = tracker.get(&id).unwrap().unwrap();
        assert_eq!(task.id, id);
        assert_eq!(task.description, "Code review");
        assert_eq!(task.start_time, at("2024-06-15T09:00:00+00:00"));
        assert_eq!(task.end_time, at("2024-06-15T09:00:00Z"));
        assert_eq!(task.reference_tickets, vec!["PROJ-1"]);
        assert_eq!(task.created_at, T0);
        assert_eq!(task.updated_at, task.created_at);
    }

    #[test]
    fn test_create_accepts_numeric_times() {
        let mut tracker = tracker();

        let payload: NewTask = serde_json::from_str(
            r#"{"description":"Docs","start_time":1718442000000.9,"end_time":"1718445600000","reference_tickets":["DOC-1"]}"#,
        )
        .unwrap();
        let id = tracker.create(payload).unwrap();

        let task = tracker.get(&id).unwrap().unwrap();
        assert_eq!(task.start_time, 1_718_442_000_000);
        assert_eq!(task.end_time, 1_718_445_600_000);
        assert_eq!(task.duration_hours(), 1.0);
    }

    #[test]
    fn test_create_rejects_empty_reference_tickets() {
        let mut tracker = tracker();

        let result = tracker.create(NewTask::new("x", "2024-01-01T09:00:00", "2024-01-01T10:00:00").with_tickets(Vec::<String>::new()));
        assert_eq!(result, Err(TaskError::EmptyReferenceTickets));
        assert!(tracker.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_create_requires_reference_tickets_by_default() {
        let mut tracker = tracker();

        let result = tracker.create(NewTask::new("x", "2024-01-01T09:00:00", "2024-01-01T10:00:00"));
        assert_eq!(result, Err(TaskError::MissingField("reference_tickets")));
    }

    #[test]
    fn test_create_without_tickets_when_policy_relaxed() {
        let mut tracker = tracker_with(TrackerConfig {
            require_reference_tickets: false,
            ..TrackerConfig::default()
        });

        let id = tracker
            .create(NewTask::new("x", "2024-01-01T09:00:00", "2024-01-01T10:00:00"))
            .unwrap();
        assert!(tracker.get(&id).unwrap().unwrap().reference_tickets.is_empty());

        // An explicitly empty list is still rejected
        let result = tracker.create(NewTask::new("y", "2024-01-01T09:00:00", "2024-01-01T10:00:00").with_tickets(Vec::<String>::new()));
        assert_eq!(result, Err(TaskError::EmptyReferenceTickets));
    }

    #[test]
    fn test_create_rejects_blank_description() {
        let mut tracker = tracker();

        let result = tracker.create(new_task("   ", "2024-01-01T09:00:00", "2024-01-01T10:00:00"));
        assert_eq!(result, Err(TaskError::EmptyDescription));
    }

    #[test]
    fn test_lenient_policy_substitutes_current_time() {
        let mut tracker = tracker();

        let id = tracker
            .create(new_task("Planning", "whenever", "2024-01-01T10:00:00"))
            .unwrap();

        let task = tracker.get(&id).unwrap().unwrap();
        // First clock read goes to the invalid start time, the next to created_at
        assert_eq!(task.start_time, T0);
        assert_eq!(task.created_at, T0 + 1000);
        assert_eq!(task.end_time, at("2024-01-01T10:00:00"));
    }

    #[test]
    fn test_strict_policy_rejects_invalid_timestamp() {
        let mut tracker = tracker_with(TrackerConfig {
            timestamp_policy: TimestampPolicy::Strict,
            ..TrackerConfig::default()
        });

        let result = tracker.create(new_task("Planning", "2024-01-01T09:00:00", "later"));
        assert!(matches!(
            result,
            Err(TaskError::InvalidTimestamp { field: "end_time", .. })
        ));
        assert!(tracker.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_end_before_start_allowed_by_default() {
        let mut tracker = tracker();

        let id = tracker
            .create(new_task("Backwards", "2024-01-01T11:00:00", "2024-01-01T09:30:00"))
            .unwrap();
        assert_eq!(tracker.get(&id).unwrap().unwrap().duration_hours(), -1.5);
    }

    #[test]
    fn test_end_before_start_rejected_when_enforced() {
        let mut tracker = tracker_with(TrackerConfig {
            require_end_after_start: true,
            ..TrackerConfig::default()
        });

        let result = tracker.create(new_task("Backwards", "2024-01-01T11:00:00", "2024-01-01T09:30:00"));
        assert!(matches!(result, Err(TaskError::EndBeforeStart { .. })));
    }

    #[test]
    fn test_get_missing_is_none() {
        let tracker = tracker();
        assert_eq!(tracker.get("no-such-task").unwrap(), None);
    }

    #[test]
    fn test_duration_of_created_task() {
        let mut tracker = tracker();

        let id = tracker
            .create(new_task("Meeting", "2024-01-01T09:00:00", "2024-01-01T11:30:00"))
            .unwrap();
        assert_eq!(tracker.get(&id).unwrap().unwrap().duration_hours(), 2.5);
    }

    // ------------------------------------------------------------------
    // update / delete
    // ------------------------------------------------------------------

    #[test]
    fn test_update_changes_fields_and_keeps_identity() {
        let mut tracker = tracker();
        let id = tracker
            .create(new_task("Draft", "2024-01-01T09:00:00", "2024-01-01T10:00:00"))
            .unwrap();
        let before = tracker.get(&id).unwrap().unwrap();

        let patch = TaskPatch {
            description: Some("Final".to_string()),
            end_time: Some("2024-01-01T12:00:00".into()),
            reference_tickets: Some(vec!["FEAT-2".to_string(), "FEAT-3".to_string()]),
            ..TaskPatch::default()
        };
        assert!(tracker.update(&id, patch).unwrap());

        let after = tracker.get(&id).unwrap().unwrap();
        assert_eq!(after.id, before.id);
        assert_eq!(after.created_at, before.created_at);
        assert!(after.updated_at > before.updated_at);
        assert_eq!(after.description, "Final");
        assert_eq!(after.start_time, before.start_time);
        assert_eq!(after.end_time, at("2024-01-01T12:00:00"));
        assert_eq!(after.reference_tickets, vec!["FEAT-2", "FEAT-3"]);
        assert_eq!(after.duration_hours(), 3.0);
    }

    #[test]
    fn test_empty_update_still_touches_updated_at() {
        let mut tracker = tracker();
        let id = tracker
            .create(new_task("Idle", "2024-01-01T09:00:00", "2024-01-01T10:00:00"))
            .unwrap();

        let mut last = tracker.get(&id).unwrap().unwrap();
        for _ in 0..3 {
            assert!(tracker.update(&id, TaskPatch::default()).unwrap());
            let current = tracker.get(&id).unwrap().unwrap();
            assert!(current.updated_at > last.updated_at);
            assert_eq!(current.created_at, last.created_at);
            assert_eq!(current.description, last.description);
            last = current;
        }
    }

    #[test]
    fn test_update_missing_task_does_not_create() {
        let mut tracker = tracker();

        let patch = TaskPatch {
            description: Some("Ghost".to_string()),
            ..TaskPatch::default()
        };
        assert!(!tracker.update("missing", patch).unwrap());
        assert_eq!(tracker.get("missing").unwrap(), None);
        assert!(tracker.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_update_rejects_empty_reference_tickets() {
        let mut tracker = tracker();
        let id = tracker
            .create(new_task("Tickets", "2024-01-01T09:00:00", "2024-01-01T10:00:00"))
            .unwrap();

        let patch = TaskPatch {
            reference_tickets: Some(Vec::new()),
            ..TaskPatch::default()
        };
        assert_eq!(tracker.update(&id, patch), Err(TaskError::EmptyReferenceTickets));
        assert_eq!(tracker.get(&id).unwrap().unwrap().reference_tickets, vec!["PROJ-1"]);
    }

    #[test]
    fn test_update_enforces_order_on_time_changes() {
        let mut tracker = tracker_with(TrackerConfig {
            require_end_after_start: true,
            ..TrackerConfig::default()
        });
        let id = tracker
            .create(new_task("Ordered", "2024-01-01T09:00:00", "2024-01-01T10:00:00"))
            .unwrap();

        let patch = TaskPatch {
            start_time: Some("2024-01-01T11:00:00".into()),
            ..TaskPatch::default()
        };
        assert!(matches!(tracker.update(&id, patch), Err(TaskError::EndBeforeStart { .. })));
    }

    #[test]
    fn test_delete_twice() {
        let mut tracker = tracker();
        let id = tracker
            .create(new_task("Short-lived", "2024-01-01T09:00:00", "2024-01-01T10:00:00"))
            .unwrap();

        assert!(tracker.delete(&id).unwrap());
        assert!(!tracker.delete(&id).unwrap());
        assert_eq!(tracker.get(&id).unwrap(), None);
        assert!(tracker.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_delete_nonexistent_twice() {
        let mut tracker = tracker();
        assert!(!tracker.delete("never-existed").unwrap());
        assert!(!tracker.delete("never-existed").unwrap());
    }

    // ------------------------------------------------------------------
    // listing
    // ------------------------------------------------------------------

    #[test]
    fn test_list_all_orders_by_start_time() {
        let mut tracker = tracker();
        tracker.create(new_task("T3", "2024-01-03T09:00:00", "2024-01-03T10:00:00")).unwrap();
        tracker.create(new_task("T1", "2024-01-01T09:00:00", "2024-01-01T10:00:00")).unwrap();
        tracker.create(new_task("T2", "2024-01-02T09:00:00", "2024-01-02T10:00:00")).unwrap();

        assert_eq!(descriptions(&tracker.list_all().unwrap()), vec!["T1", "T2", "T3"]);
    }

    #[test]
    fn test_list_all_ties_keep_id_order() {
        let mut tracker = tracker();
        let same_start = at("2024-01-01T09:00:00");
        for id in ["b", "a", "c"] {
            let task = Task {
                id: id.to_string(),
                description: id.to_string(),
                start_time: same_start,
                end_time: same_start,
                reference_tickets: vec!["X-1".to_string()],
                created_at: 0,
                updated_at: 0,
            };
            tracker.backend_mut().insert(&task).unwrap();
            tracker.backend_mut().add_member(LIVE_IDS, id).unwrap();
        }

        assert_eq!(descriptions(&tracker.list_all().unwrap()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_list_all_skips_dangling_live_ids() {
        let mut tracker = tracker();
        tracker.create(new_task("Real", "2024-01-01T09:00:00", "2024-01-01T10:00:00")).unwrap();
        tracker.backend_mut().add_member(LIVE_IDS, "deleted-elsewhere").unwrap();

        assert_eq!(descriptions(&tracker.list_all().unwrap()), vec!["Real"]);
        assert!(!tracker.delete("deleted-elsewhere").unwrap());
        assert_eq!(tracker.backend().members(LIVE_IDS).unwrap().len(), 1);
    }

    #[test]
    fn test_list_reads_legacy_documents() {
        let mut tracker = tracker();
        tracker.backend_mut().insert_raw(
            "tasks",
            "legacy",
            r#"{"id":"legacy","description":"Old format","start_time":"2024-06-15T09:00:00","end_time":"2024-06-15T10:00:00","reference_tickets":["OLD-1"],"created_at":"2024-06-15T08:00:00","updated_at":"2024-06-15T08:00:00"}"#,
        );
        tracker.backend_mut().add_member(LIVE_IDS, "legacy").unwrap();

        let tasks = tracker.list_in_range(date("2024-06-15"), date("2024-06-15")).unwrap();
        assert_eq!(descriptions(&tasks), vec!["Old format"]);
        assert_eq!(tasks[0].start_time, at("2024-06-15T09:00:00"));
    }

    fn seed_range_fixture<B: Backend>(tracker: &mut Tracker<B>) {
        for (description, start, end) in [
            ("late on 15th", "2024-06-15T23:59:59", "2024-06-16T01:00:00"),
            ("just after", "2024-06-16T00:00:01", "2024-06-16T01:00:00"),
            ("midnight 15th", "2024-06-15T00:00:00", "2024-06-15T01:00:00"),
            ("day before", "2024-06-14T23:59:59", "2024-06-15T12:00:00"),
            ("spans days", "2024-06-15T12:00:00", "2024-06-17T12:00:00"),
        ] {
            tracker.create(new_task(description, start, end)).unwrap();
        }
    }

    #[test]
    fn test_range_inclusion_boundaries() {
        let mut tracker = tracker();
        seed_range_fixture(&mut tracker);

        let tasks = tracker.list_in_range(date("2024-06-15"), date("2024-06-15")).unwrap();
        assert_eq!(
            descriptions(&tasks),
            vec!["midnight 15th", "spans days", "late on 15th"]
        );

        let tasks = tracker.list_in_range(date("2024-06-14"), date("2024-06-16")).unwrap();
        assert_eq!(tasks.len(), 5);

        let tasks = tracker.list_in_range(date("2024-06-16"), date("2024-06-15")).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_index_and_scan_agree() {
        let temp = TempDir::new().unwrap();
        let mut indexed = store_tracker(&temp);
        let mut scanned = tracker();
        assert!(indexed.range_index);
        assert!(!scanned.range_index);

        seed_range_fixture(&mut indexed);
        seed_range_fixture(&mut scanned);

        for (from, to) in [
            ("2024-06-15", "2024-06-15"),
            ("2024-06-14", "2024-06-14"),
            ("2024-06-16", "2024-06-17"),
            ("2024-01-01", "2024-12-31"),
        ] {
            let a = indexed.list_in_range(date(from), date(to)).unwrap();
            let b = scanned.list_in_range(date(from), date(to)).unwrap();
            assert_eq!(descriptions(&a), descriptions(&b), "range {}..{}", from, to);
        }
    }

    #[test]
    fn test_index_and_scan_skip_documents_outside_live_ids() {
        let temp = TempDir::new().unwrap();
        let mut indexed = store_tracker(&temp);
        let mut scanned = tracker();

        let orphan = Task {
            id: "orphan".to_string(),
            description: "Half-created".to_string(),
            start_time: at("2024-06-15T10:00:00"),
            end_time: at("2024-06-15T11:00:00"),
            reference_tickets: vec!["X-1".to_string()],
            created_at: 0,
            updated_at: 0,
        };
        indexed.backend_mut().insert(&orphan).unwrap();
        scanned.backend_mut().insert(&orphan).unwrap();
        seed_range_fixture(&mut indexed);
        seed_range_fixture(&mut scanned);

        let a = indexed.list_in_range(date("2024-06-15"), date("2024-06-15")).unwrap();
        let b = scanned.list_in_range(date("2024-06-15"), date("2024-06-15")).unwrap();
        assert_eq!(descriptions(&a), vec!["midnight 15th", "spans days", "late on 15th"]);
        assert_eq!(descriptions(&a), descriptions(&b));
    }

    // ------------------------------------------------------------------
    // export / health
    // ------------------------------------------------------------------

    #[test]
    fn test_export_csv_totals() {
        let mut tracker = tracker();
        tracker.create(new_task("One hour", "2024-05-01T09:00:00", "2024-05-01T10:00:00")).unwrap();
        tracker.create(new_task("Two and a quarter", "2024-05-02T13:00:00", "2024-05-02T15:15:00")).unwrap();
        tracker.create(new_task("Outside", "2024-05-09T13:00:00", "2024-05-09T15:15:00")).unwrap();

        let csv = tracker.export_csv(date("2024-05-01"), date("2024-05-02")).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[1], "2024-05-01,One hour,PROJ-1,09:00,10:00,1.0");
        assert_eq!(lines[2], "2024-05-02,Two and a quarter,PROJ-1,13:00,15:15,2.25");
        assert_eq!(lines[3], "");
        assert_eq!(lines[4], ",,,,Total Hours,3.25");
    }

    #[test]
    fn test_backend_failure_fails_closed() {
        let mut tracker = tracker();
        let id = tracker
            .create(new_task("Before outage", "2024-01-01T09:00:00", "2024-01-01T10:00:00"))
            .unwrap();
        assert!(tracker.health().is_healthy());

        tracker.backend_mut().set_offline(true);

        let health = tracker.health();
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.backend, Connectivity::Disconnected);
        assert_eq!(tracker.get(&id), Err(TaskError::Unavailable));
        assert_eq!(tracker.list_all(), Err(TaskError::Unavailable));
        assert_eq!(tracker.delete(&id), Err(TaskError::Unavailable));
        assert_eq!(
            tracker.create(new_task("During outage", "2024-01-01T09:00:00", "2024-01-01T10:00:00")),
            Err(TaskError::Unavailable)
        );

        // Validation still wins over backend state
        assert_eq!(
            tracker.create(new_task("", "2024-01-01T09:00:00", "2024-01-01T10:00:00")),
            Err(TaskError::EmptyDescription)
        );

        tracker.backend_mut().set_offline(false);
        assert!(tracker.get(&id).unwrap().is_some());
    }

    #[test]
    fn test_health_serialization() {
        let tracker = tracker();
        let json = serde_json::to_string(&tracker.health()).unwrap();
        assert_eq!(json, r#"{"status":"healthy","backend":"connected"}"#);
    }

    // ------------------------------------------------------------------
    // SQLite store
    // ------------------------------------------------------------------

    #[test]
    fn test_store_backed_lifecycle_and_resync() {
        let temp = TempDir::new().unwrap();
        let (kept, updated) = {
            let mut tracker = store_tracker(&temp);
            let kept = tracker
                .create(new_task("Kept", "2024-02-01T09:00:00", "2024-02-01T10:00:00"))
                .unwrap();
            let updated = tracker
                .create(new_task("Before", "2024-02-02T09:00:00", "2024-02-02T10:00:00"))
                .unwrap();
            let dropped = tracker
                .create(new_task("Dropped", "2024-02-03T09:00:00", "2024-02-03T10:00:00"))
                .unwrap();

            let patch = TaskPatch {
                description: Some("After".to_string()),
                ..TaskPatch::default()
            };
            assert!(tracker.update(&updated, patch).unwrap());
            assert!(tracker.delete(&dropped).unwrap());
            (kept, updated)
        };

        fs::remove_file(temp.path().join(".timetrack/timetrack.db")).unwrap();

        let mut tracker = store_tracker(&temp);
        assert_eq!(descriptions(&tracker.list_all().unwrap()), vec!["Kept", "After"]);
        assert!(tracker.get(&kept).unwrap().is_some());

        let tasks = tracker.list_in_range(date("2024-02-02"), date("2024-02-03")).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, updated);

        assert_eq!(tracker.resync().unwrap(), 2);
        assert_eq!(tracker.list_all().unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_creates_stay_consistent() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().to_path_buf();
        // Create the store once so the schema exists before the threads race
        drop(Store::open(&root).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let root = root.clone();
                thread::spawn(move || {
                    let store = Store::open(&root).unwrap();
                    let mut tracker = Tracker::new(store, TrackerConfig::default()).unwrap();
                    for i in 0..5 {
                        let start = format!("2024-04-{:02}T09:00:00", worker * 5 + i + 1);
                        tracker
                            .create(new_task(&format!("w{}-{}", worker, i), &start, &start))
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let tracker = store_tracker(&temp);
        let tasks = tracker.list_all().unwrap();
        assert_eq!(tasks.len(), 20);
        assert!(tasks.windows(2).all(|w| w[0].start_time <= w[1].start_time));
        assert_eq!(tracker.backend().members(LIVE_IDS).unwrap().len(), 20);
    }
}
