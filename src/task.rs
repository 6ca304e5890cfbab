// Task document and write payloads

use crate::record::{IndexValue, Record};
use crate::timestamp::{TimeInput, deserialize_millis};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Collection holding task documents
pub const TASKS_COLLECTION: &str = "tasks";

/// Set of live task ids
pub const LIVE_IDS: &str = "task_ids";

/// Indexed field used for date-range queries
pub const START_TIME_FIELD: &str = "start_time";

const MS_PER_HOUR: f64 = 3_600_000.0;

/// One time-tracked work item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(deserialize_with = "deserialize_millis")]
    pub start_time: i64,
    #[serde(deserialize_with = "deserialize_millis")]
    pub end_time: i64,
    #[serde(default)]
    pub reference_tickets: Vec<String>,
    #[serde(deserialize_with = "deserialize_millis")]
    pub created_at: i64,
    #[serde(deserialize_with = "deserialize_millis")]
    pub updated_at: i64,
}

impl Task {
    /// Hours between start and end, rounded to two decimals.
    ///
    /// Negative when the task ends before it starts.
    pub fn duration_hours(&self) -> f64 {
        match self.end_time.checked_sub(self.start_time) {
            Some(ms) => round2(ms as f64 / MS_PER_HOUR),
            None => 0.0,
        }
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl Record for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn updated_at(&self) -> i64 {
        self.updated_at
    }

    fn collection_name() -> &'static str {
        TASKS_COLLECTION
    }

    fn indexed_fields(&self) -> HashMap<String, IndexValue> {
        let mut fields = HashMap::new();
        fields.insert(START_TIME_FIELD.to_string(), IndexValue::Int(self.start_time));
        fields
    }
}

/// Payload for creating a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub description: String,
    pub start_time: TimeInput,
    pub end_time: TimeInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_tickets: Option<Vec<String>>,
}

impl NewTask {
    pub fn new(description: &str, start_time: impl Into<TimeInput>, end_time: impl Into<TimeInput>) -> Self {
        Self {
            description: description.to_string(),
            start_time: start_time.into(),
            end_time: end_time.into(),
            reference_tickets: None,
        }
    }

    pub fn with_tickets<I, S>(mut self, tickets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reference_tickets = Some(tickets.into_iter().map(Into::into).collect());
        self
    }
}

/// Partial update; absent fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<TimeInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<TimeInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_tickets: Option<Vec<String>>,
}

/// Response body for a created task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Created {
    pub task_id: String,
}
