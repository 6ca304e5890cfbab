// Timetrack - personal time tracking with SQLite+JSONL persistence

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod jsonl;
pub mod memory;
pub mod record;
pub mod store;
pub mod task;
pub mod timestamp;
pub mod tracker;

// Re-export main types for convenience
pub use backend::Backend;
pub use clock::{Clock, SteppingClock, SystemClock, now_ms};
pub use config::{Config, TrackerConfig};
pub use error::TaskError;
pub use filter::{Filter, FilterOp};
pub use memory::MemoryBackend;
pub use record::{IndexValue, Record};
pub use store::Store;
pub use task::{Created, LIVE_IDS, NewTask, Task, TaskPatch};
pub use timestamp::{Normalized, TimeInput, TimestampPolicy};
pub use tracker::{Connectivity, Health, HealthStatus, Tracker};
