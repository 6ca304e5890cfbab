//! Example 01: Basic Time Tracking
//!
//! This example records a few tasks, edits and deletes one, lists a date
//! range and prints the timesheet CSV for it.
//!
//! Run with: cargo run --example 01_basic_tracking

use chrono::NaiveDate;
use eyre::Result;
use timetrack::{NewTask, Store, TaskPatch, Tracker, TrackerConfig};

fn main() -> Result<()> {
    // Create a temporary directory for this example
    let temp_dir = tempfile::tempdir()?;
    let store_path = temp_dir.path().to_path_buf();

    println!("Timetrack Basic Tracking Example");
    println!("================================\n");
    println!("Store path: {}\n", store_path.display());

    let store = Store::open(&store_path)?;
    let mut tracker = Tracker::new(store, TrackerConfig::default())?;
    println!("Store opened successfully.\n");

    // CREATE: Record a day of work
    println!("1. CREATE - Recording tasks...");
    let standup = tracker.create(
        NewTask::new("Daily standup", "2024-06-03T09:00:00", "2024-06-03T09:15:00").with_tickets(["TEAM-1"]),
    )?;
    let review = tracker.create(
        NewTask::new("Code review", "2024-06-03T10:00:00", "2024-06-03T11:30:00").with_tickets(["PROJ-42", "PROJ-43"]),
    )?;
    let lunch = tracker.create(
        NewTask::new("Lunch and learn", "2024-06-03T12:00:00", "2024-06-03T13:00:00").with_tickets(["TEAM-7"]),
    )?;
    println!("   Created {}, {} and {}\n", standup, review, lunch);

    // READ: Look one up
    println!("2. READ - Retrieving the review...");
    if let Some(task) = tracker.get(&review)? {
        println!("   - Description: {}", task.description);
        println!("   - Tickets: {}", task.reference_tickets.join(", "));
        println!("   - Duration: {} hours", task.duration_hours());
    }
    println!();

    // UPDATE: The review ran long
    println!("3. UPDATE - Extending the review...");
    let patch = TaskPatch {
        end_time: Some("2024-06-03T12:00:00".into()),
        ..TaskPatch::default()
    };
    let updated = tracker.update(&review, patch)?;
    println!("   Updated: {}\n", updated);

    // DELETE: Lunch was not billable
    println!("4. DELETE - Removing lunch...");
    let deleted = tracker.delete(&lunch)?;
    println!("   Deleted: {}\n", deleted);

    // LIST: Everything on the day, by start time
    println!("5. LIST - Tasks on 2024-06-03...");
    let day = NaiveDate::from_ymd_opt(2024, 6, 3).ok_or_else(|| eyre::eyre!("Invalid date"))?;
    for task in tracker.list_in_range(day, day)? {
        println!("   - {} ({} hours)", task.description, task.duration_hours());
    }
    println!();

    // EXPORT: Timesheet for the day
    println!("6. EXPORT - Timesheet CSV...");
    print!("{}", tracker.export_csv(day, day)?);
    println!();

    println!("Example complete!");
    Ok(())
}
