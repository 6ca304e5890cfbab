use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Context, Result, eyre};
use std::fs;
use std::path::PathBuf;
use timetrack::timestamp::to_local;
use timetrack::{Config, Created, NewTask, Store, Task, TaskPatch, TimeInput, Tracker};

#[derive(Parser)]
#[command(name = "timetrack")]
#[command(about = "Timetrack CLI - personal time tracking with SQLite+JSONL persistence")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Directory holding the store (default: from config, then the platform data dir)
    #[arg(short, long)]
    store_path: Option<PathBuf>,

    /// Config file (default: $TIMETRACK_CONFIG, then the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a task
    Add {
        description: String,

        /// Start time, ISO-8601 or epoch milliseconds
        #[arg(long)]
        start: String,

        /// End time, ISO-8601 or epoch milliseconds
        #[arg(long)]
        end: String,

        /// Reference ticket (repeatable)
        #[arg(short, long = "ticket")]
        tickets: Vec<String>,
    },

    /// Print a task as JSON
    Show { id: String },

    /// Change fields of a task
    Edit {
        id: String,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        /// Replace all reference tickets
        #[arg(short, long = "tickets", num_args = 1..)]
        tickets: Option<Vec<String>>,
    },

    /// Delete a task
    Delete { id: String },

    /// List tasks ordered by start time
    List {
        #[arg(long, requires = "to")]
        from: Option<NaiveDate>,

        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Export a timesheet CSV for a date range
    Export {
        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check that the store is reachable
    Health,

    /// Rebuild the SQLite database from JSONL files
    Sync,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.store_path.is_some() {
        config.store_path = cli.store_path;
    }

    let store_root = config.store_root();
    let store = Store::open(&store_root).with_context(|| format!("Failed to open store at {}", store_root.display()))?;
    let mut tracker = Tracker::new(store, config.tracker)?;

    match cli.command {
        Commands::Add {
            description,
            start,
            end,
            tickets,
        } => {
            let mut new = NewTask::new(&description, start, end);
            if !tickets.is_empty() {
                new = new.with_tickets(tickets);
            }
            let task_id = tracker.create(new)?;
            println!("{}", serde_json::to_string_pretty(&Created { task_id })?);
        }
        Commands::Show { id } => {
            let task = tracker.get(&id)?.ok_or_else(|| not_found(&id))?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Commands::Edit {
            id,
            description,
            start,
            end,
            tickets,
        } => {
            let patch = TaskPatch {
                description,
                start_time: start.map(TimeInput::from),
                end_time: end.map(TimeInput::from),
                reference_tickets: tickets,
            };
            if !tracker.update(&id, patch)? {
                return Err(not_found(&id));
            }
            println!("Updated {}", id);
        }
        Commands::Delete { id } => {
            if !tracker.delete(&id)? {
                return Err(not_found(&id));
            }
            println!("Deleted {}", id);
        }
        Commands::List { from, to, json } => {
            let tasks = match (from, to) {
                (Some(from), Some(to)) => tracker.list_in_range(from, to)?,
                _ => tracker.list_all()?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                print_table(&tasks);
            }
        }
        Commands::Export { from, to, output } => {
            let csv = tracker.export_csv(from, to)?;
            match output {
                Some(path) => {
                    fs::write(&path, csv).with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Exported to {}", path.display());
                }
                None => print!("{}", csv),
            }
        }
        Commands::Health => {
            let health = tracker.health();
            let json = serde_json::to_string(&health)?;
            if health.is_healthy() {
                println!("{}", json.green());
            } else {
                println!("{}", json.red());
                return Err(eyre!("Store is unhealthy"));
            }
        }
        Commands::Sync => {
            println!("Syncing database from JSONL files...");
            let count = tracker.resync()?;
            println!("Sync complete: {} records", count);
        }
    }

    Ok(())
}

fn not_found(id: &str) -> eyre::Report {
    eyre!("Task not found: {}", id)
}

fn print_table(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("{}", "No tasks".dimmed());
        return;
    }

    println!(
        "{:<36}  {:<16}  {:>6}  {}",
        "ID".bold(),
        "Start".bold(),
        "Hours".bold(),
        "Description".bold()
    );

    let mut total = 0.0;
    for task in tasks {
        let hours = task.duration_hours();
        total += hours;

        let start = to_local(task.start_time)
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let tickets = if task.reference_tickets.is_empty() {
            String::new()
        } else {
            format!(" [{}]", task.reference_tickets.join(", "))
        };

        println!(
            "{:<36}  {:<16}  {:>6.2}  {}{}",
            task.id.dimmed(),
            start,
            hours,
            task.description,
            tickets.cyan()
        );
    }

    println!("{:<36}  {:<16}  {:>6.2}", "", "Total".bold(), total);
}
