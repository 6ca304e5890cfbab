// Timesheet CSV rendering

use crate::task::{Task, round2};
use crate::timestamp::to_local;

const HEADER: [&str; 6] = [
    "Date",
    "Description",
    "Reference Tickets",
    "Start Time",
    "End Time",
    "Duration (hours)",
];
const TICKET_SEPARATOR: &str = ", ";
const LINE_END: &str = "\r\n";

/// Render tasks as a timesheet.
///
/// Dates and clock times are local to the running process. The end column
/// shows only `HH:MM`, so a task ending on a later day is not marked as such.
/// The closing total is the sum of the already-rounded row durations.
pub fn render_csv(tasks: &[Task]) -> String {
    let mut out = String::new();
    write_row(&mut out, &HEADER);

    let mut total_hours = 0.0;
    for task in tasks {
        let hours = task.duration_hours();
        total_hours += hours;

        let row = [
            local_format(task.start_time, "%Y-%m-%d"),
            task.description.clone(),
            task.reference_tickets.join(TICKET_SEPARATOR),
            local_format(task.start_time, "%H:%M"),
            local_format(task.end_time, "%H:%M"),
            format_hours(hours),
        ];
        write_row(&mut out, &row);
    }

    // Summing rounded rows can leave float noise such as 0.30000000000000004
    let total = format_hours(round2(total_hours));
    write_row(&mut out, &[""; 0]);
    write_row(&mut out, &["", "", "", "", "Total Hours", total.as_str()]);
    out
}

fn local_format(ms: i64, format: &str) -> String {
    to_local(ms).map(|dt| dt.format(format).to_string()).unwrap_or_default()
}

/// Hours with at least one decimal place: `1.0`, `2.25`
pub fn format_hours(hours: f64) -> String {
    if hours.is_finite() && hours.fract() == 0.0 {
        format!("{:.1}", hours)
    } else {
        format!("{}", hours)
    }
}

fn write_row<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let line: Vec<String> = fields.iter().map(|f| escape_field(f.as_ref())).collect();
    out.push_str(&line.join(","));
    out.push_str(LINE_END);
}

/// Quote a field when it contains a delimiter, quote or line break (RFC 4180)
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
