//! Colored status lines for the command-line front end.

use std::io::{self, Write};

use chrono::Utc;
use owo_colors::OwoColorize;

use crate::monitor::{MonitorSnapshot, StartReport, StopOutcome, StreamFailure};
use crate::sink::RunInfo;

/// Get current timestamp in the same format as tracing.
fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

/// Maximum length for truncated error messages.
const DEFAULT_MAX_LEN: usize = 120;

/// Truncate a string to a maximum length, adding ellipsis if truncated.
#[must_use]
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{head}...")
    }
}

/// One-line summary of a snapshot's cursors.
#[must_use]
pub fn format_snapshot(snapshot: &MonitorSnapshot) -> String {
    let b = &snapshot.bookmarks;
    let step = b
        .last_trajectory_step()
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    format!(
        "cycle={} step={} colvar_rows={} hills={}",
        snapshot.cycles,
        step,
        b.last_timeseries_row(),
        b.last_deposition_count()
    )
}

/// Print the tracking run a monitor reports into.
pub fn print_run(run: &RunInfo) {
    println!(
        "{} {} project={}, name={}, id={}",
        timestamp().dimmed(),
        "[RUN]".blue().bold(),
        run.project.cyan(),
        run.name,
        run.run_id.dimmed()
    );
    if let Some(url) = &run.url {
        println!("{} {} {}", timestamp().dimmed(), "[RUN]".blue().bold(), url.underline());
    }
    let _ = io::stdout().flush();
}

/// Print the files a new monitor watches.
pub fn print_started(report: &StartReport) {
    let ts = timestamp();
    println!(
        "{} {} polling every {}s",
        ts.dimmed(),
        "[MONITOR]".green().bold(),
        report.poll_interval_s
    );
    for path in &report.monitored_paths {
        println!("{} {}   {}", ts.dimmed(), "[MONITOR]".green().bold(), path.display());
    }
    let _ = io::stdout().flush();
}

/// Print a completed poll cycle.
pub fn print_cycle(snapshot: &MonitorSnapshot) {
    println!(
        "{} {} {}",
        timestamp().dimmed(),
        "[POLL]".cyan().bold(),
        format_snapshot(snapshot)
    );
    for failure in &snapshot.last_failures {
        print_failure(failure);
    }
    let _ = io::stdout().flush();
}

/// Print a stream that failed during a cycle.
pub fn print_failure(failure: &StreamFailure) {
    println!(
        "{} {} {} - {}",
        timestamp().dimmed(),
        "[STREAM]".yellow().bold(),
        failure.stream,
        truncate(&failure.error, DEFAULT_MAX_LEN).dimmed()
    );
}

/// Print the outcome of a stop request.
pub fn print_stopped(outcome: StopOutcome) {
    let ts = timestamp();
    match outcome {
        StopOutcome::Stopped { flushed: true } => println!(
            "{} {} stopped after final flush",
            ts.dimmed(),
            "[MONITOR]".green().bold()
        ),
        StopOutcome::Stopped { flushed: false } => println!(
            "{} {} stopped {}",
            ts.dimmed(),
            "[MONITOR]".yellow().bold(),
            "(no final flush)".dimmed()
        ),
        StopOutcome::NotRunning => println!(
            "{} {} not running",
            ts.dimmed(),
            "[MONITOR]".yellow().bold()
        ),
    }
    let _ = io::stdout().flush();
}

/// Print a section heading for `inspect` output.
pub fn print_section(title: &str, path: &std::path::Path) {
    println!("{} {}", format!("[{title}]").magenta().bold(), path.display().dimmed());
}

/// Print an error message.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "[ERROR]".red().bold(), message);
    let _ = io::stderr().flush();
}
