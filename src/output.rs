//! User-facing output utilities for clean, colored terminal messages
//!
//! Status messages go to stderr so that stdout only carries the aggregate
//! document (or JSON) and can be piped.

use owo_colors::OwoColorize;
use std::io::IsTerminal;

use crate::aggregate::{CONTENT_OFFSET, FILE_HEADER_MARKER, LINE_NUMBER_WIDTH, MATCH_PREFIX};
use crate::incremental::{DeltaResult, FileDelta};
use crate::tracker::{ApplyReport, ChangeSet};

/// Display a warning message to the user in yellow with padding
///
/// # Example
/// ```ignore
/// output::warn("Result limit reached; narrow the query or raise --max-results.");
/// ```
pub fn warn(message: &str) {
    eprintln!("\n{}\n", message.yellow());
}

/// Display an error message to the user in red with padding
pub fn error(message: &str) {
    eprintln!("\n{}\n", message.red());
}

/// Display an informational message to the user in default color with padding
pub fn info(message: &str) {
    eprintln!("\n{}\n", message);
}

pub fn success(message: &str) {
    eprintln!("\n{}\n", message.green());
}

fn use_color() -> bool {
    std::io::stdout().is_terminal()
}

/// Render an aggregate document, highlighting headers and match lines
pub fn render_aggregate(content: &str, color: bool) -> String {
    if !color {
        return content.to_string();
    }

    let mut out = String::with_capacity(content.len() * 2);
    for (idx, line) in content.lines().enumerate() {
        let rendered = if idx == 0 {
            line.bold().to_string()
        } else if line.starts_with(FILE_HEADER_MARKER) {
            line.cyan().bold().to_string()
        } else if line.len() >= CONTENT_OFFSET && line.is_char_boundary(CONTENT_OFFSET) {
            let (number, rest) = line.split_at(LINE_NUMBER_WIDTH);
            let text = &line[CONTENT_OFFSET..];
            if rest[1..].starts_with(MATCH_PREFIX) {
                format!("{}{}{}", number.dimmed(), " > ".yellow(), text)
            } else {
                format!("{}   {}", number.dimmed(), text.dimmed())
            }
        } else {
            line.to_string()
        };
        out.push_str(&rendered);
        out.push('\n');
    }
    out
}

pub fn print_aggregate(content: &str) {
    print!("{}", render_aggregate(content, use_color()));
}

/// Print a change set as `- old` / `+ new` pairs
pub fn print_changes(changes: &ChangeSet) {
    let color = use_color();
    for line in changes.preview().lines() {
        if !color {
            println!("{}", line);
        } else if line.starts_with("--- ") {
            println!("{}", line.bold());
        } else if line.starts_with("- ") {
            println!("{}", line.red());
        } else if line.starts_with("+ ") {
            println!("{}", line.green());
        } else {
            println!("{}", line.cyan());
        }
    }
}

/// Summarize a commit, including every failed or skipped file
pub fn print_apply_report(report: &ApplyReport) {
    if report.is_complete() {
        success(&report.summary());
        return;
    }

    for failure in &report.failed {
        error(&format!("✗ {}: {}", failure.path.display(), failure.message));
    }
    if report.cancelled {
        warn(&format!(
            "Partial application: {}. Files already written stay written.",
            report.summary()
        ));
        for path in &report.not_attempted {
            eprintln!("  not attempted: {}", path.display());
        }
    } else {
        warn(&report.summary());
    }
}

/// Print the files whose results changed since the previous refresh
pub fn print_deltas(delta: &DeltaResult) {
    for (path, kind) in delta.changed() {
        let marker = match kind {
            FileDelta::Added => "+".green().to_string(),
            FileDelta::Modified => "~".yellow().to_string(),
            FileDelta::Removed => "-".red().to_string(),
            FileDelta::Unchanged => " ".to_string(),
        };
        println!("{} {} ({})", marker, path.display(), kind);
    }
    eprintln!(
        "{} added, {} modified, {} removed, {} unchanged ({} match(es))",
        delta.count(FileDelta::Added),
        delta.count(FileDelta::Modified),
        delta.count(FileDelta::Removed),
        delta.count(FileDelta::Unchanged),
        delta.match_count
    );
}
