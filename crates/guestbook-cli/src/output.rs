//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)
//!
//! Feed events are printed one per line in JSON mode so the output can be
//! piped while the feed is still running.

use guestbook_core::{ChangeEvent, DbUpdate, Sequence};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print the list of visitor names
    pub fn print_visitors(&self, names: &[String]) {
        match self.format {
            OutputFormat::Human => {
                if names.is_empty() {
                    println!("No visitors yet.");
                    return;
                }
                for name in names {
                    println!("{}", name);
                }
                println!("\n{} visitor(s)", names.len());
            }
            OutputFormat::Json => {
                println!("{}", serde_json::json!(names));
            }
            OutputFormat::Quiet => {
                for name in names {
                    println!("{}", name);
                }
            }
        }
    }

    /// Print one change from a `_changes` feed
    pub fn print_change(&self, event: &ChangeEvent) {
        match self.format {
            OutputFormat::Human => println!("{}", format_change(event)),
            OutputFormat::Json => match serde_json::to_string(event) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!(error = %e, id = %event.id, "couldn't encode change"),
            },
            OutputFormat::Quiet => println!("{}", event.id),
        }
    }

    /// Print one event from the `_db_updates` feed
    pub fn print_db_update(&self, update: &DbUpdate) {
        match self.format {
            OutputFormat::Human => println!("{:<8} {}", update.kind, update.db_name),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({
                        "db_name": update.db_name,
                        "type": update.kind,
                        "ok": update.ok
                    })
                );
            }
            OutputFormat::Quiet => println!("{}", update.db_name),
        }
    }

    /// Print the sequence a finished feed ended at
    pub fn print_last_seq(&self, last_seq: Option<&Sequence>) {
        let Some(seq) = last_seq else {
            return;
        };
        match self.format {
            OutputFormat::Human => println!("\nLast sequence: {}", seq),
            OutputFormat::Json => println!("{}", serde_json::json!({ "last_seq": seq })),
            OutputFormat::Quiet => {}
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

/// One-line summary of a change: sequence, id, revisions
fn format_change(event: &ChangeEvent) -> String {
    let seq = event
        .seq
        .as_ref()
        .map(|s| truncate(&s.to_string(), 12))
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!("{:<12} {}", seq, event.id);
    if !event.revisions.is_empty() {
        line.push_str(&format!(" [{}]", event.revisions.join(", ")));
    }
    if event.deleted {
        line.push_str(" (deleted)");
    }
    line
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
