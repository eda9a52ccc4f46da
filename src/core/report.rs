//! Run summaries: the stderr lines people read and the JSON machines read.

use owo_colors::OwoColorize;
use serde::Serialize;

use crate::cli::AppContext;
use crate::core::merge_cmd::Outcome;

/// Per-file merge counts for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    /// Replaced file, or `None` when the merge went to stdout.
    pub file: Option<String>,
    pub conflicts: usize,
    pub wiggles: usize,
    pub ignored: usize,
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

impl FileReport {
    pub fn new(file: Option<String>, outcome: &Outcome) -> Self {
        Self {
            file,
            conflicts: outcome.conflicts,
            wiggles: outcome.wiggles,
            ignored: outcome.ignored,
        }
    }

    /// The traditional stderr summary.
    pub fn print_summary(&self, show_wiggles: bool, ctx: &AppContext) {
        if ctx.quiet {
            return;
        }
        let prefix = match &self.file {
            Some(name) => format!("{name}: "),
            None => String::new(),
        };
        if self.conflicts > 0 {
            let msg = format!(
                "{prefix}{} unresolved conflict{} found",
                self.conflicts,
                plural(self.conflicts)
            );
            if ctx.no_color {
                eprintln!("{msg}");
            } else {
                eprintln!("{}", msg.red());
            }
        }
        if self.ignored > 0 {
            let msg = format!(
                "{prefix}{} already-applied change{} ignored",
                self.ignored,
                plural(self.ignored)
            );
            if ctx.no_color {
                eprintln!("{msg}");
            } else {
                eprintln!("{}", msg.yellow());
            }
        }
        if show_wiggles && self.wiggles > 0 {
            let msg = format!(
                "{prefix}{} change{} wiggled in",
                self.wiggles,
                plural(self.wiggles)
            );
            if ctx.no_color {
                eprintln!("{msg}");
            } else {
                eprintln!("{}", msg.cyan());
            }
        }
    }
}

/// Single-line JSON summary of a whole run, for scripts.
pub fn print_json(reports: &[FileReport], exit_status: i32) -> anyhow::Result<()> {
    let total_conflicts: usize = reports.iter().map(|r| r.conflicts).sum();
    let total_wiggles: usize = reports.iter().map(|r| r.wiggles).sum();
    let total_ignored: usize = reports.iter().map(|r| r.ignored).sum();
    let output = serde_json::json!({
        "schema_version": "1",
        "conflicts": total_conflicts,
        "wiggles": total_wiggles,
        "ignored": total_ignored,
        "exit_status": exit_status,
        "files": reports,
    });
    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_serialises_counts() {
        let outcome = Outcome { conflicts: 2, wiggles: 1, ignored: 0 };
        let report = FileReport::new(Some("f.c".into()), &outcome);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["conflicts"], 2);
        assert_eq!(json["wiggles"], 1);
        assert_eq!(json["file"], "f.c");
    }
}
