//! Command-line interface.
//!
//! The surface follows the traditional tool: a mode flag selects what to
//! do, `-w`/`-l` pick the comparison granularity, and `-1`/`-2`/`-3`
//! select a stream for extraction or patch-side diffs.

use std::path::PathBuf;

use clap::Parser;
use clap_complete::Shell;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // --quiet
    pub verbose: u8,    // repeated --verbose
    pub no_color: bool, // --no-color
}

#[derive(Parser)]
#[command(name = "wiggle")]
#[command(about = "Apply rejected patches: best-effort hunk placement and word-wise merging")]
#[command(version, long_about = None)]
#[command(after_help = "\
With --merge (the default), one FILE is a merge file, two are a file and a\n\
patch, and three are original, before and after. Exit status is 0 on a\n\
clean merge, 1 when conflicts remain, 2 on usage or I/O errors.")]
pub struct Cli {
    /// Extract one branch of a patch or merge file
    #[arg(short = 'x', long, group = "mode")]
    pub extract: bool,

    /// Report differences between two files
    #[arg(short = 'd', long, group = "mode")]
    pub diff: bool,

    /// Merge patch changes into the original file (default)
    #[arg(short = 'm', long, group = "mode")]
    pub merge: bool,

    /// Browse a merge interactively (not available in this build)
    #[arg(short = 'B', long, group = "mode")]
    pub browse: bool,

    /// Compare word by word (default)
    #[arg(short = 'w', long, group = "granularity")]
    pub words: bool,

    /// Compare line by line
    #[arg(short = 'l', long, group = "granularity")]
    pub lines: bool,

    /// Select the first branch of a patch or merge file
    #[arg(short = '1', group = "which")]
    pub select_first: bool,

    /// Select the second branch of a patch or merge file
    #[arg(short = '2', group = "which")]
    pub select_second: bool,

    /// Select the third branch of a merge file
    #[arg(short = '3', group = "which")]
    pub select_third: bool,

    /// Treat the last file as a patch, stripping N leading path components
    /// (auto-detected when omitted)
    #[arg(
        short = 'p',
        long = "patch",
        alias = "strip",
        value_name = "N",
        num_args = 0..=1,
        require_equals = true,
        overrides_with = "patch"
    )]
    pub patch: Option<Option<usize>>,

    /// Replace the original file with the merge result
    #[arg(short = 'r', long)]
    pub replace: bool,

    /// Swap the before/after branches of the patch
    #[arg(short = 'R', long)]
    pub reverse: bool,

    /// Treat already-applied changes as conflicts instead of ignoring them
    #[arg(short = 'i', long = "no-ignore")]
    pub no_ignore: bool,

    /// Ignore changes in the amount of whitespace
    #[arg(short = 'b', long)]
    pub ignore_blanks: bool,

    /// Annotate and report changes that needed wiggling in (implies -i)
    #[arg(short = 'W', long)]
    pub show_wiggles: bool,

    /// Do not keep a .porig backup when replacing files
    #[arg(long)]
    pub no_backup: bool,

    /// Treat any run of non-blank characters as one word
    #[arg(long)]
    pub non_space: bool,

    /// Suppress the conflict summary on stderr
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored summaries
    #[arg(long)]
    pub no_color: bool,

    /// Emit a machine-readable JSON summary on stdout
    #[arg(long)]
    pub report_json: bool,

    /// Generate shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL")]
    pub completions: Option<Shell>,

    /// Input files (`-` reads stdin)
    pub files: Vec<PathBuf>,
}

impl Cli {
    /// The `-1`/`-2`/`-3` selector, or 0 when none was given.
    pub fn which(&self) -> u8 {
        if self.select_first {
            1
        } else if self.select_second {
            2
        } else if self.select_third {
            3
        } else {
            0
        }
    }

    pub fn context(&self) -> AppContext {
        AppContext {
            quiet: self.quiet,
            verbose: self.verbose,
            no_color: self.no_color,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_merge_with_words() {
        let cli = Cli::parse_from(["wiggle", "file", "patch"]);
        assert!(!cli.extract && !cli.diff && !cli.merge && !cli.browse);
        assert!(!cli.lines);
        assert_eq!(cli.files.len(), 2);
        assert_eq!(cli.which(), 0);
    }

    #[test]
    fn modes_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["wiggle", "-d", "-x", "f"]).is_err());
    }

    #[test]
    fn selectors_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["wiggle", "-1", "-2", "f"]).is_err());
        let cli = Cli::parse_from(["wiggle", "-x", "-2", "f"]);
        assert_eq!(cli.which(), 2);
    }

    #[test]
    fn patch_takes_an_optional_strip_count() {
        let cli = Cli::parse_from(["wiggle", "-p", "patchfile"]);
        assert_eq!(cli.patch, Some(None));

        let cli = Cli::parse_from(["wiggle", "--patch=2", "-r", "patchfile"]);
        assert_eq!(cli.patch, Some(Some(2)));
        assert!(cli.replace);

        let cli = Cli::parse_from(["wiggle", "--strip=1", "-r", "patchfile"]);
        assert_eq!(cli.patch, Some(Some(1)));
    }

    #[test]
    fn verbosity_accumulates() {
        let cli = Cli::parse_from(["wiggle", "-v", "-v", "f"]);
        assert_eq!(cli.verbose, 2);
    }
}
