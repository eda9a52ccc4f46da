//! The `--merge` mode: apply a patch (or rejoin a merge) onto an original.
//!
//! One input file is a merge (`diff3 -m` output); two are a file and a
//! patch; three are the plain original/before/after triple. With `-p` the
//! single patch names its target files itself and each is replaced in
//! turn.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use crate::cli::AppContext;
use crate::core::bestmatch::pdiff;
use crate::core::diff::{diff, diff_patch};
use crate::core::merge::make_merger;
use crate::core::patchset::{PatchEntry, parse_patch, set_prefix};
use crate::core::render::print_merge;
use crate::core::report::FileReport;
use crate::core::split::{split_merge, split_patch};
use crate::core::tokens::{Granularity, SplitMode, Stream, TokenFile};
use crate::infra::io::{check_backup_absent, load_file, load_segment, replace_file};

#[derive(Debug, Clone, Copy)]
pub struct MergeOpts {
    pub words: bool,
    pub ignore_blanks: bool,
    pub whole_word: bool,
    pub reverse: bool,
    pub replace: bool,
    pub no_backup: bool,
    /// Treat already-applied changes as ignorable rather than conflicts.
    pub ignore_already: bool,
    pub show_wiggles: bool,
}

/// Outcome of merging one file.
#[derive(Debug, Clone, Copy, Default)]
pub struct Outcome {
    pub conflicts: usize,
    pub wiggles: usize,
    pub ignored: usize,
}

impl Outcome {
    pub fn exit_status(&self) -> i32 {
        i32::from(self.conflicts > 0)
    }
}

/// Merge the three streams and render the result. `chunks` is nonzero when
/// the before/after pair came from a patch, in which case hunk placement
/// uses the best-match search instead of a plain diff.
pub fn merge_streams(
    orig: &Stream,
    before: &Stream,
    after: &Stream,
    chunks: usize,
    opts: MergeOpts,
) -> Result<(Vec<u8>, Outcome)> {
    let mode = SplitMode {
        granularity: if opts.words { Granularity::Words } else { Granularity::Lines },
        ignore_blanks: opts.ignore_blanks,
        whole_word: opts.whole_word,
    };
    let fl0 = TokenFile::split(&orig.body, mode);
    let fl1 = TokenFile::split(&before.body, mode);
    let fl2 = TokenFile::split(&after.body, mode);

    let csl1 = if chunks > 0 { pdiff(&fl0, &fl1, chunks) } else { diff(&fl0, &fl1) };
    let csl2 = diff_patch(&fl1, &fl2);

    let result = make_merger(
        &fl0,
        &fl1,
        &fl2,
        &csl1,
        &csl2,
        opts.words,
        opts.ignore_already,
        opts.show_wiggles,
    );

    let mut out = Vec::with_capacity(orig.len() + after.len() / 2);
    print_merge(&mut out, &fl0, &fl1, &fl2, opts.words, &result.merger)?;

    Ok((
        out,
        Outcome {
            conflicts: result.conflicts,
            wiggles: result.wiggles,
            ignored: result.ignored,
        },
    ))
}

/// Deliver a rendered merge: to stdout, or over the original under
/// `--replace`.
fn deliver(target: Option<&Path>, rendered: &[u8], opts: MergeOpts) -> Result<()> {
    match target {
        Some(path) => replace_file(path, rendered, opts.no_backup),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered).context("write failed")?;
            Ok(())
        }
    }
}

/// Merge the files given on the command line (1, 2 or 3 of them).
/// Returns the outcome and the report for this run.
pub fn run(files: &[PathBuf], opts: MergeOpts, ctx: &AppContext) -> Result<(i32, Vec<FileReport>)> {
    let (orig, mut before, mut after, chunks) = match files {
        [] => bail!("no files given for --merge"),
        [merged] => {
            let f = load_file(merged)?;
            let sm = split_merge(&f.body)
                .with_context(|| format!("merge file {} looks bad", merged.display()))?;
            (sm.orig, sm.before, sm.after, 0)
        }
        [file, patch] => {
            let orig = load_file(file)?;
            let p = load_file(patch)?;
            let sp = split_patch(&p.body)
                .with_context(|| format!("cannot parse patch {}", patch.display()))?;
            (orig, sp.before, sp.after, sp.chunks)
        }
        [orig, before, after] => (
            load_file(orig)?,
            load_file(before)?,
            load_file(after)?,
            0,
        ),
        _ => bail!("too many files given for --merge"),
    };
    if opts.reverse {
        std::mem::swap(&mut before, &mut after);
    }

    let target = opts.replace.then(|| files[0].as_path());
    if let Some(path) = target {
        if !opts.no_backup {
            check_backup_absent(path)?;
        }
    }

    let (rendered, outcome) = merge_streams(&orig, &before, &after, chunks, opts)?;
    deliver(target, &rendered, opts)?;

    let report = FileReport::new(target.map(|p| p.display().to_string()), &outcome);
    report.print_summary(opts.show_wiggles, ctx);
    Ok((outcome.exit_status(), vec![report]))
}

/// `-p` mode: apply each per-file piece of a multi-file patch to the file
/// it names, replacing files in place. A file that cannot be processed is
/// reported and skipped; the exit status is the worst seen.
pub fn run_multi(
    patch_path: &Path,
    strip: Option<usize>,
    opts: MergeOpts,
    ctx: &AppContext,
) -> Result<(i32, Vec<FileReport>)> {
    if !opts.replace {
        bail!("-p in merge mode requires -r");
    }
    let patch = load_file(patch_path)?;
    let entries = parse_patch(&patch.body);
    if entries.is_empty() {
        bail!("no file patches found in {}", patch_path.display());
    }
    let targets = set_prefix(&entries, strip)?;

    let mut status = 0i32;
    let mut reports = Vec::with_capacity(entries.len());
    for (entry, target) in entries.iter().zip(&targets) {
        info!(file = %target.display(), "applying patch");
        match apply_one(patch_path, entry, target, opts) {
            Ok(outcome) => {
                let report =
                    FileReport::new(Some(target.display().to_string()), &outcome);
                report.print_summary(opts.show_wiggles, ctx);
                status = status.max(outcome.exit_status());
                reports.push(report);
            }
            Err(err) => {
                warn!(file = %target.display(), "skipping: {err:#}");
                eprintln!("wiggle: {}: {err:#}", target.display());
                status = 2;
            }
        }
    }
    Ok((status, reports))
}

fn apply_one(
    patch_path: &Path,
    entry: &PatchEntry,
    target: &Path,
    opts: MergeOpts,
) -> Result<Outcome> {
    let orig = load_file(target)?;
    let segment = load_segment(patch_path, entry.start, entry.end)?;
    let sp = split_patch(&segment.body)
        .with_context(|| format!("cannot parse patch for {}", target.display()))?;
    let (mut before, mut after) = (sp.before, sp.after);
    if opts.reverse {
        std::mem::swap(&mut before, &mut after);
    }
    if !opts.no_backup {
        check_backup_absent(target)?;
    }
    let (rendered, outcome) = merge_streams(&orig, &before, &after, sp.chunks, opts)?;
    replace_file(target, &rendered, opts.no_backup)?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> MergeOpts {
        MergeOpts {
            words: true,
            ignore_blanks: false,
            whole_word: false,
            reverse: false,
            replace: false,
            no_backup: false,
            ignore_already: true,
            show_wiggles: false,
        }
    }

    fn patch_for(before: &str, after: &str, start: usize) -> (Stream, Stream, usize) {
        let lines_b = before.lines().count();
        let lines_a = after.lines().count();
        let mut text = format!("@@ -{start},{lines_b} +{start},{lines_a} @@\n");
        for l in before.lines() {
            text.push_str(&format!("-{l}\n"));
        }
        for l in after.lines() {
            text.push_str(&format!("+{l}\n"));
        }
        let sp = split_patch(text.as_bytes()).unwrap();
        (sp.before, sp.after, sp.chunks)
    }

    #[test]
    fn clean_hunk_applies() {
        let orig = Stream::from("a\nb\nc\n");
        let (before, after, chunks) = patch_for("a\nb\nc\n", "a\nB\nc\n", 1);
        let (out, outcome) = merge_streams(&orig, &before, &after, chunks, opts()).unwrap();
        assert_eq!(out, b"a\nB\nc\n");
        assert_eq!(outcome.conflicts, 0);
    }

    #[test]
    fn displaced_hunk_wiggles_in() {
        let orig = Stream::from("x\nx\na\nb\nc\n");
        let (before, after, chunks) = patch_for("a\nb\nc\n", "a\nB\nc\n", 1);
        let (out, outcome) = merge_streams(&orig, &before, &after, chunks, opts()).unwrap();
        assert_eq!(out, b"x\nx\na\nB\nc\n");
        assert_eq!(outcome.conflicts, 0);
    }

    #[test]
    fn reverse_applies_the_patch_backwards() {
        // --reverse swaps before and after at the stream level; applying
        // the swapped patch to the patched text restores the original.
        let orig = Stream::from("a\nB\nc\n");
        let (before, after, chunks) = patch_for("a\nb\nc\n", "a\nB\nc\n", 1);
        let (out, outcome) = merge_streams(&orig, &after, &before, chunks, opts()).unwrap();
        assert_eq!(out, b"a\nb\nc\n");
        assert_eq!(outcome.conflicts, 0);
    }

    #[test]
    fn conflicting_hunk_reports_a_conflict() {
        let orig = Stream::from("a\nX\nc\n");
        let (before, after, chunks) = patch_for("a\nb\nc\n", "a\nB\nc\n", 1);
        let (out, outcome) = merge_streams(&orig, &before, &after, chunks, opts()).unwrap();
        assert_eq!(outcome.conflicts, 1);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("<<<"), "{text}");
    }
}
