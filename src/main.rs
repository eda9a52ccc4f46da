use std::process::ExitCode;

use anyhow::{Result, bail};
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use wiggle::cli::Cli;
use wiggle::core::diff_cmd::{self, DiffOpts};
use wiggle::core::merge_cmd::{self, MergeOpts};
use wiggle::core::{extract, report};
use wiggle::infra::config;

fn init_tracing(quiet: bool, verbose: u8) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    // Invariant breaches terminate with a status distinct from usage and
    // conflict exits.
    std::panic::set_hook(Box::new(|info| {
        eprintln!("wiggle: fatal internal error: {info}");
        std::process::exit(3);
    }));

    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match run(cli) {
        Ok(status) => ExitCode::from(status.clamp(0, u8::MAX as i32) as u8),
        Err(err) => {
            eprintln!("wiggle: {err:#}");
            ExitCode::from(2)
        }
    }
}

#[derive(PartialEq)]
enum Mode {
    Extract,
    Diff,
    Merge,
}

fn run(cli: Cli) -> Result<i32> {
    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "wiggle", &mut std::io::stdout());
        return Ok(0);
    }

    if cli.browse {
        bail!("browse mode is not available in this build");
    }
    let mode = if cli.extract {
        Mode::Extract
    } else if cli.diff {
        Mode::Diff
    } else {
        Mode::Merge
    };

    if mode == Mode::Extract && (cli.words || cli.lines) {
        bail!("cannot specify --words or --lines with --extract");
    }
    if cli.replace && mode != Mode::Merge {
        bail!("--replace only allowed with --merge");
    }
    let which = cli.which();
    if mode == Mode::Extract && which == 0 {
        bail!("must specify -1, -2 or -3 with --extract");
    }
    if mode == Mode::Merge && which != 0 {
        bail!("-1, -2 or -3 only allowed with --extract or --diff");
    }
    let is_patch = cli.patch.is_some();
    if is_patch && which == 3 {
        bail!("cannot extract -3 from a patch");
    }

    let cfg = config::load()?;
    let ctx = cli.context();
    let words = !(cli.lines || (!cli.words && cfg.lines == Some(true)));
    let ignore_blanks = cli.ignore_blanks || cfg.ignore_blanks == Some(true);
    let show_wiggles = cli.show_wiggles || cfg.show_wiggles == Some(true);
    let no_backup = cli.no_backup || cfg.backup == Some(false);

    match mode {
        Mode::Extract => {
            let [file] = cli.files.as_slice() else {
                bail!("need exactly one file for --extract");
            };
            extract::run(file, is_patch, which, &mut std::io::stdout().lock())
        }
        Mode::Diff => {
            let opts = DiffOpts {
                words,
                ignore_blanks,
                whole_word: cli.non_space,
                is_patch,
                which,
                reverse: cli.reverse,
            };
            let differences =
                diff_cmd::run(&cli.files, opts, &mut std::io::stdout().lock())?;
            Ok(i32::from(differences > 0))
        }
        Mode::Merge => {
            let opts = MergeOpts {
                words,
                ignore_blanks,
                whole_word: cli.non_space,
                reverse: cli.reverse,
                replace: cli.replace,
                no_backup,
                // -W surfaces already-applied changes too.
                ignore_already: !(cli.no_ignore || show_wiggles),
                show_wiggles,
            };
            let (status, reports) = if is_patch {
                let [patch] = cli.files.as_slice() else {
                    bail!("-p in merge mode requires exactly one file");
                };
                merge_cmd::run_multi(patch, cli.patch.flatten(), opts, &ctx)?
            } else {
                merge_cmd::run(&cli.files, opts, &ctx)?
            };
            if cli.report_json {
                report::print_json(&reports, status)?;
            }
            Ok(status)
        }
    }
}
