//! The `--diff` mode: line- or word-level differences between two inputs.
//!
//! With one file the input is a patch, and the two sides of the patch are
//! rediffed hunk by hunk. With two files the second may be a patch
//! (`-p`), in which case the chosen side of it is compared against the
//! first file using the best-match locator.
//!
//! Line output uses the familiar `-`/`+`/` ` prefixes. Word output stays
//! line-oriented where whole lines are involved and otherwise embeds
//! `<<<--`...`-->>>` (removed) and `<<<++`...`++>>>` (added) spans inside
//! the line.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

use crate::core::bestmatch::pdiff;
use crate::core::diff::{Csl, diff_patch};
use crate::core::render::printword;
use crate::core::split::split_patch;
use crate::core::tokens::{Granularity, SplitMode, Stream, TokenFile};
use crate::infra::io::load_file;

#[derive(Debug, Clone, Copy)]
pub struct DiffOpts {
    pub words: bool,
    pub ignore_blanks: bool,
    pub whole_word: bool,
    pub is_patch: bool,
    /// 1 or 2 selects which side of a `-p` patch to compare against.
    pub which: u8,
    pub reverse: bool,
}

/// Print the hunk header joining two sentinel elements.
fn printsep<W: Write>(
    out: &mut W,
    f1: &TokenFile<'_>,
    i: usize,
    f2: &TokenFile<'_>,
    j: usize,
) -> std::io::Result<()> {
    let (Some((_, b, c)), Some((_, e, f))) = (f1.sentinel_fields(i), f2.sentinel_fields(j))
    else {
        // Stray NULs masquerading as sentinels; print them raw.
        out.write_all(f1.printed(i))?;
        return out.write_all(f2.printed(j));
    };
    write!(out, "@@ -{},{} +{},{} @@", b, c, e, f)?;
    let rest = f1.canon(i).get(18..).unwrap_or(b"");
    let stop = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
    out.write_all(&rest[..stop])
}

fn do_diff_lines<W: Write>(
    out: &mut W,
    fl0: &TokenFile<'_>,
    fl1: &TokenFile<'_>,
    csl: &[Csl],
) -> Result<i32> {
    let mut a = 0usize;
    let mut b = 0usize;
    let mut ci = 0usize;
    let mut exit_status = 0i32;

    while a < fl0.len() || b < fl1.len() {
        if a < csl[ci].a {
            if !fl0.is_sentinel(a) {
                out.write_all(b"-")?;
                printword(out, fl0, a)?;
            }
            a += 1;
            exit_status += 1;
        } else if b < csl[ci].b {
            if !fl1.is_sentinel(b) {
                out.write_all(b"+")?;
                printword(out, fl1, b)?;
            }
            b += 1;
            exit_status += 1;
        } else {
            if fl0.is_sentinel(a) {
                printsep(out, fl0, a, fl1, b)?;
            } else {
                out.write_all(b" ")?;
                printword(out, fl0, a)?;
            }
            a += 1;
            b += 1;
            if a >= csl[ci].a + csl[ci].len {
                ci += 1;
            }
        }
    }
    Ok(exit_status)
}

fn do_diff_words<W: Write>(
    out: &mut W,
    fl0: &TokenFile<'_>,
    fl1: &TokenFile<'_>,
    csl: &[Csl],
) -> Result<i32> {
    let mut a = 0usize;
    let mut b = 0usize;
    let mut ci = 0usize;
    let mut exit_status = 0i32;
    let mut sol = true; // at start of line

    while a < fl0.len() || b < fl1.len() {
        if a < csl[ci].a {
            exit_status += 1;
            if sol {
                // Deleting whole lines prints "-line"; a partial removal
                // keeps the line context and brackets the removed words.
                sol = false;
                for a1 in a..csl[ci].a {
                    if fl0.ends_line(a1) {
                        sol = true;
                        break;
                    }
                }
                if sol {
                    out.write_all(b"-")?;
                    while a < csl[ci].a {
                        printword(out, fl0, a)?;
                        let eol = fl0.ends_line(a);
                        a += 1;
                        if eol {
                            break;
                        }
                    }
                } else {
                    out.write_all(b"|")?;
                }
            }
            if !sol {
                out.write_all(b"<<<--")?;
                loop {
                    if sol {
                        out.write_all(b"|")?;
                    }
                    printword(out, fl0, a)?;
                    sol = fl0.ends_line(a);
                    a += 1;
                    if a >= csl[ci].a {
                        break;
                    }
                }
                if sol {
                    out.write_all(b"|")?;
                }
                out.write_all(b"-->>>")?;
                sol = false;
            }
        } else if b < csl[ci].b {
            exit_status += 1;
            if sol {
                sol = false;
                for b1 in b..csl[ci].b {
                    if fl1.ends_line(b1) {
                        sol = true;
                        break;
                    }
                }
                if sol {
                    out.write_all(b"+")?;
                    while b < csl[ci].b {
                        printword(out, fl1, b)?;
                        let eol = fl1.ends_line(b);
                        b += 1;
                        if eol {
                            break;
                        }
                    }
                } else {
                    out.write_all(b"|")?;
                }
            }
            if !sol {
                out.write_all(b"<<<++")?;
                loop {
                    if sol {
                        out.write_all(b"|")?;
                    }
                    printword(out, fl1, b)?;
                    sol = fl1.ends_line(b);
                    b += 1;
                    if b >= csl[ci].b {
                        break;
                    }
                }
                if sol {
                    out.write_all(b"|")?;
                }
                out.write_all(b"++>>>")?;
                sol = false;
            }
        } else {
            if sol {
                let mut line_end_in_run = false;
                for a1 in a..csl[ci].a + csl[ci].len {
                    if fl0.ends_line(a1) {
                        line_end_in_run = true;
                    }
                }
                sol = line_end_in_run;
                if sol {
                    if !fl0.is_sentinel(a) {
                        out.write_all(b" ")?;
                        while a < csl[ci].a + csl[ci].len {
                            printword(out, fl0, a)?;
                            let eol = fl0.ends_line(a);
                            a += 1;
                            b += 1;
                            if eol {
                                break;
                            }
                        }
                    } else {
                        printsep(out, fl0, a, fl1, b)?;
                        a += 1;
                        b += 1;
                    }
                } else {
                    out.write_all(b"|")?;
                }
            }
            if !sol {
                printword(out, fl0, a)?;
                if fl0.ends_line(a) {
                    sol = true;
                }
                a += 1;
                b += 1;
            }
            if a >= csl[ci].a + csl[ci].len {
                ci += 1;
            }
        }
    }
    Ok(exit_status)
}

/// Run the diff mode over the given inputs. The return value is the number
/// of differing elements; the driver collapses it to an exit status.
pub fn run<W: Write>(files: &[PathBuf], opts: DiffOpts, out: &mut W) -> Result<i32> {
    let mut chunks1 = 0usize;
    let mut chunks2 = 0usize;
    let stream0: Stream;
    let stream1: Stream;

    match files {
        [] => bail!("no file given for --diff"),
        [patch] => {
            let f = load_file(patch)?;
            let sp = split_patch(&f.body)
                .with_context(|| format!("cannot parse patch {}", patch.display()))?;
            if sp.chunks == 0 {
                bail!("couldn't parse patch {}", patch.display());
            }
            chunks1 = sp.chunks;
            chunks2 = sp.chunks;
            let (mut s0, mut s1) = (sp.before, sp.after);
            if opts.reverse {
                std::mem::swap(&mut s0, &mut s1);
            }
            stream0 = s0;
            stream1 = s1;
        }
        [file, second] => {
            let f0 = load_file(file)?;
            if opts.is_patch {
                let f = load_file(second)?;
                let sp = split_patch(&f.body)
                    .with_context(|| format!("cannot parse patch {}", second.display()))?;
                chunks2 = sp.chunks;
                let (mut s1, mut s2) = if opts.which == 2 {
                    (sp.after, sp.before)
                } else {
                    (sp.before, sp.after)
                };
                if opts.reverse {
                    std::mem::swap(&mut s1, &mut s2);
                }
                stream1 = s1;
            } else {
                stream1 = load_file(second)?;
            }
            stream0 = f0;
        }
        _ => bail!("too many files given for --diff"),
    }

    let mode = SplitMode {
        granularity: if opts.words { Granularity::Words } else { Granularity::Lines },
        ignore_blanks: opts.ignore_blanks,
        whole_word: opts.whole_word,
    };
    let fl0 = TokenFile::split(&stream0.body, mode);
    let fl1 = TokenFile::split(&stream1.body, mode);

    let csl = if chunks2 > 0 && chunks1 == 0 {
        pdiff(&fl0, &fl1, chunks2)
    } else {
        diff_patch(&fl0, &fl1)
    };

    if chunks1 == 0 {
        // Plain files carry no hunk headers; fabricate one.
        if !opts.words {
            writeln!(out, "@@ -1,{} +1,{} @@", fl0.len(), fl1.len())?;
        } else {
            let l0 = (0..fl0.len()).filter(|&i| fl0.ends_line(i)).count();
            let l1 = (0..fl1.len()).filter(|&i| fl1.ends_line(i)).count();
            writeln!(out, "@@ -1,{} +1,{} @@", l0, l1)?;
        }
    }

    if !opts.words {
        do_diff_lines(out, &fl0, &fl1, &csl)
    } else {
        do_diff_words(out, &fl0, &fl1, &csl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diff::diff;

    fn word_diff(a: &[u8], b: &[u8]) -> (String, i32) {
        let fa = TokenFile::split(a, SplitMode::words());
        let fb = TokenFile::split(b, SplitMode::words());
        let csl = diff(&fa, &fb);
        let mut out = Vec::new();
        let n = do_diff_words(&mut out, &fa, &fb, &csl).unwrap();
        (String::from_utf8(out).unwrap(), n)
    }

    #[test]
    fn identical_inputs_have_no_differences() {
        let (text, n) = word_diff(b"same old text\n", b"same old text\n");
        assert_eq!(n, 0);
        assert_eq!(text, " same old text\n");
    }

    #[test]
    fn word_replacement_is_bracketed_in_line() {
        let (text, n) = word_diff(b"keep foo end\n", b"keep bar end\n");
        assert!(n > 0);
        assert!(text.contains("<<<--"), "{text}");
        assert!(text.contains("foo"), "{text}");
        assert!(text.contains("<<<++"), "{text}");
        assert!(text.contains("bar"), "{text}");
    }

    #[test]
    fn whole_line_removal_prints_minus_line() {
        let fa = TokenFile::split(b"one\ngone\nthree\n", SplitMode::lines());
        let fb = TokenFile::split(b"one\nthree\n", SplitMode::lines());
        let csl = diff(&fa, &fb);
        let mut out = Vec::new();
        let n = do_diff_lines(&mut out, &fa, &fb, &csl).unwrap();
        assert_eq!(n, 1);
        assert_eq!(String::from_utf8(out).unwrap(), " one\n-gone\n three\n");
    }
}
