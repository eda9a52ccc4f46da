//! Render an annotated merge stream as bytes.
//!
//! Clean sections print the appropriate side directly; conflicted ranges
//! become marker blocks:
//!
//! ```text
//! <<<<<<< found
//!     original text
//! ||||||| expected
//!     what the patch expected
//! =======
//!     replacement text
//! >>>>>>> replacement
//! ```
//!
//! A wiggle rendered under `--show-wiggles` additionally carries a
//! `&&&&&&& resolution` section holding the text that was wiggled in. In
//! word mode the markers shrink to `<<<---`, `|||`, `===`, `&&&`, `--->>>`
//! and are inlined without newlines. A hunk header met inside an extended
//! conflict closes the block and reopens it on the far side.

use std::io::{self, Write};

use tracing::trace;

use crate::core::merge::{Merge, MergeKind};
use crate::core::tokens::TokenFile;

/// Print one element: its full printed span, or the reconstructed hunk
/// header line for a sentinel.
pub fn printword<W: Write>(out: &mut W, f: &TokenFile<'_>, i: usize) -> io::Result<()> {
    // A stray NUL in ordinary input looks like a sentinel but won't parse;
    // print it as-is.
    if let Some((chunk, start, len)) = f.sentinel_fields(i) {
        write!(out, "*** {},{} **** {}", start, len, chunk)?;
        let rest = f.canon(i).get(18..).unwrap_or(b"");
        let stop = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        out.write_all(&rest[..stop])
    } else {
        out.write_all(f.printed(i))
    }
}

/// Print `len` elements of `f` starting at `start`; negative or oversized
/// ranges are clamped.
fn printrange<W: Write>(
    out: &mut W,
    f: &TokenFile<'_>,
    start: isize,
    len: isize,
) -> io::Result<()> {
    let mut start = start;
    let mut len = len;
    while len > 0 && (start as usize) < f.len() {
        printword(out, f, start as usize)?;
        start += 1;
        len -= 1;
    }
    Ok(())
}

struct Markers {
    found: &'static [u8],
    expected: &'static [u8],
    replacement_sep: &'static [u8],
    resolution: &'static [u8],
    end: &'static [u8],
    // Used when a hunk header splits one conflict block into two.
    reopen_end: &'static [u8],
    reopen_start: &'static [u8],
}

const LINE_MARKERS: Markers = Markers {
    found: b"<<<<<<< found\n",
    expected: b"||||||| expected\n",
    replacement_sep: b"=======\n",
    resolution: b"&&&&&&& resolution\n",
    end: b">>>>>>> replacement\n",
    reopen_end: b">>>>>>> replacement\n",
    reopen_start: b"<<<<<<< found\n",
};

const WORD_MARKERS: Markers = Markers {
    found: b"<<<---",
    expected: b"|||",
    replacement_sep: b"===",
    resolution: b"&&&",
    end: b"--->>>",
    reopen_end: b">>>",
    reopen_start: b"<<<",
};

fn is_mergeable(kind: MergeKind) -> bool {
    matches!(
        kind,
        MergeKind::Extraneous | MergeKind::Unmatched | MergeKind::Unchanged
    )
}

/// Walk the merge stream and write the merged output, conflict blocks
/// included, to `out`.
pub fn print_merge<W: Write>(
    out: &mut W,
    a: &TokenFile<'_>,
    b: &TokenFile<'_>,
    c: &TokenFile<'_>,
    words: bool,
    merger: &[Merge],
) -> io::Result<()> {
    let mk = if words { &WORD_MARKERS } else { &LINE_MARKERS };
    let mut mi = 0usize;

    while merger[mi].kind != MergeKind::End {
        while merger[mi].in_conflict > 0 {
            let m = &merger[mi];
            trace!(
                kind = ?m.kind,
                a = m.a,
                al = m.al,
                b = m.b,
                bl = m.bl,
                c = m.c,
                cl = m.cl,
                in_conflict = m.in_conflict,
                lo = m.lo,
                hi = m.hi,
                "conflict section"
            );

            // Print from `hi` of this border to `lo` of the closing one.
            let mut st: isize = 0;
            if merger[mi].in_conflict == 1 {
                st = merger[mi].hi;
            }

            if merger[mi].in_conflict == 1 && merger[mi].kind == MergeKind::Unchanged {
                printrange(
                    out,
                    a,
                    merger[mi].a as isize + merger[mi].lo,
                    merger[mi].hi - merger[mi].lo,
                )?;
            }

            if merger[mi].in_conflict == 1 && merger[mi + 1].in_conflict == 1 {
                // Nothing between two conflicts.
                mi += 1;
                continue;
            }

            out.write_all(mk.found)?;
            let mut found_conflict = false;
            let mut st1 = st;
            let mut cm = mi;
            while merger[cm].in_conflict > 0 {
                if merger[cm].kind == MergeKind::Conflict {
                    found_conflict = true;
                }
                if merger[cm].in_conflict == 1 && cm != mi {
                    printrange(out, a, merger[cm].a as isize, merger[cm].lo)?;
                    break;
                }
                printrange(
                    out,
                    a,
                    merger[cm].a as isize + st1,
                    merger[cm].al as isize - st1,
                )?;
                st1 = 0;
                cm += 1;
            }

            'restart: loop {
                out.write_all(mk.expected)?;
                let mut st1 = st;
                let mut first_matched = true;
                cm = mi;
                while merger[cm].in_conflict > 0 {
                    if merger[cm].kind == MergeKind::Extraneous
                        && b.is_sentinel(merger[cm].b)
                    {
                        // Hunk header: skip it, or abort this section when
                        // real content came first.
                        if first_matched {
                            cm += 1;
                            continue;
                        }
                        break;
                    }
                    if merger[cm].kind != MergeKind::Unchanged
                        && merger[cm].kind != MergeKind::Unmatched
                    {
                        first_matched = false;
                    }
                    if merger[cm].in_conflict == 1 && cm != mi {
                        printrange(out, a, merger[cm].a as isize, merger[cm].lo)?;
                        break;
                    }
                    printrange(
                        out,
                        b,
                        merger[cm].b as isize + st1,
                        merger[cm].bl as isize - st1,
                    )?;
                    st1 = 0;
                    cm += 1;
                }

                out.write_all(mk.replacement_sep)?;
                let mut st1 = st;
                let mut first_matched = true;
                let mut restarted = false;
                cm = mi;
                while merger[cm].in_conflict > 0 {
                    if merger[cm].kind == MergeKind::Extraneous
                        && b.is_sentinel(merger[cm].b)
                    {
                        if first_matched {
                            cm += 1;
                            continue;
                        }
                        // The patch crossed a hunk boundary inside this
                        // extended conflict: close the block and reopen it
                        // after the header, unless nothing reportable is
                        // left.
                        mi = cm;
                        while merger[cm].in_conflict > 1 && is_mergeable(merger[cm].kind) {
                            cm += 1;
                        }
                        if merger[cm].in_conflict == 0 {
                            break;
                        }
                        if merger[cm].in_conflict == 1 && is_mergeable(merger[cm].kind) {
                            break;
                        }
                        out.write_all(mk.reopen_end)?;
                        out.write_all(mk.reopen_start)?;
                        st = 0;
                        restarted = true;
                        break;
                    }
                    if merger[cm].kind != MergeKind::Unchanged
                        && merger[cm].kind != MergeKind::Unmatched
                    {
                        first_matched = false;
                    }
                    if merger[cm].in_conflict == 1 && cm != mi {
                        if merger[cm].kind == MergeKind::Unchanged {
                            printrange(out, a, merger[cm].a as isize, merger[cm].lo)?;
                        } else {
                            printrange(out, c, merger[cm].c as isize, merger[cm].cl as isize)?;
                        }
                        break;
                    }
                    if merger[cm].kind == MergeKind::Changed {
                        // All of the result of a change is printed.
                        st1 = 0;
                    }
                    printrange(
                        out,
                        c,
                        merger[cm].c as isize + st1,
                        merger[cm].cl as isize - st1,
                    )?;
                    st1 = 0;
                    cm += 1;
                }
                if restarted {
                    continue 'restart;
                }

                if !found_conflict {
                    // Wiggled in successfully, but full display was asked
                    // for: show the resolved text as well.
                    out.write_all(mk.resolution)?;
                    let mut st1 = st;
                    cm = mi;
                    while merger[cm].in_conflict > 0 {
                        let last = merger[cm].in_conflict == 1 && cm != mi;
                        match merger[cm].kind {
                            MergeKind::Unchanged
                            | MergeKind::AlreadyApplied
                            | MergeKind::Unmatched => {
                                printrange(
                                    out,
                                    a,
                                    merger[cm].a as isize + st1,
                                    if last {
                                        merger[cm].lo
                                    } else {
                                        merger[cm].al as isize - st1
                                    },
                                )?;
                            }
                            MergeKind::Extraneous => {}
                            MergeKind::Changed => {
                                printrange(
                                    out,
                                    c,
                                    merger[cm].c as isize,
                                    if last { merger[cm].lo } else { merger[cm].cl as isize },
                                )?;
                            }
                            MergeKind::Conflict | MergeKind::End => unreachable!(),
                        }
                        if last {
                            break;
                        }
                        st1 = 0;
                        cm += 1;
                    }
                }
                out.write_all(mk.end)?;
                break;
            }

            mi = cm;
            if merger[mi].in_conflict == 1 && merger[mi + 1].in_conflict == 0 {
                // End of the conflict with no other conflict following.
                if merger[mi].kind == MergeKind::Unchanged {
                    printrange(
                        out,
                        a,
                        merger[mi].a as isize + merger[mi].lo,
                        merger[mi].hi - merger[mi].lo,
                    )?;
                }
                mi += 1;
            }
        }

        // There is always some non-conflict after a conflict, unless we
        // hit the end.
        if merger[mi].kind == MergeKind::End {
            break;
        }

        let m = &merger[mi];
        trace!(
            kind = ?m.kind,
            a = m.a,
            al = m.al,
            c = m.c,
            cl = m.cl,
            "clean section"
        );
        match m.kind {
            MergeKind::Unchanged | MergeKind::AlreadyApplied | MergeKind::Unmatched => {
                printrange(out, a, m.a as isize, m.al as isize)?;
            }
            MergeKind::Extraneous => {}
            MergeKind::Changed => {
                printrange(out, c, m.c as isize, m.cl as isize)?;
            }
            MergeKind::Conflict | MergeKind::End => unreachable!(),
        }
        mi += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::diff::diff;
    use crate::core::merge::make_merger;
    use crate::core::tokens::SplitMode;

    fn render_lines(a: &str, b: &str, c: &str, ignore_already: bool) -> (String, usize) {
        let af = TokenFile::split(a.as_bytes(), SplitMode::lines());
        let bf = TokenFile::split(b.as_bytes(), SplitMode::lines());
        let cf = TokenFile::split(c.as_bytes(), SplitMode::lines());
        let csl1 = diff(&af, &bf);
        let csl2 = diff(&bf, &cf);
        let r = make_merger(&af, &bf, &cf, &csl1, &csl2, false, ignore_already, false);
        let mut out = Vec::new();
        print_merge(&mut out, &af, &bf, &cf, false, &r.merger).unwrap();
        (String::from_utf8(out).unwrap(), r.conflicts)
    }

    #[test]
    fn identical_inputs_render_unchanged() {
        let (out, conflicts) = render_lines("a\nb\nc\n", "a\nb\nc\n", "a\nb\nc\n", true);
        assert_eq!(out, "a\nb\nc\n");
        assert_eq!(conflicts, 0);
    }

    #[test]
    fn clean_change_renders_after_text() {
        let (out, conflicts) = render_lines("a\nb\nc\n", "a\nb\nc\n", "a\nB\nc\n", true);
        assert_eq!(out, "a\nB\nc\n");
        assert_eq!(conflicts, 0);
    }

    #[test]
    fn conflict_renders_marker_block() {
        let (out, conflicts) = render_lines("a\nX\nc\n", "a\nb\nc\n", "a\nB\nc\n", true);
        assert_eq!(conflicts, 1);
        insta::assert_snapshot!(out, @r###"
        a
        <<<<<<< found
        X
        ||||||| expected
        b
        =======
        B
        >>>>>>> replacement
        c
        "###);
    }

    #[test]
    fn already_applied_renders_original() {
        let (out, conflicts) = render_lines("a\nB\nc\n", "a\nb\nc\n", "a\nB\nc\n", true);
        assert_eq!(out, "a\nB\nc\n");
        assert_eq!(conflicts, 0);
    }

    #[test]
    fn word_mode_markers_are_inline() {
        let af = TokenFile::split(b"int x;\n", SplitMode::words());
        let bf = TokenFile::split(b"int y;\n", SplitMode::words());
        let cf = TokenFile::split(b"int z;\n", SplitMode::words());
        let csl1 = diff(&af, &bf);
        let csl2 = diff(&bf, &cf);
        let r = make_merger(&af, &bf, &cf, &csl1, &csl2, true, true, false);
        assert_eq!(r.conflicts, 1);
        let mut out = Vec::new();
        print_merge(&mut out, &af, &bf, &cf, true, &r.merger).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "int <<<---x|||y===z--->>>;\n");
    }

    #[test]
    fn disjoint_word_edits_on_one_line_merge_cleanly() {
        // The original renamed foo; the patch renames the argument. Word
        // granularity keeps the two apart.
        let af = TokenFile::split(b"int bar(int x)\n", SplitMode::words());
        let bf = TokenFile::split(b"int foo(int x)\n", SplitMode::words());
        let cf = TokenFile::split(b"int foo(int y)\n", SplitMode::words());
        let csl1 = diff(&af, &bf);
        let csl2 = diff(&bf, &cf);
        let r = make_merger(&af, &bf, &cf, &csl1, &csl2, true, true, false);
        assert_eq!(r.conflicts, 0);
        let mut out = Vec::new();
        print_merge(&mut out, &af, &bf, &cf, true, &r.merger).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "int bar(int y)\n");
    }
}
