//! Three-way merger.
//!
//! Given the original, the patch pre-image ("before") and post-image
//! ("after"), plus the two CSLs orig<->before and before<->after, produce a
//! linear stream of tagged sections that tiles all three files, then widen
//! every conflict outward to clean cut-points.
//!
//! Section meanings:
//! - `Unmatched`: original text the pre-image knows nothing about.
//! - `Unchanged`: text common to all three.
//! - `Extraneous`: pre-image text (hunk context or headers) absent from the
//!   original but agreeing with the post-image.
//! - `Changed`: a clean replacement of original text by post-image text.
//! - `Conflict`: a range where all three disagree.
//! - `AlreadyApplied`: a "conflict" whose original already equals the
//!   post-image.

use tracing::trace;

use crate::core::diff::Csl;
use crate::core::tokens::TokenFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    End,
    Unmatched,
    Unchanged,
    Extraneous,
    Changed,
    Conflict,
    AlreadyApplied,
}

/// One section of the merge, with start indices and lengths in each of the
/// three files and backpointers into the source CSLs.
///
/// `in_conflict` is 0 for clean text, 1 for a section bordering a conflict
/// (`lo`/`hi` then delimit the part of `a` that stays outside), 2 inside a
/// true conflict and 3 inside a wiggle.
#[derive(Debug, Clone, Copy)]
pub struct Merge {
    pub kind: MergeKind,
    pub old_kind: MergeKind,
    pub a: usize,
    pub b: usize,
    pub c: usize,
    pub al: usize,
    pub bl: usize,
    pub cl: usize,
    pub c1: usize,
    pub c2: usize,
    pub in_conflict: u8,
    pub lo: isize,
    pub hi: isize,
}

/// A merge stream plus its outcome counts.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub merger: Vec<Merge>,
    pub conflicts: usize,
    pub wiggles: usize,
    pub ignored: usize,
}

fn check_alreadyapplied(af: &TokenFile<'_>, cf: &TokenFile<'_>, m: &mut Merge) -> bool {
    if m.al != m.cl {
        return false;
    }
    for i in 0..m.al {
        if af.canon(m.a + i) != cf.canon(m.c + i) {
            return false;
        }
    }
    trace!(
        a = m.a,
        b = m.b,
        c = m.c,
        al = m.al,
        bl = m.bl,
        cl = m.cl,
        "change already applied"
    );
    m.kind = MergeKind::AlreadyApplied;
    true
}

/// A cut-point is a place where all three streams sit at an end-of-line (or
/// file start); conflicts may only open and close at cut-points.
fn is_cutpoint(m: &Merge, af: &TokenFile<'_>, bf: &TokenFile<'_>, cf: &TokenFile<'_>) -> bool {
    (m.a == 0 || af.ends_line(m.a - 1))
        && (m.b == 0 || bf.ends_line(m.b - 1))
        && (m.c == 0 || cf.ends_line(m.c - 1))
}

/// Walk the three files under the direction of the two CSLs and emit the
/// tagged sections, terminated by an `End` entry.
pub fn make_merger(
    af: &TokenFile<'_>,
    bf: &TokenFile<'_>,
    cf: &TokenFile<'_>,
    csl1: &[Csl],
    csl2: &[Csl],
    words: bool,
    ignore_already: bool,
    show_wiggles: bool,
) -> MergeResult {
    let mut merger: Vec<Merge> = Vec::new();
    let mut ignored = 0usize;

    let (mut a, mut b, mut c) = (0usize, 0usize, 0usize);
    let (mut c1, mut c2) = (0usize, 0usize);
    let mut header_checked: isize = -1;
    let mut header_found: isize = -1;

    loop {
        let match1 = a >= csl1[c1].a && b >= csl1[c1].b;
        let match2 = b >= csl2[c2].a && c >= csl2[c2].b;

        if header_checked != c2 as isize {
            // Is there a hunk header inside the current csl2 run?
            header_found = -1;
            for j in b..csl2[c2].a + csl2[c2].len {
                if bf.is_sentinel(j) {
                    header_found = j as isize;
                    break;
                }
            }
            header_checked = c2 as isize;
        }

        let mut m = Merge {
            kind: MergeKind::End,
            old_kind: MergeKind::End,
            a,
            b,
            c,
            al: 0,
            bl: 0,
            cl: 0,
            c1,
            c2,
            in_conflict: 0,
            lo: 0,
            hi: 0,
        };

        if !match1 && match2 {
            // Unmatched original or Extraneous pre-image text. A
            // hunk-header Extraneous must align with an end-of-line in the
            // original, so pull the Unmatched boundary back to one.
            let mut newa = csl1[c1].a;
            if header_found >= 0 {
                while newa > a && !af.ends_line(newa - 1) {
                    newa -= 1;
                }
            }
            if a == newa && b == csl1[c1].b {
                newa = csl1[c1].a;
            }
            if a < newa {
                m.kind = MergeKind::Unmatched;
                m.al = newa - a;
            } else {
                assert!(b < csl1[c1].b);
                // Length is the smaller of the unmatched run on the left
                // and the matched run on the right; a hunk header is
                // always an Extraneous section of its own.
                m.kind = MergeKind::Extraneous;
                let mut newb =
                    b + (csl1[c1].b - b).min(csl2[c2].len - (b - csl2[c2].a));
                if header_found == b as isize {
                    newb = b + 1;
                    header_checked = -1;
                } else if header_found > b as isize && header_found < newb as isize {
                    newb = header_found as usize;
                    header_checked = -1;
                }
                assert!(newb > b);
                m.bl = newb - b;
                m.cl = m.bl;
            }
        } else if match1 && !match2 {
            m.kind = MergeKind::Changed;
            m.bl = (csl1[c1].b + csl1[c1].len).min(csl2[c2].a) - b;
            m.al = m.bl;
            m.cl = csl2[c2].b - c;
        } else if match1 && match2 {
            m.kind = MergeKind::Unchanged;
            m.bl = (csl1[c1].len - (b - csl1[c1].b))
                .min(csl2[c2].len - (b - csl2[c2].a));
            m.al = m.bl;
            m.cl = m.bl;
        } else {
            // Move a and c to their next match, b to the closer of the two.
            m.kind = MergeKind::Conflict;
            m.al = csl1[c1].a - a;
            m.cl = csl2[c2].b - c;
            m.bl = csl1[c1].b.min(csl2[c2].a) - b;
            if ignore_already && check_alreadyapplied(af, cf, &mut m) {
                ignored += 1;
            } else if m.bl == 0 && m.cl > 0 {
                // With nothing to match in the pre-image this reads better
                // as Unmatched original plus a conflicting insertion.
                m.al = 0;
            }
        }

        m.old_kind = m.kind;
        a += m.al;
        b += m.bl;
        c += m.cl;
        merger.push(m);

        while csl1[c1].a + csl1[c1].len <= a && csl1[c1].len > 0 {
            c1 += 1;
        }
        assert!(csl1[c1].b + csl1[c1].len >= b);
        while csl2[c2].b + csl2[c2].len <= c && csl2[c2].len > 0 {
            c2 += 1;
        }
        assert!(csl2[c2].a + csl2[c2].len >= b);

        if csl1[c1].len == 0
            && csl2[c2].len == 0
            && a == csl1[c1].a
            && b == csl1[c1].b
            && b == csl2[c2].a
            && c == csl2[c2].b
        {
            break;
        }
    }

    merger.push(Merge {
        kind: MergeKind::End,
        old_kind: MergeKind::End,
        a,
        b,
        c,
        al: 0,
        bl: 0,
        cl: 0,
        c1,
        c2,
        in_conflict: 0,
        lo: 0,
        hi: 0,
    });

    // An AlreadyApplied that isn't bounded by Unchanged or Changed is too
    // uncertain to ignore; revert it to a Conflict.
    for i in 0..merger.len() {
        if merger[i].kind != MergeKind::AlreadyApplied {
            continue;
        }
        if i > 0
            && merger[i - 1].kind != MergeKind::Unchanged
            && merger[i - 1].kind != MergeKind::Changed
        {
            merger[i].kind = MergeKind::Conflict;
        }
        if merger[i + 1].kind != MergeKind::Unchanged
            && merger[i + 1].kind != MergeKind::Changed
            && merger[i + 1].kind != MergeKind::End
        {
            merger[i].kind = MergeKind::Conflict;
        }
    }

    let (conflicts, wiggles) =
        isolate_conflicts(af, bf, cf, words, &mut merger, show_wiggles);

    MergeResult { merger, conflicts, wiggles, ignored }
}

/// Widen each conflict (and, under `show_wiggles`, each wiggle) outward to
/// the nearest cut-points, preferring one to three lines of clean context,
/// then count the resulting regions. Returns `(conflicts, wiggles)`.
pub fn isolate_conflicts(
    af: &TokenFile<'_>,
    bf: &TokenFile<'_>,
    cf: &TokenFile<'_>,
    words: bool,
    m: &mut [Merge],
    show_wiggles: bool,
) -> (usize, usize) {
    let mut cnt = 0usize;
    let mut wiggles = 0usize;
    let mut region_wiggles = 0usize;
    let mut in_wiggle = false;

    // Newline countdowns: once three newlines of the given kind have been
    // crossed, that kind of disturbance has "escaped" and no longer makes
    // nearby matches suspicious.
    let mut changed = 0i32;
    let mut unmatched = 0i32;
    let mut extraneous = 0i32;

    let mut i = 0usize;
    while m[i].kind != MergeKind::End {
        m[i].in_conflict = 0;
        i += 1;
    }

    let mut i = 0usize;
    while m[i].kind != MergeKind::End {
        match m[i].kind {
            MergeKind::Changed => changed = 3,
            MergeKind::Unmatched => unmatched = 3,
            // Hunk headers don't imply wiggles; other extraneous text does.
            MergeKind::Extraneous if !bf.is_sentinel(m[i].b) => extraneous = 3,
            _ => {}
        }

        if m[i].kind != MergeKind::Unchanged && changed > 0 && (unmatched > 0 || extraneous > 0)
        {
            if !in_wiggle {
                wiggles += 1;
            }
            in_wiggle = true;
        } else {
            in_wiggle = false;
        }

        if m[i].kind == MergeKind::Conflict || (show_wiggles && in_wiggle) {
            // Search backward for an Unchanged/Changed holding a usable
            // cut-point, marking everything on the way as inside the
            // conflict; then do the same forward.
            let mut newlines = 0i32;
            m[i].in_conflict = if m[i].kind == MergeKind::Conflict { 2 } else { 3 };

            let mut j = i as isize;
            loop {
                j -= 1;
                if j < 0 {
                    break;
                }
                let ju = j as usize;
                if m[ju].kind == MergeKind::Extraneous && bf.is_sentinel(m[ju].b) {
                    // A hunk header bounds the conflict.
                    break;
                }
                if m[ju].in_conflict > 1 {
                    // Ran into the previous conflict; merge with it.
                    break;
                }
                if m[ju].in_conflict == 0 {
                    m[ju].in_conflict = 1;
                    m[ju].lo = 0;
                }
                if m[ju].kind == MergeKind::Extraneous {
                    for k in (1..=m[ju].bl).rev() {
                        if bf.ends_line(m[ju].b + k - 1) {
                            newlines += 1;
                        }
                    }
                }
                if m[ju].kind != MergeKind::Unchanged && m[ju].kind != MergeKind::Changed {
                    if m[ju].kind == MergeKind::Conflict {
                        m[ju].in_conflict = 2;
                    } else {
                        m[ju].in_conflict = m[i].in_conflict;
                    }
                    continue;
                }

                // With three or more newlines available only one is really
                // needed, and preferably not the first found (the one
                // nearest the conflict).
                let mut firstk: isize = m[ju].al as isize + 1;
                if words {
                    m[ju].hi = m[ju].al as isize;
                    break;
                }
                let mut k = m[ju].al as isize;
                while k > 0 {
                    if m[ju].a + k as usize >= af.len() {
                        break;
                    }
                    if af.ends_line(m[ju].a + k as usize - 1) {
                        if firstk > m[ju].al as isize {
                            firstk = k;
                        }
                        newlines += 1;
                        if newlines >= 3 {
                            k = firstk;
                            break;
                        }
                    }
                    k -= 1;
                }
                if k > 0 {
                    m[ju].hi = k;
                } else if ju == 0 {
                    m[ju].hi = firstk;
                } else if is_cutpoint(&m[ju], af, bf, cf) {
                    m[ju].hi = 0;
                } else {
                    // No start-of-line in reach.
                    m[ju].hi = -1;
                }
                if m[ju].hi > 0 && m[ju].kind == MergeKind::Changed {
                    // Only usable if the section also starts a line.
                    if !is_cutpoint(&m[ju], af, bf, cf) {
                        m[ju].hi = -1;
                    }
                }
                if m[ju].hi >= 0 {
                    break;
                }
                m[ju].in_conflict = m[i].in_conflict;
            }

            // Forward.
            let mut newlines = 0i32;
            let mut j = i + 1;
            while m[j].kind != MergeKind::End {
                if m[j].kind == MergeKind::Extraneous {
                    for k in 0..m[j].bl {
                        if bf.ends_line(m[j].b + k) {
                            newlines += 1;
                        }
                    }
                }
                if m[j].kind != MergeKind::Unchanged && m[j].kind != MergeKind::Changed {
                    if m[j].kind == MergeKind::Conflict {
                        m[j].in_conflict = 2;
                    } else {
                        m[j].in_conflict = m[i].in_conflict;
                    }
                    j += 1;
                    continue;
                }
                m[j].in_conflict = 1;
                m[j].hi = m[j].al as isize;
                if words {
                    m[j].lo = 0;
                    break;
                }
                if is_cutpoint(&m[j], af, bf, cf) {
                    m[j].lo = 0;
                } else {
                    let mut firstk: isize = -1;
                    let mut k: isize = 0;
                    while k < m[j].al as isize {
                        if af.ends_line(m[j].a + k as usize) {
                            if firstk < 0 {
                                firstk = k;
                            }
                            newlines += 1;
                            if newlines >= 3 {
                                k = firstk;
                                break;
                            }
                        }
                        k += 1;
                    }
                    if newlines < 3 && m[j + 1].kind == MergeKind::End {
                        // Hit end of file; pretend three newlines turned up.
                        k = firstk;
                    }
                    if firstk >= 0 && m[j + 1].kind == MergeKind::Unmatched {
                        // A long following Unmatched ends the hunt early.
                        let mut nl = 0;
                        for p in 0..m[j + 1].al {
                            if af.ends_line(m[j + 1].a + p) {
                                nl += 1;
                                if nl > 3 {
                                    break;
                                }
                            }
                        }
                        if nl > 3 {
                            k = firstk;
                        }
                    }
                    if k < m[j].al as isize {
                        m[j].lo = k + 1;
                    } else {
                        m[j].lo = m[j].al as isize + 1;
                    }
                }
                if m[j].lo <= m[j].al as isize + 1 && m[j].kind == MergeKind::Changed {
                    // Only usable if the section end is a line break too.
                    if !is_cutpoint(&m[j + 1], af, bf, cf) {
                        m[j].lo = m[j].al as isize + 1;
                    }
                }
                if m[j].lo < m[j].al as isize + 1 {
                    break;
                }
                m[j].in_conflict = m[i].in_conflict;
                j += 1;
            }

            if m[j - 1].in_conflict == 1 {
                i = j - 1;
            } else {
                // A hunk header bordered the conflict.
                i = j;
            }

            // If nothing in the region actually Changed or Conflicted, it
            // was a false alarm: unwind the markings.
            'demote: {
                if m[j].kind == MergeKind::Changed {
                    break 'demote;
                }
                let mut jj = i as isize - 1;
                while jj >= 0 && m[jj as usize].in_conflict > 1 {
                    if matches!(
                        m[jj as usize].kind,
                        MergeKind::Changed | MergeKind::Conflict
                    ) {
                        break 'demote;
                    }
                    jj -= 1;
                }
                if jj >= 0 && m[jj as usize].kind == MergeKind::Changed {
                    break 'demote;
                }
                let mut jj = jj.max(0) as usize;
                if m[jj].in_conflict == 1 {
                    m[jj].hi = m[jj].al as isize;
                    if m[jj].lo == 0 {
                        m[jj].in_conflict = 0;
                    }
                    jj += 1;
                }
                while jj <= i {
                    m[jj].in_conflict = 0;
                    jj += 1;
                }
            }

            if m[i].kind == MergeKind::End {
                break;
            }
        }

        for k in 1..m[i].al {
            if m[i].a + k >= af.len() {
                break;
            }
            if words || af.ends_line(m[i].a + k) {
                if unmatched > 0 {
                    unmatched -= 1;
                }
                if changed > 0 {
                    changed -= 1;
                }
                if extraneous > 0 {
                    extraneous -= 1;
                }
            }
        }
        i += 1;
    }

    // Count regions: one conflict per range containing a true conflict,
    // one wiggle per range without.
    let mut i = 0usize;
    while m[i].kind != MergeKind::End {
        if m[i].in_conflict == 0 {
            i += 1;
            continue;
        }
        let mut true_conflict = false;
        let mut j = i;
        while m[j].kind != MergeKind::End && m[j].in_conflict > 0 {
            if m[j].in_conflict == 2 {
                true_conflict = true;
            }
            if j > i && m[j].in_conflict == 1 {
                // End of region.
                if m[j + 1].in_conflict == 0 {
                    j += 1;
                }
                break;
            }
            j += 1;
        }
        if true_conflict {
            cnt += 1;
        } else {
            region_wiggles += 1;
        }
        i = j;
    }
    // Without wiggle display only the adjacency scan sees the wiggles;
    // with it, the marked regions are the authoritative count.
    (cnt, if show_wiggles { region_wiggles } else { wiggles })
}
