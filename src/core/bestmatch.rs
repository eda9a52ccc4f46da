//! Best placement of patch hunks against an original file.
//!
//! A patch is a synthetic token file whose hunks are separated by sentinel
//! elements. Big gaps are expected between where hunks match, but only
//! small gaps within a hunk, so the plain LCS is the wrong tool: instead
//! the whole edit matrix is walked breadth-first along fronts of constant
//! `x+y`, scoring the match running on every diagonal and remembering, per
//! hunk, the highest-scoring stretch seen.
//!
//! Scoring: the first matching symbol is worth 6, each consecutive match
//! adds 3, a match after a gap adds 2, and every insertion or deletion
//! costs 1 unless it is the second half of a replacement. A value that
//! drops to 0 forgets the match and starts over. These constants decide
//! placements on boundary cases; do not tune them casually.
//!
//! Before searching, both files are reduced to "interesting" tokens (those
//! ending a line or starting with an alphanumeric or underscore), then the
//! winning placements are remapped to the full files.

use smallvec::SmallVec;
use tracing::debug;

use crate::core::diff::{Csl, Diagonals, csl_join, diff_partial};
use crate::core::tokens::TokenFile;

/// Running match state on one diagonal.
#[derive(Debug, Clone, Copy, Default)]
struct V {
    /// Location where the current match started.
    x: isize,
    y: isize,
    /// Value of the match from (x, y) to here.
    val: i32,
    /// Diagonal of the last match, valid while `val > 0`.
    k: isize,
    /// Whether the previous point was a match.
    inmatch: bool,
    /// Current chunk number, -1 before the first hunk sentinel is crossed.
    c: i32,
}

/// Highest-scoring stretch found for one chunk.
#[derive(Debug, Clone, Copy, Default)]
struct Best {
    xlo: isize,
    ylo: isize,
    xhi: isize,
    yhi: isize,
    val: i32,
}

/// `dir` is 0 for a match, 1 for an x-step (deletion), -1 for a y-step
/// (insertion).
fn update_value(v: &mut V, dir: isize, k: isize, x: isize) {
    if dir == 0 {
        if v.val <= 0 {
            v.x = x - 1;
            v.y = x - k - 1;
            v.inmatch = false;
            v.val = 4;
        }
        v.val += 2 + i32::from(v.inmatch);
        v.inmatch = true;
        v.k = k;
    } else if v.val > 0 {
        v.inmatch = false;
        if dir * (v.k - k) > 0 {
            // Other half of a replacement: free.
        } else {
            v.val -= 1;
        }
    }
}

/// Best value this state could still reach with `max` matchable symbols
/// remaining. Used to retire diagonals that cannot beat the recorded best.
fn best_val(v: &V, max: isize) -> i32 {
    if v.val <= 0 {
        4 + max as i32 * 3 - 1
    } else {
        max as i32 * 3 - 1 + i32::from(v.inmatch) + v.val
    }
}

fn find_best(
    a: &TokenFile<'_>,
    b: &TokenFile<'_>,
    alo: isize,
    ahi: isize,
    blo: isize,
    bhi: isize,
    best: &mut [Best],
) {
    let mut v: Diagonals<V> = Diagonals::new(alo - bhi - 4, ahi - blo + 4);

    let mut klo = alo - blo;
    let mut khi = klo;
    let mut f = alo + blo; // front that moves forward
    v[klo].val = 0;
    v[klo].c = -1;

    let prunable = |v: &V, max: isize, best: &[Best]| -> bool {
        v.c >= 0 && best_val(v, max) < best[v.c as usize].val
    };

    while f < ahi + bhi {
        f += 1;
        let mut k = klo + 1;
        while k <= khi - 1 {
            let x = (k + f) / 2;
            let y = x - k;

            // The diagonal is always preferred when possible.
            if a.matches((x - 1) as usize, b, (y - 1) as usize) {
                update_value(&mut v[k], 0, k, x);
                assert!(v[k].c >= 0, "match before any hunk sentinel");
                let c = v[k].c as usize;
                if v[k].val > best[c].val {
                    best[c] = Best {
                        xlo: v[k].x,
                        ylo: v[k].y,
                        xhi: x,
                        yhi: y,
                        val: v[k].val,
                    };
                }
            } else {
                // A y-step adds a symbol from B and may cross a chunk
                // boundary; an x-step deletes a symbol and cannot, as the
                // original holds no sentinels.
                let mut vnew = v[k + 1];
                update_value(&mut vnew, -1, k, x);
                let yi = (y - 1) as usize;
                if b.list[yi].len > 0 && b.data[b.list[yi].start] == 0 {
                    vnew.c = b.list[yi].hash as i32;
                    vnew.val = 0;
                }

                let mut vnew2 = v[k - 1];
                update_value(&mut vnew2, 1, k, x);

                v[k] = if vnew2.val > vnew.val { vnew2 } else { vnew };
            }
            k += 2;
        }

        // Extend the front at both extremes, then contract past diagonals
        // that either left the matrix or cannot beat any recorded best.
        klo -= 1;
        v[klo] = v[klo + 1];
        let mut x = (klo + f) / 2;
        let mut y = x - klo;
        update_value(&mut v[klo], -1, klo, x);
        if y <= bhi {
            let yi = (y - 1) as usize;
            if b.list[yi].len > 0 && b.data[b.list[yi].start] == 0 {
                v[klo].c = b.list[yi].hash as i32;
                v[klo].val = 0;
            }
        }
        while klo + 2 < (ahi - bhi)
            && (y > bhi
                || (prunable(&v[klo], (ahi - x).min(bhi - y), best)
                    && prunable(&v[klo + 1], (ahi - x).min(bhi - y + 1), best)))
        {
            klo += 2;
            x = (klo + f) / 2;
            y = x - klo;
        }

        khi += 1;
        v[khi] = v[khi - 1];
        x = (khi + f) / 2;
        y = x - khi;
        update_value(&mut v[khi], -1, khi, x);
        while khi - 2 > (ahi - bhi)
            && (x > ahi
                || (v[khi].c >= 0
                    && best_val(&v[khi], (ahi - x).min(bhi - y))
                        < best[v[khi].c as usize].val
                    && best_val(&v[khi - 1], (ahi - x + 1).min(bhi - y))
                        < best[v[khi].c as usize].val))
        {
            khi -= 2;
            x = (khi + f) / 2;
            y = x - khi;
        }
    }
}

/// Words that end a line or start with an alphanumeric carry the signal;
/// spaces and punctuation only slow the search down.
fn is_skipped(f: &TokenFile<'_>, i: usize) -> bool {
    if f.ends_line(i) {
        return false;
    }
    let canon = f.canon(i);
    !(canon.first().is_some_and(|&c| c.is_ascii_alphanumeric() || c == b'_'))
}

fn reduce<'a>(orig: &TokenFile<'a>) -> TokenFile<'a> {
    let list = (0..orig.len())
        .filter(|&i| !is_skipped(orig, i))
        .map(|i| orig.list[i])
        .collect();
    TokenFile { data: orig.data, list }
}

/// Convert best matches between the reduced files into indexes into the
/// full files, expanding each end over immediately surrounding skipped
/// words. Elements are identified across the two views by their byte
/// offset in the shared stream.
fn remap(
    best: &mut [Best],
    a1: &TokenFile<'_>,
    b1: &TokenFile<'_>,
    a2: &TokenFile<'_>,
    b2: &TokenFile<'_>,
) {
    let mut pa = 0usize;
    let mut pb = 0usize;

    if a1.is_empty() && a2.is_empty() {
        return;
    }

    for bi in 1..best.len() {
        if best[bi].val <= 0 {
            continue;
        }
        while pa < a2.len() && a2.list[pa].start != a1.list[best[bi].xlo as usize].start {
            pa += 1;
        }
        assert!(pa < a2.len(), "placement start missing from full file");
        while pb < b2.len() && b2.list[pb].start != b1.list[best[bi].ylo as usize].start {
            pb += 1;
        }
        assert!(pb < b2.len(), "placement start missing from full patch");

        // Step backward over ignored words at the start.
        while pa > 0 && is_skipped(a2, pa - 1) {
            pa -= 1;
        }
        while pb > 0 && is_skipped(b2, pb - 1) {
            pb -= 1;
        }
        if pa == 0 {
            pa = 1;
        }
        if pb == 0 {
            pb = 1;
        }
        best[bi].xlo = pa as isize;
        best[bi].ylo = pb as isize;

        while pa < a2.len()
            && a2.list[pa - 1].start != a1.list[(best[bi].xhi - 1) as usize].start
        {
            pa += 1;
        }
        assert!(
            pa < a2.len() || best[bi].xhi == a1.len() as isize,
            "placement end missing from full file"
        );
        while pb < b2.len()
            && b2.list[pb - 1].start != b1.list[(best[bi].yhi - 1) as usize].start
        {
            pb += 1;
        }
        assert!(
            pb < b2.len() || best[bi].yhi == b1.len() as isize,
            "placement end missing from full patch"
        );

        // Step forward over ignored words at the end.
        while pa < a2.len() && is_skipped(a2, pa) {
            pa += 1;
        }
        while pb < b2.len() && is_skipped(b2, pb) {
            pb += 1;
        }
        best[bi].xhi = pa as isize;
        best[bi].yhi = pb as isize;
    }
}

/// The per-chunk bests found by a single scan need not be in order. When
/// two placements overlap, fix the highest-valued chunk and re-search the
/// regions on either side of it, bounded by the neighbouring hunk
/// sentinels. Terminates because every level fixes at least one chunk.
fn find_best_inorder(
    a: &TokenFile<'_>,
    b: &TokenFile<'_>,
    alo: isize,
    ahi: isize,
    blo: isize,
    bhi: isize,
    best: &mut [Best],
    bestlo: usize,
    besthi: usize,
) {
    for i in bestlo..besthi {
        best[i].val = 0;
    }
    find_best(a, b, alo, ahi, blo, bhi, best);

    let mut bad = false;
    for i in bestlo + 1..besthi {
        if best[i - 1].val > 0 && best[i].val > 0 && best[i - 1].xhi >= best[i].xlo {
            bad = true;
        }
    }
    if !bad {
        return;
    }

    let mut bestval = 0;
    let mut bestpos = bestlo;
    for i in bestlo..besthi {
        if best[i].val > bestval {
            bestval = best[i].val;
            bestpos = i;
        }
    }
    if bestpos > bestlo {
        // Move the top of the left region down below the chunk sentinel.
        let mut y = best[bestpos].ylo;
        while !b.is_sentinel(y as usize) {
            y -= 1;
        }
        find_best_inorder(a, b, alo, best[bestpos].xlo, blo, y, best, bestlo, bestpos);
    }
    if bestpos < besthi - 1 {
        // Move the bottom of the right region up to the chunk sentinel.
        let mut y = best[bestpos].yhi;
        while !b.is_sentinel(y as usize) {
            y += 1;
        }
        find_best_inorder(
            a,
            b,
            best[bestpos].xhi,
            ahi,
            y,
            bhi,
            best,
            bestpos + 1,
            besthi,
        );
    }
}

/// Place each hunk of the patch `b` (with `chunks` hunks) against the
/// original `a`, returning a CSL over the full files in which every
/// covered region is the best-scoring placement of its hunk.
pub fn pdiff(a: &TokenFile<'_>, b: &TokenFile<'_>, chunks: usize) -> Vec<Csl> {
    let asmall = reduce(a);
    let bsmall = reduce(b);

    let mut best: SmallVec<[Best; 8]> = SmallVec::new();
    best.resize(chunks + 1, Best::default());

    find_best_inorder(
        &asmall,
        &bsmall,
        0,
        asmall.len() as isize,
        0,
        bsmall.len() as isize,
        &mut best,
        1,
        chunks + 1,
    );
    remap(&mut best, &asmall, &bsmall, a, b);

    let mut csl: Vec<Csl> = Vec::new();
    let mut xmin = 0usize;
    for i in 1..=chunks {
        if best[i].val <= 0 {
            // The scan found no placement worth keeping; the merger will
            // surface the hunk as a conflict.
            debug!(chunk = i, "no placement found for hunk");
            continue;
        }
        let (bxlo, bxhi) = (best[i].xlo as usize, best[i].xhi as usize);
        let (bylo, byhi) = (best[i].ylo as usize, best[i].yhi as usize);

        // Unmatched newlines in the hunk before the placement: extend the
        // original back over that many lines and diff the extensions.
        let mut lines = 0usize;
        let mut ylo = bylo;
        while ylo > 0 && !b.is_sentinel(ylo - 1) {
            ylo -= 1;
            lines += usize::from(b.ends_line(ylo));
        }
        if lines > 0 {
            let mut xlo = bxlo;
            while lines > 0 && xlo > xmin {
                xlo -= 1;
                lines -= usize::from(a.ends_line(xlo));
            }
            while xlo > xmin && !a.ends_line(xlo - 1) {
                xlo -= 1;
            }
            csl = csl_join(csl, diff_partial(a, b, xlo, bxlo, ylo, bylo));
        }

        // The good bit of the hunk against the good match.
        csl = csl_join(csl, diff_partial(a, b, bxlo, bxhi, bylo, byhi));

        // Unmatched newlines at the end of the hunk: take as many lines of
        // the original, stopping short of the next placement.
        let mut lines = 0usize;
        let mut yhi = byhi;
        while yhi < b.len() && !b.is_sentinel(yhi) {
            lines += usize::from(b.ends_line(yhi));
            yhi += 1;
        }
        xmin = bxhi;
        if lines > 0 {
            let mut xhi = bxhi;
            let xmax = if i < chunks && best[i + 1].val > 0 {
                best[i + 1].xlo as usize
            } else {
                a.len()
            };
            while lines > 0 && xhi < xmax {
                lines -= usize::from(a.ends_line(xhi));
                xhi += 1;
            }
            csl = csl_join(csl, diff_partial(a, b, bxhi, xhi, byhi, yhi));
            xmin = xhi;
        }
    }

    match csl.last_mut() {
        Some(last) if last.len == 0 => {
            last.a = a.len();
            last.b = b.len();
        }
        _ => csl.push(Csl { a: a.len(), b: b.len(), len: 0 }),
    }
    csl
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tokens::{SplitMode, Stream, TokenFile, push_sentinel};

    fn hunk_stream(hunks: &[(usize, usize, &str)]) -> Stream {
        let mut body = Vec::new();
        for (i, (start, count, text)) in hunks.iter().enumerate() {
            push_sentinel(&mut body, i + 1, *start, *count);
            body.extend_from_slice(text.as_bytes());
        }
        Stream::new(body)
    }

    fn covered(csl: &[Csl], a: usize, b: usize) -> bool {
        csl.iter().any(|e| a >= e.a && b >= e.b && a - e.a == b - e.b && a - e.a < e.len)
    }

    #[test]
    fn finds_hunk_displaced_by_leading_noise() {
        let orig = Stream::from("x\nx\na\nb\nc\n");
        let patch = hunk_stream(&[(1, 3, "a\nb\nc\n")]);
        let a = TokenFile::split(&orig.body, SplitMode::lines());
        let b = TokenFile::split(&patch.body, SplitMode::lines());

        let csl = pdiff(&a, &b, 1);
        // a, b, c of the hunk land on lines 2..5 of the original.
        for (ai, bi) in [(2, 1), (3, 2), (4, 3)] {
            assert!(covered(&csl, ai, bi), "expected {ai}<->{bi} in {csl:?}");
        }
        let last = csl.last().unwrap();
        assert_eq!((last.a, last.b, last.len), (a.len(), b.len(), 0));
    }

    #[test]
    fn independent_hunks_place_independently() {
        let orig = Stream::from("a\nb\nc\nd\ne\nf\ng\nh\n");
        let patch = hunk_stream(&[(1, 2, "a\nb\n"), (7, 2, "g\nh\n")]);
        let a = TokenFile::split(&orig.body, SplitMode::lines());
        let b = TokenFile::split(&patch.body, SplitMode::lines());

        let csl = pdiff(&a, &b, 2);
        assert!(covered(&csl, 1, 2), "b of hunk 1: {csl:?}");
        assert!(covered(&csl, 6, 4), "g of hunk 2: {csl:?}");
        // Placements stay ordered.
        let mut pa = 0;
        for e in &csl {
            assert!(e.a >= pa);
            pa = e.a + e.len;
        }
    }

    #[test]
    fn empty_patch_yields_terminator() {
        let orig = Stream::from("a\nb\n");
        let patch = hunk_stream(&[(1, 1, "zzz\n")]);
        let a = TokenFile::split(&orig.body, SplitMode::lines());
        let b = TokenFile::split(&patch.body, SplitMode::lines());
        let csl = pdiff(&a, &b, 1);
        let last = csl.last().unwrap();
        assert_eq!((last.a, last.b, last.len), (a.len(), b.len(), 0));
    }
}
