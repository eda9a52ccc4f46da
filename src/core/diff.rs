//! Longest-common-subsequence engine.
//!
//! Produces a common-subsequence list (CSL) for two token files: a sequence
//! of `(a, b, len)` runs where the files agree, strictly ordered and
//! terminated by a zero-length entry pointing one past both files.
//!
//! The search is the O(ND) algorithm of Myers ("An O(ND) Difference
//! Algorithm and its Variations", Algorithmica 1986), run forward only:
//! each furthest-reaching path records the diagonal on which it crossed the
//! midline, which gives the midpoint to recurse on. Storage is linear in
//! the sum of the two ranges.

use crate::core::tokens::TokenFile;

/// One run of common elements: `A[a..a+len)` equals `B[b..b+len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Csl {
    pub a: usize,
    pub b: usize,
    pub len: usize,
}

/// Furthest-reaching path state for one diagonal.
#[derive(Debug, Clone, Copy, Default)]
struct V {
    /// x location of the furthest reaching path of the current cost.
    x: isize,
    /// Diagonal on which the path crossed the midline.
    md: isize,
    /// Number of snakes seen on the path so far.
    l: isize,
}

/// Scratch array indexed by diagonal number `k = x - y`, which may be
/// negative.
pub(crate) struct Diagonals<T> {
    lo: isize,
    v: Vec<T>,
}

impl<T: Default + Clone> Diagonals<T> {
    pub(crate) fn new(lo: isize, hi: isize) -> Self {
        Self { lo, v: vec![T::default(); (hi - lo + 1) as usize] }
    }
}

impl<T> std::ops::Index<isize> for Diagonals<T> {
    type Output = T;
    fn index(&self, k: isize) -> &T {
        &self.v[(k - self.lo) as usize]
    }
}

impl<T> std::ops::IndexMut<isize> for Diagonals<T> {
    fn index_mut(&mut self, k: isize) -> &mut T {
        &mut self.v[(k - self.lo) as usize]
    }
}

/// Search the edit matrix from `(alo,blo)` to `(ahi,bhi)` (half-open) and
/// narrow the range to the snake that crosses the midline of the best path.
/// Returns the number of snakes on that path; zero means the rectangle
/// holds no common elements.
fn find_common(
    a: &TokenFile<'_>,
    b: &TokenFile<'_>,
    alop: &mut isize,
    ahip: &mut isize,
    blop: &mut isize,
    bhip: &mut isize,
    v: &mut Diagonals<V>,
) -> isize {
    let alo = *alop;
    let ahi = *ahip;
    let blo = *blop;
    let bhi = *bhip;

    let mid = (ahi + bhi + alo + blo) / 2;

    // Worst-case extra cost to reach the destination, assuming no more
    // snakes on the furthest-reaching path found so far. Extreme diagonals
    // whose best case cannot beat this are trimmed.
    let mut worst = (ahi - alo) + (bhi - blo);

    let mut klo = alo - blo;
    let mut khi = klo;
    v[klo] = V { x: alo, md: klo, l: 0 };

    loop {
        // Extend the longest snake on each live diagonal, recording
        // midline crossings. Arriving at the far corner ends the search.
        let mut k = klo;
        while k <= khi {
            let mut x = v[k].x;
            let mut y = x - k;
            assert!(y <= bhi, "diagonal escaped the matrix");

            let mut snake = 0;
            while x < ahi && y < bhi && a.matches(x as usize, b, y as usize) {
                x += 1;
                y += 1;
                snake = 1;
            }

            let cost = (ahi - x) + (bhi - y);
            if cost < worst {
                worst = cost;
            }

            if x + y >= mid && v[k].x + v[k].x - k <= mid {
                v[k].md = k;
            }

            v[k].x = x;
            v[k].l += snake;

            if cost == 0 {
                // Arrived; the recorded diagonal holds the midline snake.
                assert!(x == ahi);

                let mut x = (v[k].md + mid) / 2;
                let mut y = x - v[k].md;
                *alop = x;
                *blop = y;
                // The snake may start before the midline; the recursion
                // finds the full run, so only extend forward greedily here.
                while x < ahi && y < bhi && a.matches(x as usize, b, y as usize) {
                    x += 1;
                    y += 1;
                }
                *ahip = x;
                *bhip = y;
                return v[k].l;
            }
            k += 2;
        }

        // Increase cost by one: each interior diagonal takes the better of
        // an x-step from below or a y-step from above.
        let mut k = klo + 1;
        while k <= khi - 1 {
            if v[k - 1].x + 1 > ahi {
                v[k] = v[k + 1];
            } else if v[k + 1].x - k > bhi || v[k - 1].x + 1 >= v[k + 1].x {
                v[k] = v[k - 1];
                v[k].x += 1;
            } else {
                v[k] = v[k + 1];
            }
            k += 2;
        }

        // Extend or contract the extremes so both flip parity. An extreme
        // is kept only while its best-case remaining cost can still beat
        // the current worst case.
        let mut x = v[klo].x;
        let mut y = x - (klo - 1);
        let mut cost = ((ahi - x) - (bhi - y)).abs();
        klo -= 1;
        if y <= bhi && cost <= worst {
            v[klo] = v[klo + 1];
        } else {
            loop {
                klo += 2;
                x = v[klo].x;
                y = x - (klo - 1);
                cost = ((ahi - x) - (bhi - y)).abs();
                if cost <= worst {
                    break;
                }
            }
        }

        x = v[khi].x + 1;
        y = x - (khi + 1);
        cost = ((ahi - x) - (bhi - y)).abs();
        khi += 1;
        if x <= ahi && cost <= worst {
            v[khi] = v[khi - 1];
            v[khi].x += 1;
        } else {
            loop {
                khi -= 2;
                x = v[khi].x + 1;
                y = x - (khi + 1);
                cost = ((ahi - x) - (bhi - y)).abs();
                if cost <= worst {
                    break;
                }
            }
        }
    }
}

/// Append a snake, merging with the previous entry when contiguous.
fn csl_add(out: &mut Vec<Csl>, a: usize, b: usize, len: usize) {
    if len > 0 {
        if let Some(last) = out.last_mut() {
            if last.a + last.len == a && last.b + last.len == b {
                last.len += len;
                return;
            }
        }
    }
    out.push(Csl { a, b, len });
}

/// Divide and conquer around the midline snake, collecting snakes in order.
fn lcsl(
    a: &TokenFile<'_>,
    alo: isize,
    ahi: isize,
    b: &TokenFile<'_>,
    blo: isize,
    bhi: isize,
    out: &mut Vec<Csl>,
    v: &mut Diagonals<V>,
) {
    if ahi <= alo || bhi <= blo {
        return;
    }

    let mut alo1 = alo;
    let mut ahi1 = ahi;
    let mut blo1 = blo;
    let mut bhi1 = bhi;
    if find_common(a, b, &mut alo1, &mut ahi1, &mut blo1, &mut bhi1, v) == 0 {
        return;
    }

    lcsl(a, alo, alo1, b, blo, blo1, out, v);
    if ahi1 > alo1 {
        csl_add(out, alo1 as usize, blo1 as usize, (ahi1 - alo1) as usize);
    }
    lcsl(a, ahi1, ahi, b, bhi1, bhi, out, v);
}

/// Stabilise alignment around line boundaries.
///
/// If two common sequences are separated by only an add or a remove, and
/// the first sequence ends with the same token the gap ends with, shrink
/// the first and extend the second so the first may become empty. When such
/// a shuffle crossed a lone newline, shuffle forward again so the newline
/// ends the earlier sequence; common sequences then tend to be whole-line
/// units. The terminating zero-length entry is treated as extensible so
/// common context at end of file is preserved.
fn fixup(a: &TokenFile<'_>, b: &TokenFile<'_>, csl: &mut Vec<Csl>) {
    if csl.is_empty() {
        return;
    }

    let mut cur = 0usize;
    let mut lasteol: isize = -1;
    let mut found_end = false;

    while csl[cur].len > 0 {
        let nxt = cur + 1;
        if csl[nxt].len == 0 {
            found_end = true;
        }
        let c0 = csl[cur];
        let c1 = csl[nxt];

        // A single token inserted in B, or deleted from A, right after a
        // matching token.
        let insert_shuffle = c0.a + c0.len == c1.a
            && c0.b + c0.len != c1.b
            && c1.b > 0
            && b.matches(c0.b + c0.len - 1, b, c1.b - 1);
        let delete_shuffle = c0.b + c0.len == c1.b
            && c0.a + c0.len != c1.a
            && c1.a > 0
            && a.matches(c0.a + c0.len - 1, a, c1.a - 1);

        if insert_shuffle || delete_shuffle {
            let last = c0.a + c0.len - 1;
            if a.ends_line(last) && a.list[last].len == 1 && lasteol == -1 {
                lasteol = c1.a as isize - 1;
            }

            csl[nxt].a -= 1;
            csl[nxt].b -= 1;
            csl[nxt].len += 1;
            csl[cur].len -= 1;

            if csl[cur].len == 0 {
                lasteol = -1;
                csl.remove(cur);
                if found_end {
                    // The extended terminator is now a real entry; make
                    // sure a terminator still follows it.
                    if csl.last().map(|e| e.len) != Some(0) {
                        let e = csl[csl.len() - 1];
                        csl.push(Csl { a: e.a + e.len, b: e.b + e.len, len: 0 });
                    }
                } else if cur > 0 {
                    cur -= 1;
                }
            }
        } else {
            // If we shuffled back past an eol, shuffle forward to line up
            // with it, so the eol binds to the preceding line.
            if lasteol >= 0 {
                while (csl[nxt].a as isize) <= lasteol
                    && (csl[nxt].len > 1 || (found_end && csl[nxt].len > 0))
                {
                    csl[nxt].a += 1;
                    csl[nxt].b += 1;
                    csl[nxt].len -= 1;
                    csl[cur].len += 1;
                }
                lasteol = -1;
            }
            if found_end && csl[nxt].len > 0 {
                // Commit the extended terminator and re-terminate.
                let e = csl[nxt];
                if nxt + 1 == csl.len() {
                    csl.push(Csl { a: e.a + e.len, b: e.b + e.len, len: 0 });
                }
            }
            cur += 1;
        }
    }
    csl.truncate(cur + 1);
}

/// Sort order used to look elements up in the reference file: hash first,
/// sentinels compare equal among themselves, then length, then bytes.
fn element_cmp(
    f: &TokenFile<'_>,
    i: usize,
    g: &TokenFile<'_>,
    j: usize,
) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let (e1, e2) = (&f.list[i], &g.list[j]);
    match e1.hash.cmp(&e2.hash) {
        Ordering::Equal => {}
        other => return other,
    }
    if e1.len > 0 && e2.len > 0 && f.data[e1.start] == 0 && g.data[e2.start] == 0 {
        return Ordering::Equal;
    }
    match e1.len.cmp(&e2.len) {
        Ordering::Equal => f.canon(i).cmp(g.canon(j)),
        other => other,
    }
}

/// Collapse every run of two or more consecutive elements with no match in
/// `reference` down to one placeholder. This keeps the search space small;
/// the result is remapped to the full file afterwards.
fn filter_unique<'a>(f: &TokenFile<'a>, reference: &TokenFile<'_>) -> TokenFile<'a> {
    let mut order: Vec<usize> = (0..reference.len()).collect();
    order.sort_by(|&i, &j| element_cmp(reference, i, reference, j));

    let mut list = Vec::with_capacity(f.len());
    let mut run = 0usize;
    for fi in 0..f.len() {
        let mut lo = 0usize;
        let mut hi = order.len();
        while lo + 1 < hi {
            let mid = (lo + hi) / 2;
            if element_cmp(f, fi, reference, order[mid]).is_lt() {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        let matched = !order.is_empty() && f.matches(fi, reference, order[lo]);
        if matched {
            run = 0;
        } else {
            run += 1;
        }
        if run <= 1 {
            list.push(f.list[fi]);
        }
    }
    TokenFile { data: f.data, list }
}

/// Remap CSL indices from a reduced file back to the full file it was
/// filtered from, matching elements by their byte offset in the shared
/// stream.
fn remap(csl: &mut [Csl], which: usize, from: &TokenFile<'_>, to: &TokenFile<'_>) {
    let mut ti = 0usize;
    for entry in csl.iter_mut() {
        if entry.len == 0 {
            if which == 1 {
                entry.b = to.len();
            } else {
                entry.a = to.len();
            }
            return;
        }
        let fi = if which == 1 { entry.b } else { entry.a };
        while to.list[ti].start != from.list[fi].start {
            ti += 1;
            assert!(ti <= to.len(), "reduced element missing from full file");
        }
        if which == 1 {
            entry.b = ti;
        } else {
            entry.a = ti;
        }
    }
}

fn diff_reduced<'a>(a: &TokenFile<'a>, b: &TokenFile<'a>) -> Vec<Csl> {
    let af = filter_unique(a, b);
    let bf = filter_unique(b, a);

    let (an, bn) = (af.len() as isize, bf.len() as isize);
    let mut v = Diagonals::new(-bn - 1, an + 1);
    let mut out = Vec::new();
    lcsl(&af, 0, an, &bf, 0, bn, &mut out, &mut v);
    csl_add(&mut out, af.len(), bf.len(), 0);

    remap(&mut out, 0, &af, a);
    remap(&mut out, 1, &bf, b);
    out
}

/// Find the common-sub-list of two whole files. The final entry has
/// `len == 0` and points one past the end of both files.
pub fn diff(a: &TokenFile<'_>, b: &TokenFile<'_>) -> Vec<Csl> {
    let mut out = diff_reduced(a, b);
    fixup(a, b, &mut out);
    out
}

/// Find the common-sub-list of two subranges. No unique-token filtering:
/// ranges handed here are already small.
pub fn diff_partial(
    a: &TokenFile<'_>,
    b: &TokenFile<'_>,
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> Vec<Csl> {
    let (alo, ahi, blo, bhi) =
        (alo as isize, ahi as isize, blo as isize, bhi as isize);
    let mut v = Diagonals::new(alo - bhi - 1, ahi - blo + 1);
    let mut out = Vec::new();
    lcsl(a, alo, ahi, b, blo, bhi, &mut out, &mut v);
    csl_add(&mut out, ahi as usize, bhi as usize, 0);
    fixup(a, b, &mut out);
    out
}

/// Join two CSLs end to end, merging the boundary entries when contiguous.
/// The first list's terminator is dropped.
pub fn csl_join(mut c1: Vec<Csl>, c2: Vec<Csl>) -> Vec<Csl> {
    if c1.is_empty() {
        return c2;
    }
    if c2.is_empty() {
        return c1;
    }
    if c1.last().map(|e| e.len) == Some(0) {
        c1.pop();
    }
    let mut it = c2.into_iter().peekable();
    if let (Some(last), Some(first)) = (c1.last_mut(), it.peek()) {
        if first.len > 0
            && last.a + last.len == first.a
            && last.b + last.len == first.b
        {
            last.len += first.len;
            it.next();
        }
    }
    c1.extend(it);
    c1
}

/// Diff two synthetic patch streams hunk by hunk so the hunk headers stay
/// aligned. Falls back to a whole-file diff when either side is not a
/// patch.
pub fn diff_patch(a: &TokenFile<'_>, b: &TokenFile<'_>) -> Vec<Csl> {
    if a.is_empty() || b.is_empty() || !a.is_sentinel(0) || !b.is_sentinel(0) {
        return diff(a, b);
    }

    let mut ap = 0usize;
    let mut bp = 0usize;
    let mut csl: Vec<Csl> = Vec::new();
    while ap < a.len() && bp < b.len() {
        let alo = ap;
        let blo = bp;
        loop {
            ap += 1;
            if ap >= a.len() || a.is_sentinel(ap) {
                break;
            }
        }
        loop {
            bp += 1;
            if bp >= b.len() || b.is_sentinel(bp) {
                break;
            }
        }
        let cs = diff_partial(a, b, alo, ap, blo, bp);
        csl = csl_join(csl, cs);
    }
    csl
}
