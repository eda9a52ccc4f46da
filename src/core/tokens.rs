//! Byte streams and their tokenisation into comparable elements.
//!
//! A `Stream` owns raw bytes; a `TokenFile` slices it into an ordered list
//! of `Element`s (lines or words). Each element records, besides its
//! canonical bytes, any leading whitespace it absorbed (`prefix`) and the
//! full printed span (`plen`), so concatenating the printed spans of all
//! elements reproduces the stream byte-for-byte.
//!
//! Synthetic streams built from patches carry 20-byte hunk sentinels that
//! begin with a NUL; sentinels always match each other when their chunk
//! numbers agree and are treated as ending a line.

use xxhash_rust::xxh64::xxh64;

/// Length of a hunk-boundary sentinel: NUL, three 5-digit numbers, newline, NUL.
pub const SENTINEL_LEN: usize = 20;

/// An owning byte buffer backing a set of elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Stream {
    pub body: Vec<u8>,
}

impl Stream {
    pub fn new(body: Vec<u8>) -> Self {
        Self { body }
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

impl From<Vec<u8>> for Stream {
    fn from(body: Vec<u8>) -> Self {
        Self { body }
    }
}

impl From<&str> for Stream {
    fn from(s: &str) -> Self {
        Self { body: s.as_bytes().to_vec() }
    }
}

/// Comparison granularity for tokenisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Lines,
    Words,
}

/// Tokenisation mode: granularity plus modifiers.
#[derive(Debug, Clone, Copy)]
pub struct SplitMode {
    pub granularity: Granularity,
    /// Collapse blank runs into prefix/printed spans so they are invisible
    /// to comparison.
    pub ignore_blanks: bool,
    /// Any run of non-blank, non-newline bytes is a single word.
    pub whole_word: bool,
}

impl SplitMode {
    pub fn words() -> Self {
        Self { granularity: Granularity::Words, ignore_blanks: false, whole_word: false }
    }

    pub fn lines() -> Self {
        Self { granularity: Granularity::Lines, ignore_blanks: false, whole_word: false }
    }

    pub fn with_ignore_blanks(mut self, yes: bool) -> Self {
        self.ignore_blanks = yes;
        self
    }

    pub fn with_whole_word(mut self, yes: bool) -> Self {
        self.whole_word = yes;
        self
    }
}

/// One word or line of a tokenised stream.
///
/// `start`/`len` bound the canonical bytes used for matching. `prefix`
/// bytes immediately before `start` and `plen` bytes from `start` form the
/// printed span; under `ignore_blanks` these absorb surrounding blanks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Element {
    pub start: usize,
    pub len: usize,
    pub prefix: usize,
    pub plen: usize,
    pub hash: u64,
}

/// A tokenised view of a stream: the element list plus the backing bytes.
#[derive(Debug, Clone)]
pub struct TokenFile<'a> {
    pub data: &'a [u8],
    pub list: Vec<Element>,
}

impl<'a> TokenFile<'a> {
    /// Tokenise `data` according to `mode`.
    pub fn split(data: &'a [u8], mode: SplitMode) -> Self {
        Self { data, list: split_elements(data, mode) }
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Canonical bytes of element `i`.
    pub fn canon(&self, i: usize) -> &'a [u8] {
        let e = &self.list[i];
        &self.data[e.start..e.start + e.len]
    }

    /// Printed span of element `i`: prefix plus printed bytes.
    pub fn printed(&self, i: usize) -> &'a [u8] {
        let e = &self.list[i];
        &self.data[e.start - e.prefix..e.start + e.plen]
    }

    /// True when element `i` is a hunk-boundary sentinel.
    pub fn is_sentinel(&self, i: usize) -> bool {
        let e = &self.list[i];
        e.len > 0 && self.data[e.start] == 0
    }

    /// The parsed (chunk, start, len) triple of a sentinel element.
    pub fn sentinel_fields(&self, i: usize) -> Option<(usize, usize, usize)> {
        if self.is_sentinel(i) { parse_sentinel(self.canon(i)) } else { None }
    }

    /// An element ends a line if its canonical bytes end in a newline, or
    /// it is a hunk sentinel. Line-mode elements always end a line.
    pub fn ends_line(&self, i: usize) -> bool {
        let e = &self.list[i];
        if e.len == SENTINEL_LEN && self.data[e.start] == 0 {
            return true;
        }
        e.len > 0 && self.data[e.start + e.len - 1] == b'\n'
    }

    /// Element equality: hash shortcut, then bytes. Two sentinels match
    /// whenever their chunk numbers (their hashes) agree, regardless of the
    /// line numbers they carry.
    pub fn matches(&self, i: usize, other: &TokenFile<'_>, j: usize) -> bool {
        let a = &self.list[i];
        let b = &other.list[j];
        if a.hash != b.hash {
            return false;
        }
        if a.len > 0 && b.len > 0 && self.data[a.start] == 0 && other.data[b.start] == 0 {
            return true;
        }
        a.len == b.len && self.canon(i) == other.canon(j)
    }
}

/// Append a hunk sentinel to a synthetic stream.
///
/// Layout is fixed at 20 bytes: `\0` + `"NNNNN SSSSS LLLLL\n"` + `\0`.
pub fn push_sentinel(out: &mut Vec<u8>, chunk: usize, start: usize, len: usize) {
    out.push(0);
    let text = format!("{chunk:5} {start:5} {len:5}\n");
    debug_assert_eq!(text.len(), SENTINEL_LEN - 2);
    out.extend_from_slice(text.as_bytes());
    out.push(0);
}

/// Parse the three numbers of a sentinel's canonical bytes.
pub fn parse_sentinel(bytes: &[u8]) -> Option<(usize, usize, usize)> {
    if bytes.first() != Some(&0) {
        return None;
    }
    let mut nums = [0usize; 3];
    let mut pos = 1;
    for slot in &mut nums {
        while pos < bytes.len() && bytes[pos] == b' ' {
            pos += 1;
        }
        let begin = pos;
        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
            pos += 1;
        }
        if pos == begin {
            return None;
        }
        *slot = std::str::from_utf8(&bytes[begin..pos]).ok()?.parse().ok()?;
    }
    Some((nums[0], nums[1], nums[2]))
}

/// Leading decimal number of a sentinel body, used as its hash so that
/// corresponding hunks in the two synthetic streams compare equal.
fn sentinel_chunk(bytes: &[u8]) -> u64 {
    let mut pos = 1;
    while pos < bytes.len() && bytes[pos] == b' ' {
        pos += 1;
    }
    let mut n = 0u64;
    while pos < bytes.len() && bytes[pos].is_ascii_digit() {
        n = n * 10 + u64::from(bytes[pos] - b'0');
        pos += 1;
    }
    n
}

fn is_blank(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn split_elements(body: &[u8], mode: SplitMode) -> Vec<Element> {
    let end = body.len();
    let by_word = mode.granularity == Granularity::Words;
    let mut list: Vec<Element> = Vec::new();
    let mut start = 0usize;
    let mut sol = true; // at start of a line

    while start < end {
        let mut cp = start;
        let mut prefix = 0usize;

        if sol && mode.ignore_blanks {
            // A fully blank line preceding this element is absorbed into
            // its prefix.
            while cp < end && (is_blank(body[cp]) || body[cp] == b'\n') {
                if body[cp] == b'\n' {
                    prefix += cp + 1 - start;
                    start = cp + 1;
                }
                sol = body[cp] == b'\n';
                cp += 1;
            }
            cp = start;
        }
        if by_word && mode.ignore_blanks {
            // Leading blanks on the line attach to the following word.
            while cp < end && is_blank(body[cp]) {
                prefix += 1;
                cp += 1;
                sol = false;
            }
            start = cp;
        }

        if start >= end {
            // The remainder of the stream was all blank. Keep the bytes
            // printable by folding them into the previous element, or into
            // a single empty element when the stream held nothing else.
            if let Some(last) = list.last_mut() {
                last.plen += prefix;
            } else {
                list.push(Element {
                    start: end - prefix,
                    len: 0,
                    prefix: 0,
                    plen: prefix,
                    hash: xxh64(b"", 0),
                });
            }
            break;
        }

        if body[cp] == 0 && cp + SENTINEL_LEN - 1 < end {
            // Hunk sentinel: fixed header plus any trailing bytes up to the
            // closing NUL.
            cp += SENTINEL_LEN - 1;
            while cp < end && body[cp] != 0 {
                cp += 1;
            }
            if cp < end {
                cp += 1;
            }
        } else {
            match mode.granularity {
                Granularity::Lines => {
                    while cp < end && body[cp] != b'\n' {
                        cp += 1;
                    }
                    if cp < end {
                        cp += 1;
                    }
                    sol = true;
                }
                Granularity::Words => {
                    if is_blank(body[cp]) {
                        cp += 1;
                        while cp < end && is_blank(body[cp]) {
                            cp += 1;
                        }
                    } else if (mode.whole_word && body[cp] != b'\n') || is_word_byte(body[cp]) {
                        cp += 1;
                        while cp < end
                            && ((mode.whole_word
                                && !is_blank(body[cp])
                                && body[cp] != b'\n')
                                || is_word_byte(body[cp]))
                        {
                            cp += 1;
                        }
                    } else {
                        cp += 1;
                    }
                    sol = body[cp - 1] == b'\n';
                }
            }
        }
        let mut cp2 = cp;

        if sol && mode.ignore_blanks {
            // Absorb whole blank lines that follow into the printed span.
            let mut cp3 = cp2;
            while cp3 < end && (is_blank(body[cp3]) || body[cp3] == b'\n') {
                if body[cp3] == b'\n' {
                    cp2 = cp3 + 1;
                }
                sol = body[cp3] == b'\n';
                cp3 += 1;
            }
        }
        if by_word && mode.ignore_blanks && body[start] != 0 && body[start] != b'\n' {
            // A word also absorbs trailing blanks up to and including the
            // next newline.
            while cp2 < end && (is_blank(body[cp2]) || body[cp2] == b'\n') {
                cp2 += 1;
                if body[cp2 - 1] == b'\n' {
                    sol = true;
                    break;
                }
                sol = false;
            }
        }

        let canon = &body[start..cp];
        let hash = if body[start] == 0 { sentinel_chunk(canon) } else { xxh64(canon, 0) };
        list.push(Element { start, len: cp - start, prefix, plen: cp2 - start, hash });
        start = cp2;
    }
    list
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(data: &[u8]) -> Vec<String> {
        let f = TokenFile::split(data, SplitMode::words());
        (0..f.len()).map(|i| String::from_utf8_lossy(f.canon(i)).into_owned()).collect()
    }

    fn round_trip(data: &[u8], mode: SplitMode) {
        let f = TokenFile::split(data, mode);
        let mut out = Vec::new();
        for i in 0..f.len() {
            out.extend_from_slice(f.printed(i));
        }
        assert_eq!(out, data, "reconstruction mismatch for {:?}", mode);
    }

    #[test]
    fn word_rule_splits_ident_blank_punct() {
        assert_eq!(
            words(b"foo_1 (bar)\n"),
            vec!["foo_1", " ", "(", "bar", ")", "\n"]
        );
    }

    #[test]
    fn blank_runs_are_single_words() {
        assert_eq!(words(b"a  \t b"), vec!["a", "  \t ", "b"]);
    }

    #[test]
    fn line_mode_keeps_newlines_and_final_fragment() {
        let f = TokenFile::split(b"one\ntwo\nthree", SplitMode::lines());
        assert_eq!(f.len(), 3);
        assert_eq!(f.canon(0), b"one\n");
        assert_eq!(f.canon(2), b"three");
        assert!(f.ends_line(0));
        assert!(!f.ends_line(2));
    }

    #[test]
    fn whole_word_groups_non_space() {
        let f = TokenFile::split(
            b"a+b c\n",
            SplitMode::words().with_whole_word(true),
        );
        let toks: Vec<_> = (0..f.len()).map(|i| f.canon(i).to_vec()).collect();
        assert_eq!(toks, vec![b"a+b".to_vec(), b" ".to_vec(), b"c".to_vec(), b"\n".to_vec()]);
    }

    #[test]
    fn ignore_blanks_attaches_prefix_and_extension() {
        let mode = SplitMode::words().with_ignore_blanks(true);
        let f = TokenFile::split(b"  x\t\n", mode);
        assert_eq!(f.len(), 1);
        let e = &f.list[0];
        assert_eq!(f.canon(0), b"x");
        assert_eq!(e.prefix, 2);
        assert_eq!(f.printed(0), b"  x\t\n");
    }

    #[test]
    fn ignore_blanks_absorbs_blank_lines() {
        let mode = SplitMode::words().with_ignore_blanks(true);
        let f = TokenFile::split(b"x\n\n\ny\n", mode);
        let canon: Vec<_> = (0..f.len()).map(|i| f.canon(i).to_vec()).collect();
        assert_eq!(canon, vec![b"x".to_vec(), b"y".to_vec()]);
        round_trip(b"x\n\n\ny\n", mode);
    }

    #[test]
    fn round_trips_under_all_modes() {
        let samples: &[&[u8]] = &[
            b"",
            b"\n",
            b"  \n\t\n",
            b"plain text, no newline",
            b"a b\tc\nd\n\n e \n",
            b"trailing blanks  ",
            b"\n\nleading blanks",
        ];
        for data in samples {
            for granularity in [Granularity::Lines, Granularity::Words] {
                for ignore_blanks in [false, true] {
                    for whole_word in [false, true] {
                        round_trip(
                            data,
                            SplitMode { granularity, ignore_blanks, whole_word },
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn sentinels_parse_and_match_by_chunk() {
        let mut s1 = Vec::new();
        push_sentinel(&mut s1, 3, 10, 4);
        s1.extend_from_slice(b"body\n");
        let mut s2 = Vec::new();
        push_sentinel(&mut s2, 3, 99, 7);
        s2.extend_from_slice(b"body\n");

        let f1 = TokenFile::split(&s1, SplitMode::words());
        let f2 = TokenFile::split(&s2, SplitMode::words());
        assert!(f1.is_sentinel(0));
        assert_eq!(f1.sentinel_fields(0), Some((3, 10, 4)));
        assert_eq!(f1.list[0].len, SENTINEL_LEN);
        assert!(f1.ends_line(0));
        // Differing line numbers, same chunk: still a match.
        assert!(f1.matches(0, &f2, 0));
    }
}
