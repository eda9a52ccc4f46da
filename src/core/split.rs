//! Split patch and merge files into their constituent streams.
//!
//! `split_patch` turns a unified or context diff into two synthetic
//! streams, *before* and *after*; each hunk contributes a 20-byte sentinel
//! to both streams so later stages can keep hunks aligned. `split_merge`
//! splits `diff3 -m` / `merge -A` output into the three underlying files.

use memchr::memchr;
use thiserror::Error;

use crate::core::tokens::{Stream, push_sentinel};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("bad context patch at line {0}")]
    BadContext(usize),
    #[error("bad unified patch at line {0}")]
    BadUnified(usize),
    #[error("unterminated conflict in merge file")]
    UnterminatedMerge,
}

/// The two sides of a split patch, plus the number of hunks found. Zero
/// hunks means the input did not look like a patch at all.
#[derive(Debug, PartialEq)]
pub struct SplitPatch {
    pub before: Stream,
    pub after: Stream,
    pub chunks: usize,
}

/// The three files reconstructed from a merge file.
#[derive(Debug, PartialEq)]
pub struct SplitMerge {
    pub orig: Stream,
    pub before: Stream,
    pub after: Stream,
}

/// Byte offset just past the newline ending the line at `pos` (or end of
/// data).
fn line_end(data: &[u8], pos: usize) -> usize {
    match memchr(b'\n', &data[pos..]) {
        Some(nl) => pos + nl + 1,
        None => data.len(),
    }
}

fn copyline(out: &mut Vec<u8>, data: &[u8], pos: usize) -> usize {
    let end = line_end(data, pos);
    out.extend_from_slice(&data[pos..end]);
    end
}

/// Parse a decimal number, skipping leading blanks, scanf-style.
fn parse_int(line: &[u8], pos: usize) -> Option<(i64, usize)> {
    let mut pos = pos;
    while pos < line.len() && (line[pos] == b' ' || line[pos] == b'\t') {
        pos += 1;
    }
    let neg = pos < line.len() && line[pos] == b'-';
    if neg {
        pos += 1;
    }
    let begin = pos;
    let mut n: i64 = 0;
    while pos < line.len() && line[pos].is_ascii_digit() {
        n = n * 10 + i64::from(line[pos] - b'0');
        pos += 1;
    }
    if pos == begin {
        return None;
    }
    Some((if neg { -n } else { n }, pos))
}

/// Parse a unified range token (`N` or `N,M`; trailing junk tolerated).
/// The count defaults to 1.
fn parse_range(token: &[u8]) -> Option<(i64, i64)> {
    let (start, pos) = parse_int(token, 0)?;
    if token.get(pos) == Some(&b',') {
        if let Some((cnt, _)) = parse_int(token, pos + 1) {
            return Some((start, cnt));
        }
    }
    Some((start, 1))
}

fn skip_blanks(line: &[u8], mut pos: usize) -> usize {
    while pos < line.len() && (line[pos] == b' ' || line[pos] == b'\t') {
        pos += 1;
    }
    pos
}

fn take_word(line: &[u8], pos: usize) -> (&[u8], usize) {
    let mut end = pos;
    while end < line.len() && !line[end].is_ascii_whitespace() {
        end += 1;
    }
    (&line[pos..end], end)
}

/// `@@ -l[,c] +l[,c] @@`. The ranges are whitespace-delimited words;
/// trailing text after them is not required, so headers mangled by mail
/// software still parse.
fn parse_unified_header(line: &[u8]) -> Option<(i64, i64, i64, i64)> {
    let rest = line.strip_prefix(b"@@")?;
    let pos = skip_blanks(rest, 0);
    if rest.get(pos) != Some(&b'-') {
        return None;
    }
    let (word1, pos) = take_word(rest, pos + 1);
    let (a, acnt) = parse_range(word1)?;
    let pos = skip_blanks(rest, pos);
    if rest.get(pos) != Some(&b'+') {
        return None;
    }
    let (word2, _) = take_word(rest, pos + 1);
    let (c, bcnt) = parse_range(word2)?;
    Some((a, acnt, c, bcnt))
}

/// `*** l,c ****` or `--- l,c ----`, depending on `lead`.
fn parse_context_header(line: &[u8], lead: &[u8]) -> Option<(i64, i64)> {
    let rest = line.strip_prefix(lead)?;
    let (a, pos) = parse_int(rest, 0)?;
    if rest.get(pos) != Some(&b',') {
        return None;
    }
    let (b, _) = parse_int(rest, pos + 1)?;
    Some((a, b))
}

/// Split a unified or context diff into before/after streams.
pub fn split_patch(data: &[u8]) -> Result<SplitPatch, ParseError> {
    let mut r1: Vec<u8> = Vec::with_capacity(data.len());
    let mut r2: Vec<u8> = Vec::with_capacity(data.len());
    let mut chunks = 0usize;

    // 0 not in a patch, 1/2 first and second half of a context hunk,
    // 3 inside a unified hunk.
    let mut state = 0u8;
    let mut acnt: i64 = 0;
    let mut bcnt: i64 = 0;
    let mut lineno = 0usize;
    let mut cp = 0usize;

    while cp < data.len() {
        lineno += 1;
        let eol = line_end(data, cp);
        let line = &data[cp..eol];
        match state {
            0 => {
                let mut a = 0i64;
                let mut c = 0i64;
                if let Some((ua, uac, uc, ubc)) = parse_unified_header(line) {
                    a = ua;
                    acnt = uac;
                    c = uc;
                    bcnt = ubc;
                    state = 3;
                } else if let Some((ca, cb)) = parse_context_header(line, b"***") {
                    a = ca;
                    acnt = cb - ca + 1;
                    state = 1;
                } else if let Some((cc, cd)) = parse_context_header(line, b"---") {
                    c = cc;
                    bcnt = cd - cc + 1;
                    state = 2;
                }
                cp = eol;
                if state == 1 || state == 3 {
                    chunks += 1;
                    push_sentinel(&mut r1, chunks, a.max(0) as usize, acnt.max(0) as usize);
                }
                if state == 2 || state == 3 {
                    push_sentinel(&mut r2, chunks, c.max(0) as usize, bcnt.max(0) as usize);
                }
            }
            1 | 2 => {
                let ok = line.len() >= 2
                    && matches!(line[0], b' ' | b'!' | b'-' | b'+')
                    && line[1] == b' ';
                if !ok {
                    return Err(ParseError::BadContext(lineno));
                }
                if state == 1 {
                    cp = copyline(&mut r1, data, cp + 2);
                    acnt -= 1;
                    if acnt == 0 {
                        state = 0;
                    }
                } else {
                    cp = copyline(&mut r2, data, cp + 2);
                    bcnt -= 1;
                    if bcnt == 0 {
                        state = 0;
                    }
                }
            }
            _ => {
                match line.first() {
                    Some(b' ') => {
                        copyline(&mut r1, data, cp + 1);
                        cp = copyline(&mut r2, data, cp + 1);
                        acnt -= 1;
                        bcnt -= 1;
                    }
                    Some(b'-') => {
                        cp = copyline(&mut r1, data, cp + 1);
                        acnt -= 1;
                    }
                    Some(b'+') => {
                        cp = copyline(&mut r2, data, cp + 1);
                        bcnt -= 1;
                    }
                    _ => return Err(ParseError::BadUnified(lineno)),
                }
                if acnt <= 0 && bcnt <= 0 {
                    state = 0;
                }
            }
        }
    }

    Ok(SplitPatch { before: Stream::new(r1), after: Stream::new(r2), chunks })
}

/// True for a column-0 run of exactly seven `ch` bytes followed by a space
/// or end of line.
fn is_marker(line: &[u8], ch: u8) -> bool {
    line.len() >= 8 && line[..7].iter().all(|&b| b == ch) && (line[7] == b' ' || line[7] == b'\n')
}

/// Split `diff3 -m` output back into the three files it merged.
///
/// diff3 prints a short form when the first and third sections agree: no
/// `|||||||` line, and the common text appears once after `=======`.
/// States 4 and 5 track that case.
pub fn split_merge(data: &[u8]) -> Result<SplitMerge, ParseError> {
    let mut r1: Vec<u8> = Vec::with_capacity(data.len());
    let mut r2: Vec<u8> = Vec::with_capacity(data.len());
    let mut r3: Vec<u8> = Vec::with_capacity(data.len());

    // 0 outside any conflict; 1/2/3 inside the first/second/third file of
    // a conflict; 4 in the second file expecting the short form; 5 in the
    // combined first-and-third section.
    let mut state = 0u8;
    let mut cp = 0usize;

    while cp < data.len() {
        let eol = line_end(data, cp);
        let line = &data[cp..eol];
        match state {
            0 => {
                if is_marker(line, b'<') {
                    state = 1;
                    cp = eol;
                    // Peek ahead: a ======= before any ||||||| or >>>>>>>
                    // means the diff3 short form.
                    let mut peek = cp;
                    while peek < data.len() {
                        let pend = line_end(data, peek);
                        let pline = &data[peek..pend];
                        if pline.len() >= 8 && (pline[7] == b' ' || pline[7] == b'\n') {
                            if is_marker(pline, b'|') || is_marker(pline, b'>') {
                                break;
                            }
                            if is_marker(pline, b'=') {
                                state = 4;
                                break;
                            }
                        }
                        peek = pend;
                    }
                } else {
                    copyline(&mut r1, data, cp);
                    copyline(&mut r2, data, cp);
                    cp = copyline(&mut r3, data, cp);
                }
            }
            1 => {
                if is_marker(line, b'|') {
                    state = 2;
                    cp = eol;
                } else {
                    cp = copyline(&mut r1, data, cp);
                }
            }
            2 => {
                if is_marker(line, b'=') {
                    state = 3;
                    cp = eol;
                } else {
                    cp = copyline(&mut r2, data, cp);
                }
            }
            3 => {
                if is_marker(line, b'>') {
                    state = 0;
                    cp = eol;
                } else {
                    cp = copyline(&mut r3, data, cp);
                }
            }
            4 => {
                if is_marker(line, b'=') {
                    state = 5;
                    cp = eol;
                } else {
                    cp = copyline(&mut r2, data, cp);
                }
            }
            _ => {
                if is_marker(line, b'>') {
                    state = 0;
                    cp = eol;
                } else {
                    copyline(&mut r1, data, cp);
                    cp = copyline(&mut r3, data, cp);
                }
            }
        }
    }

    if state != 0 {
        return Err(ParseError::UnterminatedMerge);
    }
    Ok(SplitMerge {
        orig: Stream::new(r1),
        before: Stream::new(r2),
        after: Stream::new(r3),
    })
}
