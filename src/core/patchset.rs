//! Locate the per-file pieces of a multi-file patch.
//!
//! A patch produced by `diff -r` or git concatenates per-file diffs, each
//! introduced by a `+++ ` header. For `-p` mode each target file is
//! patched separately, so all that is needed here is the file name and the
//! byte range of the patch that applies to it, plus the strip count that
//! turns patch path names into real ones.

use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use memchr::memmem;

/// One file named by the patch: the (unstripped) name from the `+++ `
/// line and the byte range of the hunks that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchEntry {
    pub file: String,
    pub start: usize,
    pub end: usize,
}

/// Scan a patch for `+++ ` headers and record, for each named file, the
/// range of the patch body belonging to it (up to the next `--- ` header
/// or end of input).
pub fn parse_patch(data: &[u8]) -> Vec<PatchEntry> {
    let plus = memmem::Finder::new(b"\n+++ ");
    let minus = memmem::Finder::new(b"\n--- ");
    let mut entries = Vec::new();
    let mut pos = 0usize;

    // Treat a header on the very first line like one preceded by a newline.
    let first_at = |data: &[u8], pos: usize, pat: &[u8]| -> Option<usize> {
        if pos == 0 && data.starts_with(&pat[1..]) { Some(0) } else { None }
    };

    loop {
        let hdr = match first_at(data, pos, b"\n+++ ")
            .or_else(|| plus.find(&data[pos..]).map(|i| pos + i + 1))
        {
            Some(h) => h,
            None => break,
        };
        // Name runs to the first tab, space or newline.
        let name_start = hdr + 4;
        let mut name_end = name_start;
        while name_end < data.len() && !matches!(data[name_end], b'\t' | b' ' | b'\n') {
            name_end += 1;
        }
        let mut file = String::from_utf8_lossy(&data[name_start..name_end]).into_owned();
        // Leading '/' are bad.
        while file.starts_with('/') {
            file.remove(0);
        }

        let body_start = match memchr::memchr(b'\n', &data[name_end..]) {
            Some(nl) => name_end + nl + 1,
            None => data.len(),
        };
        let body_end = minus
            .find(&data[body_start..])
            .map(|i| body_start + i + 1)
            .unwrap_or(data.len());

        if !file.is_empty() {
            entries.push(PatchEntry { file, start: body_start, end: body_end });
        }
        pos = body_end;
        if body_start >= data.len() {
            break;
        }
    }
    entries
}

/// How many leading path components must be stripped from `file` before it
/// names something that exists below the current directory.
fn get_strip(file: &str) -> Option<usize> {
    let mut rest = file;
    let mut strip = 0;
    while !rest.is_empty() {
        if Path::new(rest).exists() {
            return Some(strip);
        }
        strip += 1;
        match rest.find('/') {
            Some(i) => rest = rest[i..].trim_start_matches('/'),
            None => break,
        }
    }
    None
}

fn strip_components(file: &str, strip: usize) -> Option<&str> {
    let mut rest = file;
    for _ in 0..strip {
        let i = rest.find('/')?;
        rest = rest[i..].trim_start_matches('/');
    }
    Some(rest)
}

/// Resolve each entry's name to an on-disk path, stripping `strip` leading
/// components. With no explicit count, guess by probing the first few
/// entries.
pub fn set_prefix(entries: &[PatchEntry], strip: Option<usize>) -> Result<Vec<PathBuf>> {
    let strip = match strip {
        Some(n) => n,
        None => match entries.iter().take(4).find_map(|e| get_strip(&e.file)) {
            Some(n) => n,
            None => bail!("cannot find files to patch: please specify --strip"),
        },
    };
    let mut paths = Vec::with_capacity(entries.len());
    for e in entries {
        match strip_components(&e.file, strip) {
            Some(p) if !p.is_empty() => paths.push(PathBuf::from(p)),
            _ => bail!("cannot strip {} segments from {}", strip, e.file),
        }
    }
    Ok(paths)
}
