//! File loading and in-place replacement.
//!
//! Inputs are read whole: the later stages index freely into the stream,
//! and `-` reads stdin. Replacement writes the merge result to a tempfile
//! sibling and renames it into place only after the merge completed, with
//! the original preserved as `<name>.porig` unless backups are disabled.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::core::tokens::Stream;

/// Read a whole file into a stream; `-` reads stdin.
pub fn load_file(name: &Path) -> Result<Stream> {
    if name.as_os_str() == "-" {
        let mut body = Vec::new();
        std::io::stdin()
            .read_to_end(&mut body)
            .context("failed to read stdin")?;
        return Ok(Stream::new(body));
    }
    if name.is_dir() {
        bail!("{} is a directory", name.display());
    }
    let body =
        fs::read(name).with_context(|| format!("cannot load file '{}'", name.display()))?;
    Ok(Stream::new(body))
}

/// Read one byte range of a file, for applying a single file's share of a
/// multi-file patch.
pub fn load_segment(name: &Path, start: usize, end: usize) -> Result<Stream> {
    let body =
        fs::read(name).with_context(|| format!("cannot load file '{}'", name.display()))?;
    if end > body.len() || start > end {
        bail!(
            "segment {}..{} out of bounds for '{}'",
            start,
            end,
            name.display()
        );
    }
    Ok(Stream::new(body[start..end].to_vec()))
}

/// The backup path used by `--replace`.
pub fn backup_name(orig: &Path) -> PathBuf {
    let mut name = orig.as_os_str().to_owned();
    name.push(".porig");
    PathBuf::from(name)
}

/// Refuse to replace a file whose backup already exists; a leftover
/// `.porig` means an earlier run was not cleaned up.
pub fn check_backup_absent(orig: &Path) -> Result<()> {
    let backup = backup_name(orig);
    if backup.exists() {
        bail!("{} already exists", backup.display());
    }
    Ok(())
}

/// Atomically replace `orig` with `content`: write a tempfile in the same
/// directory, move the original aside to `.porig` (unless `no_backup`),
/// and rename the tempfile into place.
pub fn replace_file(orig: &Path, content: &[u8], no_backup: bool) -> Result<()> {
    let dir = orig
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(orig.file_name().unwrap_or(orig.as_os_str()))
        .tempfile_in(dir)
        .with_context(|| format!("could not create temporary file for {}", orig.display()))?;
    std::io::Write::write_all(&mut tmp, content)
        .with_context(|| format!("failed to write replacement for {}", orig.display()))?;

    if !no_backup {
        fs::rename(orig, backup_name(orig))
            .with_context(|| format!("failed to back up {}", orig.display()))?;
    }
    tmp.persist(orig)
        .with_context(|| format!("failed to move new file into place for {}", orig.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_keeps_a_porig_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"old\n").unwrap();

        replace_file(&path, b"new\n", false).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new\n");
        assert_eq!(fs::read(backup_name(&path)).unwrap(), b"old\n");
    }

    #[test]
    fn replace_without_backup_leaves_no_porig() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"old\n").unwrap();

        replace_file(&path, b"new\n", true).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new\n");
        assert!(!backup_name(&path).exists());
    }

    #[test]
    fn existing_backup_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"x\n").unwrap();
        fs::write(backup_name(&path), b"stale\n").unwrap();
        assert!(check_backup_absent(&path).is_err());
    }

    #[test]
    fn segment_load_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        fs::write(&path, b"0123456789").unwrap();
        assert_eq!(load_segment(&path, 2, 5).unwrap().body, b"234");
        assert!(load_segment(&path, 5, 20).is_err());
    }
}
