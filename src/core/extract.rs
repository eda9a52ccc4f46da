//! Extract one branch of a patch or merge file.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::core::split::{split_merge, split_patch};
use crate::infra::io::load_file;

/// Write the selected branch (`1`, `2` or `3`) of the given patch or merge
/// file to `out`. Returns the process exit status.
pub fn run<W: Write>(path: &Path, is_patch: bool, which: u8, out: &mut W) -> Result<i32> {
    let stream = load_file(path)?;

    let body = if is_patch {
        let sp = split_patch(&stream.body)
            .with_context(|| format!("cannot parse patch {}", path.display()))?;
        if sp.chunks == 0 {
            eprintln!("wiggle: no chunk found in patch: {}", path.display());
            return Ok(0);
        }
        match which {
            1 => sp.before.body,
            2 => sp.after.body,
            _ => bail!("cannot extract -3 from a patch"),
        }
    } else {
        let sm = split_merge(&stream.body)
            .with_context(|| format!("merge file {} looks bad", path.display()))?;
        match which {
            1 => sm.orig.body,
            2 => sm.before.body,
            _ => sm.after.body,
        }
    };

    out.write_all(&body).context("write failed")?;
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn extracts_each_side_of_a_merge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.txt");
        fs::write(
            &path,
            "h\n<<<<<<< a\nours\n||||||| b\nbase\n=======\ntheirs\n>>>>>>> c\n",
        )
        .unwrap();

        let mut out = Vec::new();
        run(&path, false, 1, &mut out).unwrap();
        assert_eq!(out, b"h\nours\n");

        let mut out = Vec::new();
        run(&path, false, 2, &mut out).unwrap();
        assert_eq!(out, b"h\nbase\n");

        let mut out = Vec::new();
        run(&path, false, 3, &mut out).unwrap();
        assert_eq!(out, b"h\ntheirs\n");
    }

    #[test]
    fn patch_extraction_keeps_hunk_sentinels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.diff");
        fs::write(&path, "@@ -1,2 +1,2 @@\n a\n-b\n+B\n").unwrap();

        let mut out = Vec::new();
        run(&path, true, 1, &mut out).unwrap();
        assert_eq!(out[0], 0);
        assert!(out.ends_with(b"a\nb\n"));
    }
}
