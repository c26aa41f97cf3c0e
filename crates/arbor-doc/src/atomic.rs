//! Atomic file writes.
//!
//! Content is written to a sibling file with a `.tmp` extension, flushed to
//! disk and then renamed over the target. Renames within one filesystem are
//! atomic on POSIX systems, so readers see either the old document or the
//! new one, never a partial write. A crash may leave the temporary file
//! behind; the original stays intact.

use std::ffi::OsString;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Atomically replaces `path` with `contents`.
///
/// # Errors
///
/// Returns an error if the temporary file cannot be created or written, or
/// if the rename fails. On failure the temporary file is removed on a
/// best-effort basis and the target is left unchanged.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let temp_path = make_temp_path(path);

    if let Err(e) = write_to_temp_file(&temp_path, contents) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    if let Err(e) = std::fs::rename(&temp_path, path) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

fn make_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    let new_extension = match path.extension() {
        Some(ext) => {
            let mut new_ext = ext.to_os_string();
            new_ext.push(".tmp");
            new_ext
        }
        None => OsString::from("tmp"),
    };
    temp_path.set_extension(new_extension);
    temp_path
}

fn write_to_temp_file(temp_path: &Path, contents: &str) -> Result<()> {
    let mut file = File::create(temp_path)?;
    file.write_all(contents.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn replaces_existing_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("1.md");
        std::fs::write(&path, "old").unwrap();

        write_atomic(&path, "new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert!(!make_temp_path(&path).exists());
    }

    #[test]
    fn temp_path_keeps_extension() {
        assert_eq!(make_temp_path(Path::new("a/1.plan.md")), PathBuf::from("a/1.plan.md.tmp"));
        assert_eq!(make_temp_path(Path::new("a/noext")), PathBuf::from("a/noext.tmp"));
    }

    #[test]
    fn missing_directory_fails_without_leftovers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("1.md");

        assert!(write_atomic(&path, "x").is_err());
        assert!(!path.exists());
    }
}
