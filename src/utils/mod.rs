//! Filesystem helpers shared by the synthesizers and formalizers.
//!
//! All generation is overwrite-on-rerun: helpers never preserve existing
//! content, and a directory that already exists is not an error.

use std::fs;
use std::path::Path;

/// Creates every directory in the list, including parents.
///
/// Already-existing directories are benign (idempotent re-run).
pub fn make_dirs<P: AsRef<Path>>(directories: &[P]) -> std::io::Result<()> {
    for dir in directories {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Writes text to a file, creating parent directories as needed.
pub fn write_file(path: &Path, text: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, text)
}

/// Writes text to a file and marks it executable.
#[cfg(unix)]
pub fn write_and_chmod(path: &Path, text: &str) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    write_file(path, text)?;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o111);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
pub fn write_and_chmod(path: &Path, text: &str) -> std::io::Result<()> {
    write_file(path, text)
}

/// Reads a file into a string.
pub fn read_file(path: &Path) -> std::io::Result<String> {
    fs::read_to_string(path)
}

/// Deletes a file if it exists; missing files are ignored.
pub fn delete_file(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_make_dirs_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let nested = dir.path().join("a/b/c");
        make_dirs(&[&nested]).expect("first create");
        make_dirs(&[&nested]).expect("second create");
        assert!(nested.is_dir());
    }

    #[test]
    fn test_write_file_creates_parents() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("x/y/out.txt");
        write_file(&path, "contents").expect("write");
        assert_eq!(read_file(&path).expect("read"), "contents");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_and_chmod_sets_execute_bits() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("script.sh");
        write_and_chmod(&path, "#!/bin/bash\n").expect("write");
        let mode = fs::metadata(&path).expect("metadata").permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn test_delete_file_ignores_missing() {
        let dir = TempDir::new().expect("tempdir");
        delete_file(&dir.path().join("nope.txt")).expect("missing file is fine");
    }
}
