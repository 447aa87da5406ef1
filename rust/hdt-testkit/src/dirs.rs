//! Scratch directories for tests.

use std::path::Path;

/// A fresh directory under the system temp dir, removed on drop.
pub fn scratch_dir() -> std::io::Result<tempfile::TempDir> {
    tempfile::Builder::new().prefix("hdt-test-").tempdir()
}

/// Number of regular files directly under `dir`.
pub fn count_files(dir: &Path) -> std::io::Result<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        if entry?.file_type()?.is_file() {
            count += 1;
        }
    }
    Ok(count)
}
