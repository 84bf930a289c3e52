//! Atomic file operations

use std::path::Path;

/// Write data atomically using temp file + rename
pub fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    std::fs::write(&temp_path, data)?;
    std::fs::rename(temp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("nested").join("context.xml");

        let data = b"<context></context>";
        atomic_write(&test_file, data).unwrap();

        let read_data = std::fs::read(&test_file).unwrap();
        assert_eq!(data, read_data.as_slice());
        assert!(!test_file.with_extension("tmp").exists());
    }

    #[test]
    fn test_atomic_write_overwrites() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("context.xml");

        atomic_write(&test_file, b"first").unwrap();
        atomic_write(&test_file, b"second").unwrap();

        assert_eq!(std::fs::read_to_string(&test_file).unwrap(), "second");
    }
}
