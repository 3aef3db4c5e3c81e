// Export storage
// Writes composition and pattern MIDI files into the export directory and prunes old ones

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get platform data directory")]
    NoDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Hex digits of the content hash used in export file names
const HASH_PREFIX_LEN: usize = 12;

/// Default export directory under the platform data dir; created on first export
pub fn default_export_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoDataDir)?;
    Ok(data_dir.join("groovedeck").join("exports"))
}

/// Calculate SHA256 hash of data
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Replace anything outside `[A-Za-z0-9 _-]` so the name is safe on every platform
pub fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.trim().is_empty() {
        "untitled".to_string()
    } else {
        cleaned
    }
}

/// Write exported composition bytes as `composition_<hash>.mid`, returning path and full hash
///
/// Identical content maps to the same file, so re-exporting overwrites rather than piling up.
pub fn write_export(dir: &Path, data: &[u8]) -> StorageResult<(PathBuf, String)> {
    fs::create_dir_all(dir)?;
    let hash = calculate_sha256(data);
    let file_path = dir.join(format!("composition_{}.mid", &hash[..HASH_PREFIX_LEN]));
    fs::write(&file_path, data)?;
    log::info!("Exported composition to {}", file_path.display());
    Ok((file_path, hash))
}

/// Copy a library pattern file into the export directory as `<category>_<name>.mid`
pub fn copy_pattern_file(source: &Path, dir: &Path, category: &str, name: &str) -> StorageResult<PathBuf> {
    fs::create_dir_all(dir)?;
    let file_name = format!("{}_{}.mid", safe_file_name(category), safe_file_name(name));
    let file_path = dir.join(file_name);
    fs::copy(source, &file_path)?;
    log::info!("Exported pattern {} to {}", source.display(), file_path.display());
    Ok(file_path)
}

/// Remove exported `.mid` files older than `max_age`, returning how many were deleted
///
/// A missing directory is not an error. Files that cannot be inspected or removed are skipped.
pub fn cleanup_old_exports(dir: &Path, max_age: Duration) -> StorageResult<usize> {
    if !dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_midi = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("mid"));
        if !path.is_file() || !is_midi {
            continue;
        }

        let expired = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > max_age);
        if !expired {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Failed to remove old export {}: {}", path.display(), e),
        }
    }

    if removed > 0 {
        log::info!("Removed {} old exports from {}", removed, dir.display());
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_calculate_sha256() {
        let hash = calculate_sha256(b"hello world");
        assert_eq!(
            hash,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("Funk/Break #2"), "Funk_Break _2");
        assert_eq!(safe_file_name("  ok-name_1 "), "ok-name_1");
        assert_eq!(safe_file_name(""), "untitled");
    }

    #[test]
    fn test_write_export_names_by_hash() {
        let dir = TempDir::new().unwrap();
        let (path, hash) = write_export(dir.path(), b"hello world").unwrap();

        assert_eq!(path.file_name().unwrap(), "composition_b94d27b9934d.mid");
        assert_eq!(hash.len(), 64);
        assert_eq!(fs::read(&path).unwrap(), b"hello world");

        let (again, _) = write_export(dir.path(), b"hello world").unwrap();
        assert_eq!(again, path);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_copy_pattern_file() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mid");
        fs::write(&source, b"MThd").unwrap();

        let exports = dir.path().join("exports");
        let path = copy_pattern_file(&source, &exports, "Rock", "Beat 1").unwrap();

        assert_eq!(path, exports.join("Rock_Beat 1.mid"));
        assert_eq!(fs::read(&path).unwrap(), b"MThd");
    }

    #[test]
    fn test_cleanup_old_exports() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("composition_a.mid"), b"a").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();

        assert_eq!(cleanup_old_exports(dir.path(), Duration::from_secs(3600)).unwrap(), 0);

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cleanup_old_exports(dir.path(), Duration::from_millis(1)).unwrap(), 1);
        assert!(!dir.path().join("composition_a.mid").exists());
        assert!(dir.path().join("notes.txt").exists());

        let missing = dir.path().join("missing");
        assert_eq!(cleanup_old_exports(&missing, Duration::ZERO).unwrap(), 0);
    }
}
