//! File-backed cache helpers: filename derivation, directory accounting,
//! and age-based cleanup scoped to the cache's own naming convention.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

use harvester_core::HarvesterResult;

/// Suffix identifying files this module owns; cleanup never touches
/// anything else in the directory.
pub const CACHE_FILE_SUFFIX: &str = ".cache.json";

/// Replace characters that are unsafe in filenames with `_`. Characters
/// are replaced, not dropped, so distinct keys stay distinct.
pub fn safe_file_name(key: &str) -> String {
    key.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// The on-disk filename for a cache key.
pub fn cache_file_name(key: &str) -> String {
    format!("{}{}", safe_file_name(key), CACHE_FILE_SUFFIX)
}

/// Total size in bytes of the files directly inside `dir`.
pub async fn dir_size(dir: &Path) -> HarvesterResult<u64> {
    let mut total = 0u64;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if metadata.is_file() {
            total += metadata.len();
        }
    }
    Ok(total)
}

/// Delete cache files in `dir` not modified within `max_age`. Only files
/// matching the cache naming convention are candidates. Returns the
/// number deleted.
pub async fn cleanup_older_than(dir: &Path, max_age: Duration) -> HarvesterResult<usize> {
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0usize;
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path: PathBuf = entry.path();
        let is_cache_file = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(CACHE_FILE_SUFFIX))
            .unwrap_or(false);
        if !is_cache_file {
            continue;
        }

        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                warn!(path = %path.display(), "skipping file without mtime: {e}");
                continue;
            }
        };

        if modified <= cutoff {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "stale cache file removed");
                    removed += 1;
                }
                // a concurrent cleanup may have raced us to it
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_file_name_replaces_not_drops() {
        assert_eq!(safe_file_name("match:abc/123"), "match_abc_123");
        assert_eq!(safe_file_name("a b"), "a_b");
        // distinct keys stay distinct
        assert_ne!(safe_file_name("a:b"), safe_file_name("a:c"));
        assert_eq!(safe_file_name("plain-name_1.0"), "plain-name_1.0");
    }

    #[test]
    fn test_cache_file_name_suffix() {
        assert_eq!(cache_file_name("match:x"), "match_x.cache.json");
    }

    #[tokio::test]
    async fn test_dir_size_sums_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("a.cache.json"), b"12345")
            .await
            .unwrap();
        tokio::fs::write(dir.path().join("b.cache.json"), b"123")
            .await
            .unwrap();
        assert_eq!(dir_size(dir.path()).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_cleanup_only_touches_cache_files() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("old.cache.json");
        let foreign = dir.path().join("keep.txt");
        tokio::fs::write(&stale, b"{}").await.unwrap();
        tokio::fs::write(&foreign, b"not ours").await.unwrap();

        // zero max-age makes every cache file stale
        let removed = cleanup_older_than(dir.path(), Duration::ZERO).await.unwrap();
        assert_eq!(removed, 1);
        assert!(!stale.exists());
        assert!(foreign.exists());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("fresh.cache.json");
        tokio::fs::write(&fresh, b"{}").await.unwrap();

        let removed = cleanup_older_than(dir.path(), Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert!(fresh.exists());
    }
}
