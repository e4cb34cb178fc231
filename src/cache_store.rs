// Content-addressed cache-file store: for each origin ETag, metadata-<key>
// and filedata-<key> in the configured cache directory.

use std::path::{Path, PathBuf};

use crate::header_map::HeaderMap;

pub const REQUIRED_METADATA_KEYS: [&str; 4] = [
    "Content-Length",
    "ETag",
    "Last-Modified",
    "X-Offload-Caching-PID",
];

#[derive(Clone)]
pub struct CacheEntryPaths {
    pub metadata: PathBuf,
    pub filedata: PathBuf,
}

impl CacheEntryPaths {
    pub fn for_key(cache_dir: &Path, key: &str) -> Self {
        CacheEntryPaths {
            metadata: cache_dir.join(format!("metadata-{key}")),
            filedata: cache_dir.join(format!("filedata-{key}")),
        }
    }
}

pub async fn load_metadata(path: &Path) -> Option<HeaderMap> {
    let data = tokio::fs::read(path).await.ok()?;
    Some(HeaderMap::from_metadata_bytes(&data))
}

// Structurally valid iff its ETag (already normalized at write time)
// equals key and it lists all of the required keys.
pub fn metadata_is_structurally_valid(metadata: &HeaderMap, key: &str) -> bool {
    for required in REQUIRED_METADATA_KEYS {
        if !metadata.contains(required) {
            return false;
        }
    }
    match metadata.get("ETag") {
        Some(etag) => etag.trim_matches('"') == key,
        None => false,
    }
}

// Write to a temp file in the same directory, then rename into place, so a
// crash mid-write never leaves a truncated metadata file behind.
pub async fn commit_metadata(path: &Path, headers: &HeaderMap) -> std::io::Result<()> {
    let tmp_path = {
        let mut p = path.to_path_buf();
        let file_name = p.file_name().and_then(|n| n.to_str()).unwrap_or("metadata").to_string();
        p.set_file_name(format!("{file_name}.tmp-{}", std::process::id()));
        p
    };

    tokio::fs::write(&tmp_path, headers.to_metadata_bytes()).await?;
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    Ok(())
}

// Missing files are not an error: the nuke may race with another nuke or
// never have had both files.
pub async fn nuke_cache_entry(paths: &CacheEntryPaths) {
    let _ = tokio::fs::remove_file(&paths.metadata).await;
    let _ = tokio::fs::remove_file(&paths.filedata).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structurally_valid_requires_all_four_keys() {
        let mut h = HeaderMap::new();
        h.insert("Content-Length", "10");
        h.insert("ETag", "abc");
        h.insert("Last-Modified", "T");
        assert!(!metadata_is_structurally_valid(&h, "abc"));
        h.insert("X-Offload-Caching-PID", "123");
        assert!(metadata_is_structurally_valid(&h, "abc"));
    }

    #[test]
    fn structurally_valid_checks_etag_matches_key() {
        let mut h = HeaderMap::new();
        h.insert("Content-Length", "10");
        h.insert("ETag", "abc");
        h.insert("Last-Modified", "T");
        h.insert("X-Offload-Caching-PID", "123");
        assert!(!metadata_is_structurally_valid(&h, "other-key"));
    }

    #[tokio::test]
    async fn commit_metadata_is_atomic_and_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata-abc");
        let mut h = HeaderMap::new();
        h.insert("ETag", "abc");
        commit_metadata(&path, &h).await.unwrap();

        let loaded = load_metadata(&path).await.unwrap();
        assert_eq!(loaded.get("ETag"), Some("abc"));

        // no leftover temp files
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn commit_metadata_cleans_up_temp_file_on_rename_failure() {
        let dir = tempfile::tempdir().unwrap();
        // target path is a directory, so the rename is guaranteed to fail.
        let path = dir.path().join("metadata-abc");
        tokio::fs::create_dir(&path).await.unwrap();

        let mut h = HeaderMap::new();
        h.insert("ETag", "abc");
        assert!(commit_metadata(&path, &h).await.is_err());

        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        let mut count = 0;
        while entries.next_entry().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1, "no leftover temp file after a failed rename");
    }
}
