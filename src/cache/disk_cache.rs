use super::CacheEntry;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

/// One flat directory of `{key}.{ext}` files.
///
/// Directory scans may race with writers and with eviction running on other
/// tasks. A file that disappears between listing and inspection is treated as
/// absent rather than as an error.
#[derive(Debug, Clone)]
pub struct DiskStore {
    cache_dir: PathBuf,
}

impl DiskStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub async fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.cache_dir).await
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    fn entry_path(&self, key: &str, extension: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.{extension}"))
    }

    /// Find the cached file for `key`, whatever its extension.
    ///
    /// When stale entries with different extensions coexist the most recently
    /// modified one wins; equal timestamps fall back to the smaller path.
    pub async fn lookup(&self, key: &str) -> io::Result<Option<PathBuf>> {
        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };

        let mut best: Option<(SystemTime, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if extension_for_key(&path, key).is_none() {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            let newer = match &best {
                None => true,
                Some((best_time, best_path)) => {
                    modified > *best_time || (modified == *best_time && path < *best_path)
                }
            };
            if newer {
                best = Some((modified, path));
            }
        }

        Ok(best.map(|(_, path)| path))
    }

    /// Move `source` into the store as `{key}.{extension}`.
    ///
    /// Readers never observe a partially written entry: the file only appears
    /// under its final name through a rename.
    pub async fn store(&self, key: &str, source: &Path, extension: &str) -> io::Result<PathBuf> {
        let target = self.entry_path(key, extension);
        match fs::rename(source, &target).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(e),
            Err(e) => {
                // Scratch and store may live on different filesystems.
                debug!(source = ?source, error = %e, "Rename failed, copying into store");
                self.copy_into_place(key, source, &target).await?;
            }
        }
        debug!(path = ?target, "Stored cache entry");
        Ok(target)
    }

    async fn copy_into_place(&self, key: &str, source: &Path, target: &Path) -> io::Result<()> {
        // Staging names start with a dot so they never match a key.
        let staging = self
            .cache_dir
            .join(format!(".{key}.{}.part", Uuid::new_v4().simple()));
        if let Err(e) = fs::copy(source, &staging).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e);
        }
        if let Err(e) = fs::rename(&staging, target).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e);
        }
        if let Err(e) = fs::remove_file(source).await {
            warn!(path = ?source, error = %e, "Failed to remove staged source after copy");
        }
        Ok(())
    }

    /// Sum of the sizes of the files currently in the store.
    pub async fn total_size(&self) -> io::Result<u64> {
        Ok(self.entries().await?.iter().map(|e| e.size_bytes).sum())
    }

    pub async fn entries(&self) -> io::Result<Vec<CacheEntry>> {
        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            };
            if !metadata.is_file() {
                continue;
            }
            let path = entry.path();
            let (key, extension) = match split_entry_name(&path) {
                Some(parts) => parts,
                None => (String::new(), String::new()),
            };
            found.push(CacheEntry {
                key,
                path,
                size_bytes: metadata.len(),
                extension,
            });
        }
        Ok(found)
    }

    /// Delete every file in the store. Individual failures are logged and
    /// skipped. Returns how many files were removed.
    pub async fn clear(&self) -> usize {
        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = ?self.cache_dir, error = %e, "Failed to list cache directory");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(dir = ?self.cache_dir, error = %e, "Failed to read cache directory entry");
                    break;
                }
            };
            match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => continue,
                _ => {}
            }
            let path = entry.path();
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = ?path, error = %e, "Error deleting cache file"),
            }
        }
        removed
    }
}

/// The extension of `path` when its file name is `{key}.{ext}`.
fn extension_for_key<'a>(path: &'a Path, key: &str) -> Option<&'a str> {
    path.file_name()?
        .to_str()?
        .strip_prefix(key)?
        .strip_prefix('.')
        .filter(|ext| !ext.is_empty())
}

fn split_entry_name(path: &Path) -> Option<(String, String)> {
    let name = path.file_name()?.to_str()?;
    let (key, extension) = name.split_once('.')?;
    Some((key.to_string(), extension.to_string()))
}
