use crate::backend::{FetchBackend, QualityProfile, SearchHit};
use crate::cache::{derive_key, DiskStore, EvictionPolicy, InFlight, MediaKind};
use crate::config::StorePaths;
use crate::error::{ServiceError, ServiceResult};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a client asked for: a URL, or a title to resolve when the URL is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub identifier: String,
    pub title: Option<String>,
    pub kind: MediaKind,
}

impl ResourceRequest {
    pub fn from_url(url: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            identifier: url.into(),
            title: None,
            kind,
        }
    }

    pub fn from_title(title: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            identifier: String::new(),
            title: Some(title.into()),
            kind,
        }
    }
}

/// Cache-first download pipeline shared by every request.
pub struct Downloader {
    backend: Arc<dyn FetchBackend>,
    audio: DiskStore,
    video: DiskStore,
    paths: StorePaths,
    eviction: EvictionPolicy,
    inflight: InFlight,
    unsupported_hosts: Vec<String>,
}

impl Downloader {
    pub fn new(backend: Arc<dyn FetchBackend>, paths: &StorePaths, max_cache_size: u64) -> Self {
        Self {
            backend,
            audio: DiskStore::new(&paths.audio),
            video: DiskStore::new(&paths.video),
            paths: paths.clone(),
            eviction: EvictionPolicy::new(max_cache_size),
            inflight: InFlight::new(),
            unsupported_hosts: vec!["spotify.com".to_string()],
        }
    }

    pub fn with_unsupported_hosts(mut self, hosts: Vec<String>) -> Self {
        self.unsupported_hosts = hosts.into_iter().filter(|h| !h.is_empty()).collect();
        self
    }

    /// Create the store and scratch directories and drop scratch leftovers
    /// from a previous run.
    pub async fn prepare(&self) -> io::Result<()> {
        self.paths.ensure_dirs().await?;

        let mut entries = fs::read_dir(&self.paths.scratch).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let removed = match entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => fs::remove_dir_all(&path).await,
                _ => fs::remove_file(&path).await,
            };
            if let Err(e) = removed {
                warn!(path = ?path, error = %e, "Error deleting stale scratch entry");
            }
        }
        Ok(())
    }

    pub fn store(&self, kind: MediaKind) -> &DiskStore {
        match kind {
            MediaKind::Audio => &self.audio,
            MediaKind::Video => &self.video,
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.paths.scratch
    }

    pub fn eviction(&self) -> &EvictionPolicy {
        &self.eviction
    }

    pub async fn search(&self, query: &str, limit: usize) -> ServiceResult<Vec<SearchHit>> {
        self.backend.search(query, limit).await
    }

    /// Path of the cached file for `request`, downloading it on a miss.
    pub async fn obtain(&self, request: ResourceRequest) -> ServiceResult<PathBuf> {
        let identifier = self.resolve_identifier(&request).await?;
        self.check_supported(&identifier)?;

        let key = derive_key(&identifier, request.kind);
        let store = self.store(request.kind);
        if let Some(path) = store.lookup(&key).await? {
            debug!(%key, kind = %request.kind, "Cache hit");
            return Ok(path);
        }

        let _guard = self.inflight.acquire(&key).await;
        // Another request may have finished the same download while we waited.
        if let Some(path) = store.lookup(&key).await? {
            debug!(%key, kind = %request.kind, "Joined concurrent download");
            return Ok(path);
        }

        info!(%key, kind = %request.kind, %identifier, "Cache miss, downloading");
        let job_dir = self.paths.scratch.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&job_dir).await?;

        let result = self.fetch_into(&identifier, request.kind, &key, &job_dir).await;
        cleanup_job_dir(&job_dir).await;
        result
    }

    async fn resolve_identifier(&self, request: &ResourceRequest) -> ServiceResult<String> {
        // The identifier is hashed exactly as given.
        if !request.identifier.is_empty() {
            return Ok(request.identifier.clone());
        }

        let title = request
            .title
            .as_deref()
            .filter(|title| !title.is_empty())
            .ok_or_else(|| {
                ServiceError::InvalidRequest(
                    "Either 'url' or 'title' parameter is required".to_string(),
                )
            })?;

        let hit = self
            .backend
            .search(title, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ServiceError::NotFound("No videos found for the given query".to_string())
            })?;
        debug!(title, url = %hit.url, "Resolved title");
        Ok(hit.url)
    }

    fn check_supported(&self, identifier: &str) -> ServiceResult<()> {
        match self
            .unsupported_hosts
            .iter()
            .find(|host| identifier.contains(host.as_str()))
        {
            Some(host) => Err(ServiceError::Resolution(format!(
                "Links from {host} are not supported"
            ))),
            None => Ok(()),
        }
    }

    async fn fetch_into(
        &self,
        identifier: &str,
        kind: MediaKind,
        key: &str,
        job_dir: &Path,
    ) -> ServiceResult<PathBuf> {
        let profile = QualityProfile::for_kind(kind);
        let fetched = self.backend.fetch(identifier, &profile, job_dir).await?;

        let path = self
            .store(kind)
            .store(key, &fetched.path, &fetched.extension)
            .await?;
        if self.eviction.maybe_evict(&[&self.audio, &self.video]).await {
            warn!(path = ?path, "New entry was evicted together with the rest of the cache");
        }
        info!(path = ?path, %kind, "Cached download");
        Ok(path)
    }
}

async fn cleanup_job_dir(job_dir: &Path) {
    if let Err(e) = fs::remove_dir_all(job_dir).await {
        if e.kind() != io::ErrorKind::NotFound {
            warn!(path = ?job_dir, error = %e, "Error deleting scratch files");
        }
    }
}
