#![allow(dead_code)]

use async_trait::async_trait;
use media_cache_server::backend::{FetchBackend, FetchedMedia, QualityProfile, SearchHit};
use media_cache_server::config::StorePaths;
use media_cache_server::downloader::Downloader;
use media_cache_server::error::{ServiceError, ServiceResult};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// In-process stand-in for yt-dlp that records what it was asked to do.
pub struct MockBackend {
    fetches: AtomicUsize,
    searches: AtomicUsize,
    hits: Vec<SearchHit>,
    payload: Vec<u8>,
    delay: Duration,
    fail_fetch: bool,
    fail_search: bool,
    profiles: Mutex<Vec<QualityProfile>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            fetches: AtomicUsize::new(0),
            searches: AtomicUsize::new(0),
            hits: Vec::new(),
            payload: b"media bytes".to_vec(),
            delay: Duration::ZERO,
            fail_fetch: false,
            fail_search: false,
            profiles: Mutex::new(Vec::new()),
        }
    }

    pub fn with_hit(mut self, id: &str, title: &str) -> Self {
        self.hits.push(SearchHit {
            id: id.to_string(),
            title: Some(title.to_string()),
            url: format!("https://www.youtube.com/watch?v={id}"),
            duration: Some(200.0),
            thumbnail: Some(format!("https://img.example/{id}.jpg")),
        });
        self
    }

    pub fn with_payload(mut self, payload: &[u8]) -> Self {
        self.payload = payload.to_vec();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_fetch(mut self) -> Self {
        self.fail_fetch = true;
        self
    }

    pub fn failing_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub fn profiles(&self) -> Vec<QualityProfile> {
        self.profiles.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchBackend for MockBackend {
    async fn search(&self, _query: &str, limit: usize) -> ServiceResult<Vec<SearchHit>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        if self.fail_search {
            return Err(ServiceError::Fetch("search backend unavailable".to_string()));
        }
        Ok(self.hits.iter().take(limit).cloned().collect())
    }

    async fn fetch(
        &self,
        _identifier: &str,
        profile: &QualityProfile,
        output_dir: &Path,
    ) -> ServiceResult<FetchedMedia> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.profiles.lock().unwrap().push(*profile);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let extension = profile.default_extension.to_string();
        let path = output_dir.join(format!("{}.{extension}", Uuid::new_v4()));
        if self.fail_fetch {
            // Leave a partial file behind, as an interrupted download would.
            std::fs::write(path.with_extension("part"), b"partial").unwrap();
            return Err(ServiceError::Fetch("ERROR: video unavailable".to_string()));
        }
        std::fs::write(&path, &self.payload).unwrap();
        Ok(FetchedMedia { path, extension })
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub paths: StorePaths,
    pub backend: Arc<MockBackend>,
    pub downloader: Arc<Downloader>,
}

pub async fn harness(backend: MockBackend, max_cache_size: u64) -> Harness {
    let tmp = TempDir::new().unwrap();
    let paths = StorePaths::from_base(tmp.path());
    let backend = Arc::new(backend);
    let downloader = Downloader::new(backend.clone(), &paths, max_cache_size);
    downloader.prepare().await.unwrap();
    Harness {
        tmp,
        paths,
        backend,
        downloader: Arc::new(downloader),
    }
}

pub fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
