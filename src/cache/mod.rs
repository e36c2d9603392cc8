mod disk_cache;
mod eviction;
mod inflight;
mod key;

pub use disk_cache::*;
pub use eviction::*;
pub use inflight::*;
pub use key::*;

use std::fmt;
use std::path::PathBuf;

pub const MAX_CACHE_SIZE: u64 = 500 * 1024 * 1024; // 500MB
pub const AUDIO_CACHE_DIR: &str = "cache";
pub const VIDEO_CACHE_DIR: &str = "cache_video";
pub const SCRATCH_DIR: &str = "download";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => f.write_str("audio"),
            MediaKind::Video => f.write_str("video"),
        }
    }
}

/// A file owned by one of the stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub extension: String,
}
