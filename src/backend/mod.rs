//! External media search and download.
//!
//! The cache never talks to the video platform itself. Everything that does
//! goes through [`FetchBackend`], so tests can swap in a local double.

mod ytdlp;

pub use ytdlp::*;

use crate::cache::MediaKind;
use crate::error::ServiceResult;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One search result, serialised as-is by `/search`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    #[serde(skip_serializing)]
    pub id: String,
    pub title: Option<String>,
    pub url: String,
    pub duration: Option<f64>,
    pub thumbnail: Option<String>,
}

/// A finished download sitting in the request's scratch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub path: PathBuf,
    pub extension: String,
}

/// Format selection handed to the backend for one kind of media.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityProfile {
    pub format: &'static str,
    pub merge_output_format: Option<&'static str>,
    /// Extension assumed when the backend does not report one.
    pub default_extension: &'static str,
}

impl QualityProfile {
    pub const AUDIO: QualityProfile = QualityProfile {
        format: "worstaudio/worst",
        merge_output_format: None,
        default_extension: "m4a",
    };

    pub const VIDEO: QualityProfile = QualityProfile {
        format: "bestvideo[height<=144]+worstaudio/worst",
        merge_output_format: Some("mp4"),
        default_extension: "mp4",
    };

    pub fn for_kind(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => Self::AUDIO,
            MediaKind::Video => Self::VIDEO,
        }
    }
}

#[async_trait]
pub trait FetchBackend: Send + Sync {
    /// Top `limit` matches for a free-text query.
    async fn search(&self, query: &str, limit: usize) -> ServiceResult<Vec<SearchHit>>;

    /// Download `identifier` into `output_dir` using `profile`.
    async fn fetch(
        &self,
        identifier: &str,
        profile: &QualityProfile,
        output_dir: &Path,
    ) -> ServiceResult<FetchedMedia>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiles_follow_kind() {
        assert_eq!(QualityProfile::for_kind(MediaKind::Audio).format, "worstaudio/worst");
        let video = QualityProfile::for_kind(MediaKind::Video);
        assert_eq!(video.merge_output_format, Some("mp4"));
        assert!(video.format.contains("height<=144"));
    }

    #[test]
    fn search_hit_serialises_without_id() {
        let hit = SearchHit {
            id: "abc".into(),
            title: Some("Song".into()),
            url: "https://www.youtube.com/watch?v=abc".into(),
            duration: Some(212.0),
            thumbnail: None,
        };
        let json = serde_json::to_value(&hit).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "title": "Song",
                "url": "https://www.youtube.com/watch?v=abc",
                "duration": 212.0,
                "thumbnail": null,
            })
        );
    }
}
