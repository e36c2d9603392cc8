//! Command line and environment configuration.

use crate::cache::{AUDIO_CACHE_DIR, MAX_CACHE_SIZE, SCRATCH_DIR, VIDEO_CACHE_DIR};
use clap::Parser;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::warn;

#[derive(Parser, Debug, Clone)]
#[command(name = "media_cache_server")]
#[command(about = "Search, download and cache media behind a small HTTP API")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Directory holding the audio cache, video cache and scratch area
    #[arg(long, env = "BASE_DIR", default_value = "/tmp")]
    pub base_dir: PathBuf,

    /// Combined byte budget of both caches before they are wiped
    #[arg(long, env = "MAX_CACHE_SIZE", default_value_t = MAX_CACHE_SIZE)]
    pub max_cache_size: u64,

    /// Cookie file handed to yt-dlp (ignored when absent)
    #[arg(long, env = "COOKIES_FILE", default_value = "cookies.txt")]
    pub cookies_file: PathBuf,

    /// yt-dlp executable
    #[arg(long, env = "YT_DLP_PATH", default_value = "yt-dlp")]
    pub yt_dlp_path: PathBuf,

    #[arg(long, env = "SOCKET_TIMEOUT_SECS", default_value_t = 60)]
    pub socket_timeout_secs: u64,

    /// Upper bound on one search or download
    #[arg(long, env = "FETCH_TIMEOUT_SECS", default_value_t = 300)]
    pub fetch_timeout_secs: u64,

    /// Maximum requests handled at once
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 100)]
    pub max_connections: usize,

    /// Results returned by /search
    #[arg(long, env = "SEARCH_LIMIT", default_value_t = 5)]
    pub search_limit: usize,

    /// Link hosts rejected as unsupported (comma separated)
    #[arg(
        long,
        env = "UNSUPPORTED_HOSTS",
        value_delimiter = ',',
        default_value = "spotify.com"
    )]
    pub unsupported_hosts: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn store_paths(&self) -> StorePaths {
        StorePaths::from_base(&self.base_dir)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// The cookie file, if it exists.
    pub fn cookies(&self) -> Option<PathBuf> {
        if self.cookies_file.is_file() {
            Some(self.cookies_file.clone())
        } else {
            warn!(path = ?self.cookies_file, "Cookie file not found, downloading without cookies");
            None
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be greater than zero".to_string());
        }
        if self.search_limit == 0 {
            return Err("search_limit must be greater than zero".to_string());
        }
        if self.fetch_timeout_secs == 0 {
            return Err("fetch_timeout_secs must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Locations of the two stores and the scratch area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub audio: PathBuf,
    pub video: PathBuf,
    pub scratch: PathBuf,
}

impl StorePaths {
    pub fn from_base(base: &Path) -> Self {
        Self {
            audio: base.join(AUDIO_CACHE_DIR),
            video: base.join(VIDEO_CACHE_DIR),
            scratch: base.join(SCRATCH_DIR),
        }
    }

    /// Create any missing directory.
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        for dir in [&self.audio, &self.video, &self.scratch] {
            fs::create_dir_all(dir).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_match_deployment_layout() {
        let config = Config::parse_from(["media_cache_server"]);
        assert_eq!(config.listen, "0.0.0.0:5000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.max_cache_size, 500 * 1024 * 1024);
        assert_eq!(config.unsupported_hosts, vec!["spotify.com".to_string()]);
        assert_eq!(config.search_limit, 5);
        assert!(config.validate().is_ok());

        let paths = config.store_paths();
        assert_eq!(paths.audio, PathBuf::from("/tmp/cache"));
        assert_eq!(paths.video, PathBuf::from("/tmp/cache_video"));
        assert_eq!(paths.scratch, PathBuf::from("/tmp/download"));
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::parse_from([
            "media_cache_server",
            "--max-cache-size",
            "1024",
            "--unsupported-hosts",
            "spotify.com,music.example",
            "--max-connections",
            "0",
        ]);
        assert_eq!(config.max_cache_size, 1024);
        assert_eq!(config.unsupported_hosts.len(), 2);
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn ensure_dirs_creates_layout() {
        let tmp = TempDir::new().unwrap();
        let paths = StorePaths::from_base(tmp.path());
        paths.ensure_dirs().await.unwrap();
        paths.ensure_dirs().await.unwrap();
        assert!(paths.audio.is_dir());
        assert!(paths.video.is_dir());
        assert!(paths.scratch.is_dir());
    }
}
