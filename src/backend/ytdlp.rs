use super::{FetchBackend, FetchedMedia, QualityProfile, SearchHit};
use crate::error::{ServiceError, ServiceResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::fs;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Drives the `yt-dlp` executable as a child process.
///
/// The cookie file is fixed at construction and passed to every download;
/// nothing here is shared process-wide.
#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    program: PathBuf,
    cookies_file: Option<PathBuf>,
    socket_timeout: Duration,
    process_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct SearchListing {
    #[serde(default)]
    entries: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: Option<String>,
}

impl YtDlpBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cookies_file: None,
            socket_timeout: Duration::from_secs(60),
            process_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_cookies(mut self, cookies_file: Option<PathBuf>) -> Self {
        self.cookies_file = cookies_file;
        self
    }

    pub fn with_socket_timeout(mut self, socket_timeout: Duration) -> Self {
        self.socket_timeout = socket_timeout;
        self
    }

    pub fn with_process_timeout(mut self, process_timeout: Duration) -> Self {
        self.process_timeout = process_timeout;
        self
    }

    fn search_args(&self, query: &str, limit: usize) -> Vec<String> {
        vec![
            "--dump-single-json".to_string(),
            "--flat-playlist".to_string(),
            "--skip-download".to_string(),
            "--quiet".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout.as_secs().to_string(),
            format!("ytsearch{limit}:{query}"),
        ]
    }

    fn fetch_args(&self, identifier: &str, profile: &QualityProfile, output_template: &str) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--newline".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout.as_secs().to_string(),
        ];
        if let Some(cookies) = &self.cookies_file {
            args.push("--cookies".to_string());
            args.push(cookies.to_string_lossy().into_owned());
        }
        args.push("-f".to_string());
        args.push(profile.format.to_string());
        if let Some(container) = profile.merge_output_format {
            args.push("--merge-output-format".to_string());
            args.push(container.to_string());
        }
        args.extend([
            "-o".to_string(),
            output_template.to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--".to_string(),
            identifier.to_string(),
        ]);
        args
    }

    async fn run(&self, args: Vec<String>) -> ServiceResult<Output> {
        debug!(program = ?self.program, ?args, "Running yt-dlp");
        let command = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = timeout(self.process_timeout, command)
            .await
            .map_err(|_| {
                ServiceError::Fetch(format!(
                    "yt-dlp timed out after {}s",
                    self.process_timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    ServiceError::Fetch(format!("yt-dlp not found at {:?}", self.program))
                } else {
                    ServiceError::Fetch(format!("failed to run yt-dlp: {e}"))
                }
            })?;

        if !output.status.success() {
            return Err(ServiceError::Fetch(run_error_message(&output.stderr)));
        }
        Ok(output)
    }
}

#[async_trait]
impl FetchBackend for YtDlpBackend {
    async fn search(&self, query: &str, limit: usize) -> ServiceResult<Vec<SearchHit>> {
        let output = self.run(self.search_args(query, limit)).await?;
        parse_search_output(&output.stdout)
    }

    async fn fetch(
        &self,
        identifier: &str,
        profile: &QualityProfile,
        output_dir: &Path,
    ) -> ServiceResult<FetchedMedia> {
        let template = output_dir.join(format!("{}.%(ext)s", Uuid::new_v4()));
        let args = self.fetch_args(identifier, profile, &template.to_string_lossy());
        let output = self.run(args).await?;

        let printed = last_line(&output.stdout);
        let path = resolve_output(output_dir, printed.as_deref()).await?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or(profile.default_extension)
            .to_string();
        Ok(FetchedMedia { path, extension })
    }
}

fn parse_search_output(stdout: &[u8]) -> ServiceResult<Vec<SearchHit>> {
    let listing: SearchListing = serde_json::from_slice(stdout)
        .map_err(|e| ServiceError::Fetch(format!("unreadable yt-dlp search output: {e}")))?;

    Ok(listing
        .entries
        .into_iter()
        .filter_map(|entry| {
            let id = entry.id.filter(|id| !id.is_empty())?;
            let thumbnail = entry
                .thumbnail
                .or_else(|| entry.thumbnails.into_iter().rev().find_map(|t| t.url));
            Some(SearchHit {
                url: format!("{WATCH_URL}{id}"),
                id,
                title: entry.title,
                duration: entry.duration,
                thumbnail,
            })
        })
        .collect())
}

fn last_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(ToString::to_string)
}

fn run_error_message(stderr: &[u8]) -> String {
    last_line(stderr).unwrap_or_else(|| "yt-dlp exited with an error".to_string())
}

/// Locate the downloaded file: the path yt-dlp printed if it exists inside
/// `output_dir`, otherwise the first finished file found there.
async fn resolve_output(output_dir: &Path, printed: Option<&str>) -> ServiceResult<PathBuf> {
    if let Some(printed) = printed {
        let candidate = PathBuf::from(printed);
        if candidate.starts_with(output_dir) && is_file(&candidate).await {
            return Ok(candidate);
        }
        warn!(printed, "yt-dlp reported an unexpected output path");
    }

    let mut entries = fs::read_dir(output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let partial = path
            .extension()
            .is_some_and(|ext| ext == "part" || ext == "ytdl");
        if !partial && is_file(&path).await {
            return Ok(path);
        }
    }

    Err(ServiceError::Fetch(
        "yt-dlp finished without producing a file".to_string(),
    ))
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}
