use crate::cache::MediaKind;
use crate::downloader::{Downloader, ResourceRequest};
use crate::error::ServiceError;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode, Uri};
use http_body_util::Full;
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info};

pub type SharedDownloader = Arc<Downloader>;

const HOME_PAGE: &str = r#"<h1>Media Download API</h1>
<p>Search a video platform and download audio or low-resolution video.</p>
<p><strong>Endpoints:</strong></p>
<ul>
    <li><strong>/search</strong>: Search for a video by title.</li>
    <li><strong>/download</strong>: Download audio by URL, or search for a title and download.</li>
    <li><strong>/vdown</strong>: Download video (144p + worst audio) by URL or title.</li>
</ul>
<p>Examples:</p>
<ul>
    <li>Search: <code>/search?title=Your%20Favorite%20Song</code></li>
    <li>Download by URL (audio): <code>/download?url=https://www.youtube.com/watch?v=dQw4w9WgXcQ</code></li>
    <li>Download by title (audio): <code>/download?title=Your%20Favorite%20Song</code></li>
    <li>Download by URL (video): <code>/vdown?url=https://www.youtube.com/watch?v=dQw4w9WgXcQ</code></li>
</ul>
"#;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

pub async fn handle_request<B>(
    req: Request<B>,
    downloader: SharedDownloader,
    semaphore: Arc<Semaphore>,
    search_limit: usize,
) -> Result<Response<Full<Bytes>>, Infallible> {
    // Owned so a download can keep its slot after the client hangs up.
    let permit = match semaphore.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return Ok(error_body(
                StatusCode::SERVICE_UNAVAILABLE,
                "Server is shutting down",
            ))
        }
    };

    if req.method() != Method::GET {
        return Ok(error_body(
            StatusCode::METHOD_NOT_ALLOWED,
            "Only GET is supported",
        ));
    }

    let params = query_params(req.uri());
    let path = req.uri().path().to_string();
    debug!(%path, "Handling request");

    let response = match path.as_str() {
        "/" => html_response(HOME_PAGE),
        "/search" => search(&downloader, &params, search_limit).await,
        "/download" => download(&downloader, &params, MediaKind::Audio, permit).await,
        "/vdown" => download(&downloader, &params, MediaKind::Video, permit).await,
        _ => error_body(StatusCode::NOT_FOUND, "Not found"),
    };
    Ok(response)
}

async fn search(
    downloader: &Downloader,
    params: &HashMap<String, String>,
    limit: usize,
) -> Response<Full<Bytes>> {
    let Some(title) = param(params, "title") else {
        return error_response(&ServiceError::InvalidRequest(
            "The 'title' parameter is required".to_string(),
        ));
    };

    match downloader.search(title, limit).await {
        Ok(hits) if hits.is_empty() => error_response(&ServiceError::NotFound(
            "No videos found for the given query".to_string(),
        )),
        Ok(hits) => json_response(StatusCode::OK, &hits),
        Err(e) => error_response(&e),
    }
}

async fn download(
    downloader: &SharedDownloader,
    params: &HashMap<String, String>,
    kind: MediaKind,
    permit: OwnedSemaphorePermit,
) -> Response<Full<Bytes>> {
    let request = match (param(params, "url"), param(params, "title")) {
        (Some(url), _) => ResourceRequest::from_url(url, kind),
        (None, Some(title)) => ResourceRequest::from_title(title, kind),
        (None, None) => {
            return error_response(&ServiceError::InvalidRequest(
                "Either 'url' or 'title' parameter is required".to_string(),
            ))
        }
    };

    // Detached so a client hanging up does not abandon a download half way.
    let downloader = Arc::clone(downloader);
    let task = tokio::spawn(async move {
        let _permit = permit;
        downloader.obtain(request).await
    });
    let path = match task.await {
        Ok(Ok(path)) => path,
        Ok(Err(e)) => return error_response(&e),
        Err(e) => {
            error!(error = %e, "Download task failed");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Download task failed");
        }
    };

    match file_response(&path).await {
        Ok(response) => response,
        Err(e) => error_response(&ServiceError::Storage(e)),
    }
}

fn query_params(uri: &Uri) -> HashMap<String, String> {
    let mut params = HashMap::new();
    if let Some(query) = uri.query() {
        for (name, value) in url::form_urlencoded::parse(query.as_bytes()).into_owned() {
            params.entry(name).or_insert(value);
        }
    }
    params
}

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(String::as_str)
        .filter(|value| !value.is_empty())
}

async fn file_response(path: &Path) -> io::Result<Response<Full<Bytes>>> {
    let data = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("download.bin");
    let len = data.len();
    info!(path = ?path, bytes = len, "Serving cached file");

    let mut response = Response::new(Full::new(Bytes::from(data)));
    let headers = response.headers_mut();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static(content_type_for_filename(filename)),
    );
    if let Ok(disposition) = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")) {
        headers.insert(CONTENT_DISPOSITION, disposition);
    }
    Ok(response)
}

fn content_type_for_filename(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "aac" => "audio/aac",
        "ogg" | "opus" => "audio/ogg",
        _ => "application/octet-stream",
    }
}

fn html_response(body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => {
            let mut response = Response::new(Full::new(Bytes::from(body)));
            *response.status_mut() = status;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        }
        Err(e) => {
            error!(error = %e, "Failed to encode response");
            let mut response = Response::new(Full::new(Bytes::new()));
            *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

fn error_body(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
    json_response(status, &ErrorBody { error: message })
}

fn error_response(err: &ServiceError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        info!(error = %err, "Request rejected");
    }
    error_body(status, &err.to_string())
}
