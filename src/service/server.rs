use crate::backend::YtDlpBackend;
use crate::config::Config;
use crate::downloader::Downloader;
use crate::service::handler::{handle_request, SharedDownloader};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

pub struct MediaServer {
    addr: SocketAddr,
    downloader: SharedDownloader,
    semaphore: Arc<Semaphore>,
    search_limit: usize,
}

impl MediaServer {
    /// Build the yt-dlp backed pipeline described by `config` and prepare
    /// its directories.
    pub async fn new(config: &Config) -> io::Result<Self> {
        let backend = YtDlpBackend::new(&config.yt_dlp_path)
            .with_cookies(config.cookies())
            .with_socket_timeout(config.socket_timeout())
            .with_process_timeout(config.fetch_timeout());
        let downloader = Downloader::new(
            Arc::new(backend),
            &config.store_paths(),
            config.max_cache_size,
        )
        .with_unsupported_hosts(config.unsupported_hosts.clone());

        Self::with_downloader(
            config.listen,
            downloader,
            config.max_connections,
            config.search_limit,
        )
        .await
    }

    pub async fn with_downloader(
        addr: SocketAddr,
        downloader: Downloader,
        max_connections: usize,
        search_limit: usize,
    ) -> io::Result<Self> {
        downloader.prepare().await?;
        Ok(Self {
            addr,
            downloader: Arc::new(downloader),
            semaphore: Arc::new(Semaphore::new(max_connections)),
            search_limit,
        })
    }

    pub async fn run(&self) -> io::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Media cache server listening");
        info!(
            max_cache_bytes = self.downloader.eviction().threshold(),
            max_connections = self.semaphore.available_permits(),
            audio_dir = ?self.downloader.store(crate::cache::MediaKind::Audio).dir(),
            video_dir = ?self.downloader.store(crate::cache::MediaKind::Video).dir(),
            "Cache configured"
        );

        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let downloader = Arc::clone(&self.downloader);
            let semaphore = Arc::clone(&self.semaphore);
            let search_limit = self.search_limit;
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req| {
                    handle_request(
                        req,
                        Arc::clone(&downloader),
                        Arc::clone(&semaphore),
                        search_limit,
                    )
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!(%remote, error = ?err, "Error serving connection");
                }
            });
        }
    }
}
