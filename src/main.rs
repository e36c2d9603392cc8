use clap::Parser;
use media_cache_server::config::Config;
use media_cache_server::service::MediaServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("media_cache_server={},info", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;

    let server = MediaServer::new(&config).await?;
    server.run().await?;

    Ok(())
}
