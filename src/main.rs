use library_catalog::config::Config;
use library_catalog::http::{AppState, HttpServer, HttpServerConfig};
use library_catalog::sqlite::Sqlite;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;

    let sqlite = Sqlite::new(config.database_url()).await?;
    let state = AppState::new(sqlite.clone());
    let server_config = HttpServerConfig::new(config.server_port());
    let http_server = HttpServer::new(state, server_config).await?;
    let result = http_server.run().await;

    sqlite.close().await;
    result
}
