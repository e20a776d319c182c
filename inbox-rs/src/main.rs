use inbox_rs::api::ApiServer;
use inbox_rs::config::Config;
use inbox_rs::store::{MessageStore, StoreOptions};
use std::path::Path;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("inbox_rs={},tower_http=info", config.logging.level).into()
    });

    let registry = tracing_subscriber::registry().with(filter);
    if config.logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args().nth(1);
    let mut config = match config_path {
        Some(path) => Config::from_file(&path)?,
        None if Path::new("inbox.toml").exists() => Config::from_file("inbox.toml")?,
        None => Config::default(),
    };
    config.apply_env();
    config.validate()?;

    init_logging(&config);

    info!("Starting inbox-rs v{}", env!("CARGO_PKG_VERSION"));
    info!("  HTTP listening on: {}", config.server.listen_addr);
    info!("  Public hostname: {}", config.server.hostname);
    info!("  Database: {}", config.storage.database_url);
    info!("  Retention: {}s", config.storage.expire_seconds);

    let pool = inbox_rs::db::connect(&config.storage).await?;
    let store = MessageStore::open(pool, StoreOptions::from(&config)).await?;

    let _sweeper = store.spawn_expiry_task(config.sweep_interval());

    let server = ApiServer::new(store, config.server.listen_addr.clone());
    server.run().await?;

    Ok(())
}
