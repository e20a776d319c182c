use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::config::StorageConfig;
use crate::error::Result;

/// Connect to the configured database, creating the file if needed
pub async fn connect(storage: &StorageConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&storage.database_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(storage.max_connections.max(1))
        .connect_with(options)
        .await?;

    Ok(pool)
}
