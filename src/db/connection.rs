//! Database connection management using sqlx

use crate::config::DbConfig;
use crate::error::Result;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

pub type DbPool = MySqlPool;

/// Connection options from `DATABASE_URL`, or from the individual `DB_*` parts.
pub fn connect_options(config: &DbConfig) -> Result<MySqlConnectOptions> {
    if let Some(url) = &config.url {
        return Ok(MySqlConnectOptions::from_str(url)?);
    }

    let mut options = MySqlConnectOptions::new().host(&config.host).port(config.port);
    if let Some(user) = &config.user {
        options = options.username(user);
    }
    if let Some(password) = &config.password {
        options = options.password(password);
    }
    if let Some(database) = &config.database {
        options = options.database(database);
    }
    Ok(options)
}

/// Initialize the database connection pool
pub async fn init_pool(config: &DbConfig) -> Result<DbPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options(config)?)
        .await?;

    // Test the connection
    sqlx::query("SELECT 1").execute(&pool).await?;

    match &config.url {
        Some(_) => info!("Connected to MySQL using DATABASE_URL"),
        None => info!("Connected to MySQL at {}:{}", config.host, config.port),
    }
    Ok(pool)
}
