use std::env;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,

    // Web server
    pub api_host: String,
    pub api_port: u16,

    // Auth
    pub jwt_secret: String,
    pub jwt_issuer: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .expect("DB_MAX_CONNECTIONS must be a number"),
            db_acquire_timeout_secs: env::var("DB_ACQUIRE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .expect("DB_ACQUIRE_TIMEOUT_SECS must be a number"),
            api_host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            api_port: env::var("API_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .expect("API_PORT must be a number"),
            jwt_secret: required_env("JWT_SECRET"),
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or_else(|_| "gatepass".to_string()),
        }
    }

    /// Build the Postgres pool with the configured limits. The acquire
    /// timeout bounds how long any operation waits for a connection.
    pub async fn pg_pool(&self) -> sqlx::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.db_max_connections)
            .acquire_timeout(Duration::from_secs(self.db_acquire_timeout_secs))
            .connect(&self.database_url)
            .await
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}
