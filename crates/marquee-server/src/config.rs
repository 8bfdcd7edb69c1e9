use std::{path::PathBuf, time::Duration};

use crate::error::Result;
pub use clap::Parser;
use marquee_app::state::AppConfig;
use marquee_dal::PoolConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

#[derive(Debug, Clone, clap::Parser)]
pub struct ServerConfig {
    #[arg(
        short,
        long,
        default_value_t = 4000,
        env = "MARQUEE_PORT",
        help = "Port to listen on"
    )]
    pub port: u16,
    #[arg(
        short,
        long,
        default_value = "127.0.0.1",
        env = "MARQUEE_LISTEN_ADDRESS",
        help = "Address to listen on"
    )]
    pub listen_address: String,

    #[arg(
        long,
        value_enum,
        default_value_t = Environment::Development,
        env = "MARQUEE_ENV",
        help = "Environment the server runs in, reported by healthcheck"
    )]
    pub env: Environment,

    #[arg(
        long,
        env = "MARQUEE_DATABASE_URL",
        help = "Database URL e.g. sqlite://file.db, default is sqlite://[data-dir]/marquee.db, where data-dir is set by --data-dir"
    )]
    database_url: Option<String>,

    #[arg(
        long,
        env = "MARQUEE_DATA_DIR",
        help = "Data directory for the database, default is system default like ~/.local/share/marquee",
        default_value_t = default_data_dir()
    )]
    data_dir: String,

    #[arg(
        long,
        env = "MARQUEE_DB_MAX_CONNECTIONS",
        default_value_t = 25,
        help = "Maximum number of open database connections"
    )]
    pub db_max_connections: u32,

    #[arg(
        long,
        env = "MARQUEE_DB_IDLE_TIMEOUT",
        default_value = "15m",
        help = "How long an unused connection is kept open (e.g. 15m, 1h)",
        value_parser = humantime::parse_duration
    )]
    pub db_idle_timeout: Duration,

    #[arg(
        long,
        env = "MARQUEE_DB_CONNECT_TIMEOUT",
        default_value = "5s",
        help = "Maximum time to wait for a database connection",
        value_parser = humantime::parse_duration
    )]
    pub db_connect_timeout: Duration,

    #[arg(
        long,
        env = "MARQUEE_DB_QUERY_TIMEOUT",
        default_value = "3s",
        help = "Deadline for each single database query",
        value_parser = humantime::parse_duration
    )]
    pub db_query_timeout: Duration,

    #[arg(
        long,
        env = "MARQUEE_DEFAULT_PAGE_SIZE",
        default_value_t = 20,
        help = "Page size used when a listing does not ask for one"
    )]
    pub default_page_size: i64,
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("marquee"))
        .unwrap_or_else(|| PathBuf::from("marquee"))
        .to_string_lossy()
        .to_string()
}

impl ServerConfig {
    pub fn load() -> Result<Self> {
        ServerConfig::try_parse().map_err(|e| e.into())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    pub fn database_url(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| format!("sqlite://{}/marquee.db", self.data_dir))
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_connections: self.db_max_connections,
            idle_timeout: self.db_idle_timeout,
            connect_timeout: self.db_connect_timeout,
        }
    }
}

impl From<&ServerConfig> for AppConfig {
    fn from(config: &ServerConfig) -> Self {
        AppConfig {
            environment: config.env.as_str().to_string(),
            default_page_size: config.default_page_size,
            query_timeout: config.db_query_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::try_parse_from(["marquee-server", "--data-dir", "/tmp/mq"])
            .unwrap();
        assert_eq!(config.port, 4000);
        assert_eq!(config.env, Environment::Development);
        assert_eq!(config.database_url(), "sqlite:///tmp/mq/marquee.db");
        assert_eq!(config.db_idle_timeout, Duration::from_secs(15 * 60));
        assert_eq!(config.pool_config().max_connections, 25);

        let app_config = AppConfig::from(&config);
        assert_eq!(app_config.query_timeout, Duration::from_secs(3));
        assert_eq!(app_config.default_page_size, 20);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::try_parse_from([
            "marquee-server",
            "--env",
            "production",
            "--database-url",
            "sqlite::memory:",
            "--db-query-timeout",
            "500ms",
        ])
        .unwrap();
        assert_eq!(AppConfig::from(&config).environment, "production");
        assert_eq!(config.database_url(), "sqlite::memory:");
        assert_eq!(config.db_query_timeout, Duration::from_millis(500));
    }
}
