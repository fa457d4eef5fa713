//! Server configuration from environment variables.

use crate::error::ConfigError;
use std::net::SocketAddr;

/// | Env var              | Default                               |
/// |----------------------|---------------------------------------|
/// | `HOST`               | `0.0.0.0`                             |
/// | `PORT`               | `8080`                                |
/// | `DATABASE_URL`       | `postgres://localhost/describo`       |
/// | `DB_MAX_CONNECTIONS` | `5`                                   |
/// | `RCLONE_BINARY`      | `rclone`                              |
/// | `BODY_LIMIT_BYTES`   | `10485760`                            |
///
/// `DESCRIBO_SCHEMA` is read by the store directly.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub rclone_binary: String,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".into(),
            port: 8080,
            database_url: "postgres://localhost/describo".into(),
            db_max_connections: 5,
            rclone_binary: "rclone".into(),
            body_limit_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = ServerConfig::default();
        Ok(ServerConfig {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            db_max_connections: parse_var(&lookup, "DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            rclone_binary: lookup("RCLONE_BINARY").unwrap_or(defaults.rclone_binary),
            body_limit_bytes: parse_var(&lookup, "BODY_LIMIT_BYTES", defaults.body_limit_bytes)?,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidVar {
                name: "HOST",
                value: self.host.clone(),
            })
    }
}

fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidVar { name, value: raw }),
    }
}
