//! Configuration types.

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Server configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP API binds to.
    pub bind_addr: SocketAddr,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], 8080).into(),
            db_path: PathBuf::from("data/modules.db"),
        }
    }
}

impl ServerConfig {
    /// Build from `CHAT_MODULES_PORT` and `CHAT_MODULES_DB`, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(port) = std::env::var("CHAT_MODULES_PORT") {
            let port: u16 = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CHAT_MODULES_PORT".to_string(),
                message: format!("not a valid port: {port}"),
            })?;
            config.bind_addr.set_port(port);
        }

        if let Ok(path) = std::env::var("CHAT_MODULES_DB") {
            config.db_path = PathBuf::from(path);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.db_path, PathBuf::from("data/modules.db"));
    }
}
