use anyhow::{Context, Result};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    /// Environment-driven configuration with local-dev defaults. `.env` is
    /// loaded by `main` before this runs.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = match std::env::var("SERVER_PORT") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid SERVER_PORT: {}", raw))?,
            Err(_) => 5000,
        };
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        Ok(Self {
            server: ServerConfig { host, port },
            data_dir,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
