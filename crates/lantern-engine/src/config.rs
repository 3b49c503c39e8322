// Engine configuration from environment variables
//
// CRITICAL: the engine binds to the loopback interface only. A non-loopback
// host is a configuration error and the process refuses to start.

use std::env;
use std::path::PathBuf;

use lantern_core::{EngineError, Result};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 47200;

/// Sentinel value for LANTERN_DATABASE_URL selecting the in-memory store.
pub const MEMORY_DATABASE_URL: &str = "memory";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub host: String,
    pub port: u16,
    /// SQLite URL, the "memory" sentinel, or None for the default on-disk
    /// database under the data dir.
    pub database_url: Option<String>,
    pub data_dir: PathBuf,
    pub cors_origins: Vec<String>,
}

impl EngineConfig {
    /// Load configuration from the environment and validate it.
    pub fn from_env() -> Result<Self> {
        let host = env::var("LANTERN_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = match env::var("LANTERN_PORT") {
            Ok(value) => value
                .parse()
                .map_err(|_| EngineError::config(format!("invalid LANTERN_PORT: {value}")))?,
            Err(_) => DEFAULT_PORT,
        };

        let data_dir = env::var_os("LANTERN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let database_url = env::var("LANTERN_DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty());

        let cors_origins = env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .filter(|origins| !origins.is_empty())
            .map(|origins| {
                origins
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_else(default_cors_origins);

        let config = Self {
            host,
            port,
            database_url,
            data_dir,
            cors_origins,
        };
        config.ensure_loopback()?;
        Ok(config)
    }

    /// Refuse anything but the loopback interface.
    pub fn ensure_loopback(&self) -> Result<()> {
        match self.host.as_str() {
            "127.0.0.1" | "localhost" | "::1" => Ok(()),
            other => Err(EngineError::config(format!(
                "engine must bind to the loopback interface, refusing host {other}"
            ))),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Fallback location for the auth token when no keychain is available.
    pub fn token_file_path(&self) -> PathBuf {
        self.data_dir.join(".auth_token")
    }

    /// Default on-disk event log location.
    pub fn default_db_path(&self) -> PathBuf {
        self.data_dir.join("engine.db")
    }
}

fn default_data_dir() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lantern")
}

pub fn default_cors_origins() -> Vec<String> {
    // Desktop webview and dev-server origins
    vec![
        "http://localhost:1420".to_string(),
        "http://127.0.0.1:1420".to_string(),
        "tauri://localhost".to_string(),
        "https://tauri.localhost".to_string(),
    ]
}
