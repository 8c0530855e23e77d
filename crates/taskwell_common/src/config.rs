//! Configuration for the taskwell daemon.
//!
//! Loads settings from a TOML file when present, otherwise uses defaults;
//! env vars override individual fields afterwards.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Default config file path.
pub const CONFIG_PATH: &str = "/etc/taskwell/config.toml";

const DEV_JWT_SECRET: &str = "taskwell-dev-secret-change-in-production";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// HS256 signing secret for access tokens.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Origins allowed by the CORS layer.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,
}

fn default_bind_addr() -> String {
    // Localhost only unless configured otherwise.
    "127.0.0.1:7870".to_string()
}

fn default_db_path() -> String {
    "taskwell.db".to_string()
}

fn default_jwt_secret() -> String {
    DEV_JWT_SECRET.to_string()
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            jwt_secret: default_jwt_secret(),
            cors_origins: default_cors_origins(),
        }
    }
}

impl Config {
    /// Load from the default path.
    pub fn load() -> Self {
        Self::load_from(CONFIG_PATH)
    }

    /// Load from a specific path, falling back to defaults when the file is
    /// missing or unreadable, then apply env overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let mut config = if path.exists() {
            match fs::read_to_string(path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(config) => {
                        info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(err) => {
                        warn!("Invalid config at {}: {} - using defaults", path.display(), err);
                        Config::default()
                    }
                },
                Err(err) => {
                    warn!("Could not read {}: {} - using defaults", path.display(), err);
                    Config::default()
                }
            }
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        if config.jwt_secret == DEV_JWT_SECRET {
            warn!("Using the built-in development JWT secret; set TASKWELL_JWT_SECRET in production");
        }

        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("TASKWELL_ADDR") {
            self.bind_addr = addr;
        }
        if let Ok(db) = std::env::var("TASKWELL_DB") {
            self.db_path = db;
        }
        if let Ok(secret) = std::env::var("TASKWELL_JWT_SECRET") {
            self.jwt_secret = secret;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn defaults_when_file_missing() {
        let config = Config::load_from("/nonexistent/taskwell.toml");
        assert_eq!(config.bind_addr, "127.0.0.1:7870");
        assert_eq!(config.cors_origins, vec!["http://localhost:3000"]);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "bind_addr = \"0.0.0.0:8080\"").unwrap();

        let config = Config::load_from(file.path());
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.db_path, "taskwell.db");
    }

    #[test]
    fn invalid_file_falls_back_to_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "bind_addr = [1, 2]").unwrap();

        let config = Config::load_from(file.path());
        assert_eq!(config.bind_addr, "127.0.0.1:7870");
    }
}
