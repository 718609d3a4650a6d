/// Server configuration.
/// Reads config.json from ~/.config/tradelink/config.json (or platform equivalent),
/// or from the file named by TRADELINK_CONFIG.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tradelink_core::config::BackendConfig;

pub const CONFIG_ENV_VAR: &str = "TRADELINK_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_backend")]
    pub backend: BackendConfig,
    #[serde(default = "default_true")]
    pub seed_defaults: bool,
    /// Sessions unused for this long are dropped.
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_true() -> bool {
    true
}

fn default_session_idle_secs() -> u64 {
    30 * 60
}

/// Local JSON file under the platform data dir: ~/.local/share/tradelink/links.json
fn default_backend() -> BackendConfig {
    BackendConfig::Local {
        path: dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tradelink")
            .join("links.json"),
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            backend: default_backend(),
            seed_defaults: true,
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

/// Config path: $TRADELINK_CONFIG, else ~/.config/tradelink/config.json
pub fn default_config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
        return PathBuf::from(path);
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tradelink")
        .join("config.json")
}

/// Load config from path. Returns defaults if the file doesn't exist.
/// Unreadable or malformed files are errors.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!(target: "tradelink.config", "No config at {}, using defaults", path.display());
            return Ok(ServerConfig::default());
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert!(config.seed_defaults);
        assert_eq!(config.session_idle_secs, 1800);
        assert!(matches!(config.backend, BackendConfig::Local { .. }));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"port": 9000, "seedDefaults": false,
                "backend": {"kind": "rest", "url": "https://db.test", "apiKey": "k"}}"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.bind_address, "127.0.0.1");
        assert!(!config.seed_defaults);
        match config.backend {
            BackendConfig::Rest(rest) => {
                assert_eq!(rest.url, "https://db.test");
                assert_eq!(rest.api_key, "k");
            }
            other => panic!("expected rest backend, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ port: ").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse { .. })));
    }
}
