/// Shared configuration types for selecting and tuning a storage backend.
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which persistence backend to use. Exactly one is chosen at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// JSON document on the local filesystem.
    Local { path: PathBuf },
    /// Hosted REST structured-data service.
    Rest(RestBackendConfig),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestBackendConfig {
    /// Service root, e.g. `https://example.supabase.co`.
    pub url: String,
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    15
}
