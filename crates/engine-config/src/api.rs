use crate::error::ConfigError;
use crate::paths::BridgePaths;
use serde::Deserialize;

fn default_base_url() -> String {
    "https://api.datasnap.cloud".to_string()
}

/// Control-plane connection settings, read from `config/api.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub api_key: String,
}

impl ApiConfig {
    pub fn load(paths: &BridgePaths) -> Result<Self, ConfigError> {
        let path = paths.api_config_file();
        let raw = std::fs::read_to_string(&path).map_err(|err| {
            ConfigError::ApiUnconfigured(format!("{}: {err}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|err| ConfigError::parse(path.display(), err))
    }
}
