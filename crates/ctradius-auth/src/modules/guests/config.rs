use crate::config::ConfigError;
use crate::resolve::ResolvedModuleConfig;
use serde::Deserialize;
use std::time::Duration;

fn default_cache_timeout() -> u64 {
    300
}

fn default_extension_key() -> String {
    "ctradius".to_string()
}

fn default_category_name() -> String {
    "guests".to_string()
}

/// `ct-guests` module configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestsConfig {
    /// SQLite file, must end with `.sqlite`
    pub cache_path: String,
    /// Seconds
    #[serde(default = "default_cache_timeout")]
    pub cache_timeout: u64,
    #[serde(default)]
    pub vlans_required: bool,
    #[serde(default)]
    pub allowed_vlans: Option<Vec<u32>>,
    #[serde(default = "default_extension_key")]
    pub extension_key: String,
    #[serde(default = "default_category_name")]
    pub category_name: String,
}

impl GuestsConfig {
    pub fn from_resolved(resolved: &ResolvedModuleConfig) -> Result<Self, ConfigError> {
        let mut config: GuestsConfig = resolved.parse()?;
        config.cache_path = config.cache_path.trim().to_string();

        if config.cache_path.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Module '{}': cachePath must not be empty",
                resolved.name()
            )));
        }
        if !config.cache_path.ends_with(".sqlite") {
            return Err(ConfigError::Invalid(format!(
                "Module '{}': cachePath must end with .sqlite",
                resolved.name()
            )));
        }
        if config.extension_key.trim().is_empty() || config.category_name.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "Module '{}': extensionKey and categoryName must not be empty",
                resolved.name()
            )));
        }
        Ok(config)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_timeout)
    }

    /// Whether `vlan` passes the optional allow-list
    pub fn is_vlan_allowed(&self, vlan: u32) -> bool {
        self.allowed_vlans
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&vlan))
    }
}
