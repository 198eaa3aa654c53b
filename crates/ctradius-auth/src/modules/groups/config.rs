use super::vlan::VlanMapping;
use crate::config::ConfigError;
use crate::resolve::ResolvedModuleConfig;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Environment variable carrying the private key passphrase
pub const KEY_PASSPHRASE_ENV: &str = "CT_PRIVATE_DECRYPTION_KEY_PWD";

fn default_cache_timeout() -> u64 {
    5
}

/// `ct-groups` module configuration
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupsConfig {
    #[serde(default)]
    pub wifi_access_groups: Vec<u64>,
    /// Treat every group of the VLAN tables as an access group too
    #[serde(default)]
    pub include_assignment_groups_in_access_groups: bool,
    pub path_to_private_decryption_key: String,
    pub path_to_cache_file: String,
    /// Seconds
    #[serde(default = "default_cache_timeout")]
    pub cache_timeout: u64,
    /// Person field holding the RADIUS username
    pub username_field_name: String,
    #[serde(default)]
    pub private_decryption_key_password: Option<String>,
    /// Overrides the URL from the password store extension settings
    #[serde(default)]
    pub password_store_url: Option<String>,
    #[serde(default)]
    pub vlan_mapping: VlanMapping,
}

impl GroupsConfig {
    pub fn from_resolved(resolved: &ResolvedModuleConfig) -> Result<Self, ConfigError> {
        Self::from_resolved_with_env(resolved, |key| std::env::var(key).ok())
    }

    pub fn from_resolved_with_env<F>(resolved: &ResolvedModuleConfig, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: GroupsConfig = resolved.parse()?;
        let has_passphrase = config
            .private_decryption_key_password
            .as_deref()
            .is_some_and(|p| !p.trim().is_empty());
        if !has_passphrase {
            config.private_decryption_key_password = lookup(KEY_PASSPHRASE_ENV);
        }
        config.validate(resolved.name())?;
        Ok(config)
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        let required = [
            ("pathToPrivateDecryptionKey", self.path_to_private_decryption_key.as_str()),
            ("pathToCacheFile", self.path_to_cache_file.as_str()),
            ("usernameFieldName", self.username_field_name.as_str()),
            (
                "privateDecryptionKeyPassword",
                self.private_decryption_key_password.as_deref().unwrap_or_default(),
            ),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Module '{}': {} must not be empty",
                    name, field
                )));
            }
        }

        if let Some(url) = &self.password_store_url {
            if !url.trim().starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "Module '{}': passwordStoreUrl must start with https://",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_timeout)
    }

    pub fn passphrase(&self) -> &str {
        self.private_decryption_key_password.as_deref().unwrap_or_default()
    }

    /// Whether any of `groups` grants WiFi access
    pub fn has_wifi_access(&self, groups: &[u64]) -> bool {
        let explicit = self.wifi_access_groups.iter().any(|g| groups.contains(g));
        explicit
            || (self.include_assignment_groups_in_access_groups
                && self.vlan_mapping.referenced_groups().any(|g| groups.contains(&g)))
    }
}

impl fmt::Debug for GroupsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupsConfig")
            .field("wifi_access_groups", &self.wifi_access_groups)
            .field(
                "include_assignment_groups_in_access_groups",
                &self.include_assignment_groups_in_access_groups,
            )
            .field("path_to_private_decryption_key", &self.path_to_private_decryption_key)
            .field("path_to_cache_file", &self.path_to_cache_file)
            .field("cache_timeout", &self.cache_timeout)
            .field("username_field_name", &self.username_field_name)
            .field("password_store_url", &self.password_store_url)
            .field("vlan_mapping", &self.vlan_mapping)
            .finish_non_exhaustive()
    }
}
