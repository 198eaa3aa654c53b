use crate::resolve::{
    declared_parent, declared_type, resolve_module_config, ModuleBlock, ResolvedModuleConfig,
    INHERITS_KEY, TYPE_KEY,
};
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Request routes the RADIUS server may select
pub const ALLOWED_REQUEST_ROUTES: [&str; 2] = ["wifi", "vpn"];

/// Top-level keys that are not module blocks
pub const RESERVED_KEYS: [&str; 4] = [
    "backendConfig",
    "allowRequestedVlan",
    "vlanSeparator",
    "requestRoutes",
];

pub const SERVER_URL_ENV: &str = "CT_SERVER_URL";
pub const API_TOKEN_ENV: &str = "CT_API_TOKEN";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Module '{0}' not found in configuration")]
    ModuleNotFound(String),
    #[error("Inheritance cycle detected at module '{0}'")]
    InheritanceCycle(String),
    #[error("Environment variable {0} is not set")]
    MissingEnv(&'static str),
    #[error("Failed to load env file: {0}")]
    EnvFile(String),
}

/// Connection settings for the ChurchTools directory
///
/// Never read from the config file; only from the environment.
#[derive(Clone)]
pub struct BackendConfig {
    pub server_url: String,
    pub api_token: String,
}

impl BackendConfig {
    pub fn new(server_url: impl Into<String>, api_token: impl Into<String>) -> Result<Self, ConfigError> {
        let config = BackendConfig {
            server_url: server_url.into().trim().trim_end_matches('/').to_string(),
            api_token: api_token.into().trim().to_string(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Read `CT_SERVER_URL` and `CT_API_TOKEN` from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_url = lookup(SERVER_URL_ENV)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(SERVER_URL_ENV))?;
        let api_token = lookup(API_TOKEN_ENV)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::MissingEnv(API_TOKEN_ENV))?;
        Self::new(server_url, api_token)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.server_url.starts_with("https://") {
            return Err(ConfigError::Invalid(format!(
                "Server URL must use https: {}",
                self.server_url
            )));
        }
        if self.api_token.is_empty() {
            return Err(ConfigError::Invalid("API token cannot be empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("server_url", &self.server_url)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Ordered module list of one request route
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestRoute {
    pub modules: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAppConfig {
    #[serde(default)]
    allow_requested_vlan: bool,
    #[serde(default)]
    vlan_separator: Option<String>,
    #[serde(default)]
    request_routes: BTreeMap<String, RequestRoute>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

/// Parsed and validated application configuration
#[derive(Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub allow_requested_vlan: bool,
    vlan_separator: Option<String>,
    request_routes: BTreeMap<String, RequestRoute>,
    modules: BTreeMap<String, ModuleBlock>,
    resolved: DashMap<String, ResolvedModuleConfig>,
}

impl AppConfig {
    /// Load the env file (if any), the backend settings and the config file
    pub fn load(path: &Path, env_file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(env_file) = env_file {
            dotenvy::from_path(env_file)
                .map_err(|e| ConfigError::EnvFile(format!("{}: {}", env_file.display(), e)))?;
            debug!(path = %env_file.display(), "Loaded environment file");
        }
        let backend = BackendConfig::from_env()?;
        Self::from_file(path, backend)
    }

    pub fn from_file<P: AsRef<Path>>(path: P, backend: BackendConfig) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents, backend)
    }

    pub fn from_json_str(contents: &str, backend: BackendConfig) -> Result<Self, ConfigError> {
        let raw: RawAppConfig = serde_json::from_str(contents)?;

        let mut modules = BTreeMap::new();
        for (name, value) in raw.rest {
            if name == "backendConfig" {
                return Err(ConfigError::Invalid(
                    "backendConfig must not be set in the config file; use CT_SERVER_URL and CT_API_TOKEN"
                        .to_string(),
                ));
            }
            match value {
                Value::Object(block) => {
                    modules.insert(name, block);
                }
                _ => {
                    return Err(ConfigError::Invalid(format!(
                        "Module '{}' must be a JSON object",
                        name
                    )))
                }
            }
        }

        let config = AppConfig {
            backend,
            allow_requested_vlan: raw.allow_requested_vlan,
            vlan_separator: raw.vlan_separator,
            request_routes: raw.request_routes,
            modules,
            resolved: DashMap::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Separator for `user<sep>vlan` requests, only when VLAN requests are allowed
    pub fn vlan_separator(&self) -> Option<&str> {
        if self.allow_requested_vlan {
            self.vlan_separator.as_deref()
        } else {
            None
        }
    }

    pub fn route(&self, name: &str) -> Result<&RequestRoute, ConfigError> {
        self.request_routes.get(name).ok_or_else(|| {
            ConfigError::Invalid(format!("Request route '{}' is not configured", name))
        })
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    /// Resolve a module block through its `inherits` chain, memoized per name
    pub fn resolve_module(&self, name: &str) -> Result<ResolvedModuleConfig, ConfigError> {
        if let Some(cached) = self.resolved.get(name) {
            return Ok(cached.clone());
        }
        let fields = resolve_module_config(&self.modules, name)?;
        let resolved = ResolvedModuleConfig::new(name, fields)?;
        debug!(
            module = %name,
            module_type = %resolved.module_type(),
            "Resolved module configuration"
        );
        self.resolved.insert(name.to_string(), resolved.clone());
        Ok(resolved)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.allow_requested_vlan {
            match self.vlan_separator.as_deref() {
                Some(sep) if !sep.is_empty() => {}
                _ => {
                    return Err(ConfigError::Invalid(
                        "vlanSeparator must be a non-empty string when allowRequestedVlan is true"
                            .to_string(),
                    ))
                }
            }
        }

        for (route, definition) in &self.request_routes {
            if !ALLOWED_REQUEST_ROUTES.contains(&route.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Unknown request route '{}', expected one of {:?}",
                    route, ALLOWED_REQUEST_ROUTES
                )));
            }
            if definition.modules.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Request route '{}' has no modules",
                    route
                )));
            }
            for module in &definition.modules {
                if !self.modules.contains_key(module) {
                    return Err(ConfigError::ModuleNotFound(module.clone()));
                }
            }
        }

        for (name, block) in &self.modules {
            match (block.get(TYPE_KEY), block.get(INHERITS_KEY)) {
                (Some(_), Some(_)) => {
                    return Err(ConfigError::Invalid(format!(
                        "Module '{}' must not declare both 'type' and 'inherits'",
                        name
                    )))
                }
                (None, None) => {
                    return Err(ConfigError::Invalid(format!(
                        "Module '{}' has neither 'type' nor 'inherits'",
                        name
                    )))
                }
                (Some(_), None) if declared_type(block).is_none() => {
                    return Err(ConfigError::Invalid(format!(
                        "Module '{}' has an invalid 'type'",
                        name
                    )))
                }
                (None, Some(_)) if declared_parent(block).is_none() => {
                    return Err(ConfigError::Invalid(format!(
                        "Module '{}' has an invalid 'inherits'",
                        name
                    )))
                }
                _ => {}
            }
            resolve_module_config(&self.modules, name)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn backend() -> BackendConfig {
        BackendConfig::new("https://example.church.tools", "token").unwrap()
    }

    fn parse(value: Value) -> Result<AppConfig, ConfigError> {
        AppConfig::from_json_str(&value.to_string(), backend())
    }

    fn sample() -> Value {
        json!({
            "allowRequestedVlan": true,
            "vlanSeparator": "|",
            "requestRoutes": {
                "wifi": { "modules": ["staff", "guests"] },
                "vpn": { "modules": ["staff"] }
            },
            "staff": { "type": "ct-groups", "cacheTimeout": 5 },
            "guests": { "type": "ct-guests", "cachePath": "/tmp/guests.sqlite" }
        })
    }

    #[test]
    fn test_parse_sample_config() {
        let config = parse(sample()).unwrap();
        assert!(config.allow_requested_vlan);
        assert_eq!(config.vlan_separator(), Some("|"));
        assert_eq!(config.route("wifi").unwrap().modules, vec!["staff", "guests"]);
        assert_eq!(config.route("vpn").unwrap().modules, vec!["staff"]);
        assert_eq!(config.module_names().collect::<Vec<_>>(), vec!["guests", "staff"]);
    }

    #[test]
    fn test_separator_ignored_when_vlan_requests_disabled() {
        let mut value = sample();
        value["allowRequestedVlan"] = json!(false);
        let config = parse(value).unwrap();
        assert_eq!(config.vlan_separator(), None);
    }

    #[test]
    fn test_defaults() {
        let config = parse(json!({})).unwrap();
        assert!(!config.allow_requested_vlan);
        assert_eq!(config.vlan_separator(), None);
        assert!(config.route("wifi").is_err());
    }

    #[test]
    fn test_backend_config_in_file_rejected() {
        let mut value = sample();
        value["backendConfig"] = json!({ "serverUrl": "https://x", "apiToken": "t" });
        assert!(matches!(parse(value), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_separator_rejected() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("vlanSeparator");
        assert!(matches!(parse(value), Err(ConfigError::Invalid(_))));

        let mut value = sample();
        value["vlanSeparator"] = json!("");
        assert!(matches!(parse(value), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_route_rejected() {
        let mut value = sample();
        value["requestRoutes"]["ethernet"] = json!({ "modules": ["staff"] });
        assert!(matches!(parse(value), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_empty_route_rejected() {
        let mut value = sample();
        value["requestRoutes"]["vpn"] = json!({ "modules": [] });
        assert!(matches!(parse(value), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_route_referencing_missing_module() {
        let mut value = sample();
        value["requestRoutes"]["vpn"] = json!({ "modules": ["ghost"] });
        assert!(matches!(parse(value), Err(ConfigError::ModuleNotFound(name)) if name == "ghost"));
    }

    #[test]
    fn test_module_block_must_be_object() {
        let mut value = sample();
        value["staff"] = json!("ct-groups");
        assert!(matches!(parse(value), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_type_and_inherits_exclusive() {
        let mut value = sample();
        value["staff"]["inherits"] = json!("guests");
        assert!(matches!(parse(value), Err(ConfigError::Invalid(_))));

        let mut value = sample();
        value["lonely"] = json!({ "cacheTimeout": 1 });
        assert!(matches!(parse(value), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_cycle_rejected_at_load() {
        let mut value = sample();
        value["a"] = json!({ "inherits": "b" });
        value["b"] = json!({ "inherits": "a" });
        assert!(matches!(parse(value), Err(ConfigError::InheritanceCycle(_))));
    }

    #[test]
    fn test_resolve_module_memoized() {
        let mut value = sample();
        value["staff-vpn"] = json!({ "inherits": "staff", "cacheTimeout": 30 });
        let config = parse(value).unwrap();

        let first = config.resolve_module("staff-vpn").unwrap();
        assert_eq!(first.module_type(), "ct-groups");
        assert_eq!(first.fields()["cacheTimeout"], json!(30));
        assert!(first.fields().get("inherits").is_none());

        let second = config.resolve_module("staff-vpn").unwrap();
        assert_eq!(first, second);
        assert_eq!(config.resolved.len(), 1);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", sample()).unwrap();
        let config = AppConfig::from_file(file.path(), backend()).unwrap();
        assert!(config.route("wifi").is_ok());
    }

    #[test]
    fn test_from_file_invalid_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            AppConfig::from_file(file.path(), backend()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_backend_from_lookup() {
        let backend = BackendConfig::from_lookup(|key| match key {
            SERVER_URL_ENV => Some("https://example.church.tools/".into()),
            API_TOKEN_ENV => Some(" secret ".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(backend.server_url, "https://example.church.tools");
        assert_eq!(backend.api_token, "secret");
        assert!(!format!("{:?}", backend).contains("secret"));
    }

    #[test]
    fn test_backend_requires_https() {
        let err = BackendConfig::new("http://example.church.tools", "token").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_backend_missing_env() {
        let err = BackendConfig::from_lookup(|key| match key {
            SERVER_URL_ENV => Some("https://example.church.tools".into()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnv(API_TOKEN_ENV)));
    }
}
