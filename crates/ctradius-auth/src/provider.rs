//! Authorization chain orchestration

use crate::config::{AppConfig, ConfigError, ALLOWED_REQUEST_ROUTES};
use crate::directory::DirectoryClient;
use crate::error::{AuthError, ErrorKind};
use crate::module::{AuthModule, ModuleRegistry};
use crate::request::UserRequest;
use ctradius_proto::RadiusResponse;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Ordered module chain for one request route
///
/// Modules are asked in declared order; the first one with an opinion
/// decides. Errors abort the chain. No opinion at all means Reject.
pub struct AuthProvider {
    route: String,
    vlan_separator: Option<String>,
    modules: Vec<Box<dyn AuthModule>>,
}

impl AuthProvider {
    /// Build the chain for `route`
    ///
    /// Every module block of the config is resolved and its type checked
    /// against the registry, not only the ones on this route.
    pub fn new(
        config: &AppConfig,
        route: &str,
        registry: &ModuleRegistry,
        client: Arc<dyn DirectoryClient>,
    ) -> Result<Self, AuthError> {
        if !ALLOWED_REQUEST_ROUTES.contains(&route) {
            return Err(ConfigError::Invalid(format!(
                "Unknown request route '{}', expected one of {:?}",
                route, ALLOWED_REQUEST_ROUTES
            ))
            .into());
        }

        for name in config.module_names() {
            let resolved = config.resolve_module(name)?;
            if !registry.contains(resolved.module_type()) {
                return Err(AuthError::misconfigured(format!(
                    "Module '{}' has unknown type '{}'",
                    name,
                    resolved.module_type()
                )));
            }
        }

        let mut modules = Vec::new();
        for name in &config.route(route)?.modules {
            let resolved = config.resolve_module(name)?;
            modules.push(registry.build(client.clone(), &resolved)?);
            debug!(route = %route, module = %name, module_type = %resolved.module_type(), "Loaded module");
        }

        Ok(AuthProvider {
            route: route.to_string(),
            vlan_separator: config.vlan_separator().map(str::to_string),
            modules,
        })
    }

    /// Chain from already built modules
    pub fn from_modules(
        route: impl Into<String>,
        vlan_separator: Option<String>,
        modules: Vec<Box<dyn AuthModule>>,
    ) -> Self {
        AuthProvider {
            route: route.into(),
            vlan_separator,
            modules,
        }
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub fn module_names(&self) -> Vec<&str> {
        self.modules.iter().map(|m| m.name()).collect()
    }

    /// Normalize `raw` and run the chain
    pub async fn authorize(&self, raw: &str) -> Result<RadiusResponse, AuthError> {
        let request = UserRequest::parse(raw, self.vlan_separator.as_deref())?;
        debug!(
            route = %self.route,
            username = %request.username(),
            requested_vlan = ?request.requested_vlan(),
            "Normalized request"
        );

        for module in &self.modules {
            if let Some(response) = module.authorize(&request).await? {
                info!(
                    username = %request.username(),
                    module = %module.name(),
                    reject = response.is_reject(),
                    "Module decided"
                );
                return Ok(response);
            }
            debug!(module = %module.name(), "No opinion");
        }

        info!(username = %request.username(), "No module decided, rejecting");
        Ok(RadiusResponse::Reject)
    }
}

/// Final result of one invocation: the stdout response and the exit code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub response: RadiusResponse,
    pub exit_code: u8,
}

impl Outcome {
    /// Log failures by kind and map them to Reject with exit code 1
    pub fn from_result(result: Result<RadiusResponse, AuthError>) -> Self {
        match result {
            Ok(response) => Outcome {
                response,
                exit_code: 0,
            },
            Err(e) => Self::failure(&e),
        }
    }

    pub fn failure(error: &AuthError) -> Self {
        match error.kind() {
            ErrorKind::Authentication => warn!(error = %error, "Authentication error"),
            ErrorKind::Configuration => error!(error = %error, "Configuration error"),
            ErrorKind::Internal => error!(error = %error, "Internal error"),
        }
        Outcome {
            response: RadiusResponse::Reject,
            exit_code: 1,
        }
    }
}
