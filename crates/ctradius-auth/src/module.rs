use crate::directory::DirectoryClient;
use crate::error::AuthError;
use crate::modules::{GroupsModule, GuestsModule};
use crate::request::UserRequest;
use crate::resolve::ResolvedModuleConfig;
use async_trait::async_trait;
use ctradius_proto::RadiusResponse;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Authorization module trait
///
/// Implement this trait to add a link to the authorization chain.
#[async_trait]
pub trait AuthModule: Send + Sync {
    /// Name of the config block this module was built from
    fn name(&self) -> &str;

    /// Decide on a normalized request
    ///
    /// Returns `Ok(None)` when the module has no opinion and the next module
    /// in the chain should be asked. Errors abort the whole chain.
    async fn authorize(&self, request: &UserRequest) -> Result<Option<RadiusResponse>, AuthError>;
}

/// Builds a module from the shared directory client and its resolved config
pub type ModuleFactory = Box<
    dyn Fn(Arc<dyn DirectoryClient>, &ResolvedModuleConfig) -> Result<Box<dyn AuthModule>, AuthError>
        + Send
        + Sync,
>;

/// Module factories keyed by the `type` of a config block
pub struct ModuleRegistry {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleRegistry {
    /// Empty registry
    pub fn new() -> Self {
        ModuleRegistry {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with `ct-groups` and `ct-guests`
    pub fn with_builtin_modules() -> Self {
        let mut registry = Self::new();
        registry.register(GroupsModule::TYPE, |client, config| {
            Ok(Box::new(GroupsModule::from_config(client, config)?))
        });
        registry.register(GuestsModule::TYPE, |client, config| {
            Ok(Box::new(GuestsModule::from_config(client, config)?))
        });
        registry
    }

    pub fn register<F>(&mut self, module_type: &str, factory: F)
    where
        F: Fn(Arc<dyn DirectoryClient>, &ResolvedModuleConfig) -> Result<Box<dyn AuthModule>, AuthError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(module_type.to_string(), Box::new(factory));
    }

    pub fn contains(&self, module_type: &str) -> bool {
        self.factories.contains_key(module_type)
    }

    pub fn module_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build(
        &self,
        client: Arc<dyn DirectoryClient>,
        config: &ResolvedModuleConfig,
    ) -> Result<Box<dyn AuthModule>, AuthError> {
        let factory = self.factories.get(config.module_type()).ok_or_else(|| {
            AuthError::misconfigured(format!(
                "Unknown module type '{}' for module '{}'",
                config.module_type(),
                config.name()
            ))
        })?;
        factory(client, config)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::with_builtin_modules()
    }
}
