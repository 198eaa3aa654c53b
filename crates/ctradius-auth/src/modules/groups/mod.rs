//! `ct-groups`: directory group membership to WiFi access and VLAN
//!
//! Per request:
//! 1. Look up the directory record (through the cache)
//! 2. Require membership in an access group
//! 3. Fetch and decrypt the user's secondary password
//! 4. Pick a VLAN from the mapping tables
//!
//! Unknown users are left to the next module.

mod config;
mod userdata;
mod vlan;

pub use config::{GroupsConfig, KEY_PASSPHRASE_ENV};
pub use userdata::{DirectoryRecord, PersonEntry, UserdataService};
pub use vlan::{VlanAssignment, VlanDecision, VlanMapping};

use crate::directory::{DirectoryClient, ExtensionData};
use crate::error::AuthError;
use crate::module::AuthModule;
use crate::password::{login_token, password_store_url, PasswordService, PASSWORD_STORE_EXTENSION};
use crate::request::UserRequest;
use crate::resolve::ResolvedModuleConfig;
use async_trait::async_trait;
use ctradius_proto::{RadiusResponse, VlanAttributes};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub struct GroupsModule {
    name: String,
    config: GroupsConfig,
    client: Arc<dyn DirectoryClient>,
    userdata: OnceCell<UserdataService>,
    passwords: OnceCell<PasswordService>,
}

impl GroupsModule {
    pub const TYPE: &'static str = "ct-groups";

    pub fn from_config(
        client: Arc<dyn DirectoryClient>,
        resolved: &ResolvedModuleConfig,
    ) -> Result<Self, AuthError> {
        let config = GroupsConfig::from_resolved(resolved)?;
        Ok(Self::new(resolved.name(), config, client))
    }

    pub fn new(name: impl Into<String>, config: GroupsConfig, client: Arc<dyn DirectoryClient>) -> Self {
        GroupsModule {
            name: name.into(),
            config,
            client,
            userdata: OnceCell::new(),
            passwords: OnceCell::new(),
        }
    }

    /// Use `service` instead of resolving the password store from the directory
    pub fn with_password_service(mut self, service: PasswordService) -> Self {
        self.passwords = OnceCell::from(service);
        self
    }

    pub fn config(&self) -> &GroupsConfig {
        &self.config
    }

    async fn userdata(&self) -> Result<&UserdataService, AuthError> {
        self.userdata
            .get_or_try_init(|| {
                UserdataService::open(
                    self.client.clone(),
                    &self.config.username_field_name,
                    &self.config.path_to_cache_file,
                    self.config.cache_ttl(),
                )
            })
            .await
    }

    async fn passwords(&self) -> Result<&PasswordService, AuthError> {
        self.passwords
            .get_or_try_init(|| async {
                let url = match self.config.password_store_url.as_deref() {
                    Some(url) => url.trim().to_string(),
                    None => {
                        let extension = ExtensionData::new(self.client.clone(), PASSWORD_STORE_EXTENSION);
                        password_store_url(&extension).await?
                    }
                };
                let token = login_token(self.client.as_ref()).await?;
                let service = PasswordService::connect(
                    &self.config.path_to_private_decryption_key,
                    self.config.passphrase(),
                    &token,
                    &url,
                )?;
                Ok::<_, AuthError>(service)
            })
            .await
    }
}

#[async_trait]
impl AuthModule for GroupsModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authorize(&self, request: &UserRequest) -> Result<Option<RadiusResponse>, AuthError> {
        let username = request.username();
        debug!(
            module = %self.name,
            username = %username,
            requested_vlan = ?request.requested_vlan(),
            "Checking directory membership"
        );

        let record = match self.userdata().await?.get(username).await? {
            Some(record) => record,
            None => {
                info!(username = %username, "User not found in directory, forwarding to next module");
                return Ok(None);
            }
        };

        if !self.config.has_wifi_access(&record.groups) {
            info!(username = %username, "User is not in any WiFi access group");
            return Ok(Some(RadiusResponse::Reject));
        }

        let password = match self.passwords().await?.get_cleartext_pwd(record.id).await? {
            Some(password) if !password.is_empty() => password,
            _ => {
                info!(username = %username, "No secondary password set, access disabled");
                return Ok(Some(RadiusResponse::Reject));
            }
        };

        let vlan = match self
            .config
            .vlan_mapping
            .decide(&record.groups, request.requested_vlan())
        {
            VlanDecision::Assigned(vlan) => Some(VlanAttributes::new(vlan)),
            VlanDecision::Unassigned => None,
            VlanDecision::Denied => {
                info!(
                    username = %username,
                    requested_vlan = ?request.requested_vlan(),
                    "Requested VLAN not available to user"
                );
                return Ok(Some(RadiusResponse::Reject));
            }
        };

        info!(
            username = %username,
            vlan = ?vlan.map(|v| v.tunnel_private_group_id),
            "Issuing challenge"
        );
        Ok(Some(RadiusResponse::challenge(password, vlan)?))
    }
}
