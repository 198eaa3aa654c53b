//! `ct-guests`: time-boxed guest credentials
//!
//! Guests are independent of directory groups. A guest inside its validity
//! window gets a Challenge with the stored password and, if one is assigned,
//! its VLAN. Guests unknown to the data category are left to the next module.

mod config;
mod data;

pub use config::GuestsConfig;
pub use data::{parse_guest_values, GuestCredential, GuestDataError, GuestDataService, ValidityWindow};

use crate::directory::DirectoryClient;
use crate::error::AuthError;
use crate::module::AuthModule;
use crate::request::UserRequest;
use crate::resolve::ResolvedModuleConfig;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use ctradius_proto::{RadiusResponse, VlanAttributes};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub struct GuestsModule {
    name: String,
    config: GuestsConfig,
    client: Arc<dyn DirectoryClient>,
    data: OnceCell<GuestDataService>,
}

impl GuestsModule {
    pub const TYPE: &'static str = "ct-guests";

    pub fn from_config(
        client: Arc<dyn DirectoryClient>,
        resolved: &ResolvedModuleConfig,
    ) -> Result<Self, AuthError> {
        let config = GuestsConfig::from_resolved(resolved)?;
        Ok(Self::new(resolved.name(), config, client))
    }

    pub fn new(name: impl Into<String>, config: GuestsConfig, client: Arc<dyn DirectoryClient>) -> Self {
        GuestsModule {
            name: name.into(),
            config,
            client,
            data: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &GuestsConfig {
        &self.config
    }

    async fn data(&self) -> Result<&GuestDataService, AuthError> {
        self.data
            .get_or_try_init(|| {
                GuestDataService::open(
                    self.client.clone(),
                    &self.config.extension_key,
                    &self.config.category_name,
                    &self.config.cache_path,
                    self.config.cache_ttl(),
                )
            })
            .await
    }

    /// Decision for a known guest on `today` (UTC date)
    ///
    /// VLAN problems of the stored record are operator errors and fail;
    /// an expired window or a mismatching VLAN request is a plain Reject.
    pub fn decide(
        &self,
        guest: &GuestCredential,
        request: &UserRequest,
        today: NaiveDate,
    ) -> Result<RadiusResponse, AuthError> {
        if self.config.vlans_required && guest.assigned_vlan.is_none() {
            return Err(AuthError::misconfigured(format!(
                "Guest user '{}' has no VLAN assigned, but VLANs are required",
                guest.username
            )));
        }

        if let Some(vlan) = guest.assigned_vlan {
            if !self.config.is_vlan_allowed(vlan) {
                return Err(AuthError::misconfigured(format!(
                    "Guest user '{}' is assigned to VLAN {}, which is not allowed",
                    guest.username, vlan
                )));
            }
        }

        if today < guest.valid.from.date_naive() || today > guest.valid.to.date_naive() {
            info!(username = %request.username(), "Guest is outside its validity period");
            return Ok(RadiusResponse::Reject);
        }

        if let Some(requested) = request.requested_vlan() {
            if guest.assigned_vlan != Some(requested) {
                info!(
                    username = %request.username(),
                    requested_vlan = requested,
                    assigned_vlan = ?guest.assigned_vlan,
                    "Requested VLAN does not match guest assignment"
                );
                return Ok(RadiusResponse::Reject);
            }
        }

        Ok(RadiusResponse::challenge(
            guest.password.as_str(),
            guest.assigned_vlan.map(VlanAttributes::new),
        )?)
    }
}

#[async_trait]
impl AuthModule for GuestsModule {
    fn name(&self) -> &str {
        &self.name
    }

    async fn authorize(&self, request: &UserRequest) -> Result<Option<RadiusResponse>, AuthError> {
        debug!(module = %self.name, username = %request.username(), "Checking guest credentials");

        let guest = match self.data().await?.get(request.username()).await? {
            Some(guest) => guest,
            None => {
                info!(
                    username = %request.username(),
                    "Guest user not found, forwarding to next module"
                );
                return Ok(None);
            }
        };

        self.decide(&guest, request, Utc::now().date_naive()).map(Some)
    }
}
