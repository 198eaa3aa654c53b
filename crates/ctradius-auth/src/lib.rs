//! ChurchTools RADIUS Authorization
//!
//! This crate decides Accept/Reject/Challenge for a RADIUS request by running
//! a chain of authorization modules backed by a ChurchTools directory. It is
//! meant to be invoked once per request as an external decision script; the
//! decision is printed as RADIUS attribute lines on stdout.
//!
//! # Features
//!
//! - Ordered module chain per request route (first responder wins)
//! - Username normalization with optional `user<sep>vlan` VLAN requests
//! - JSON configuration with module inheritance and cycle detection
//! - `ct-groups`: group membership to WiFi access and VLAN assignment
//! - `ct-guests`: time-boxed guest credentials from custom module data
//! - SQLite-backed TTL cache shared across process invocations
//! - RSA-OAEP decryption of per-user passwords from a password store
//!
//! # Example
//!
//! ```rust,no_run
//! use ctradius_auth::{AppConfig, AuthProvider, ChurchToolsClient, ModuleRegistry};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load(Path::new("config.json"), Some(Path::new(".env")))?;
//!     let client = Arc::new(ChurchToolsClient::new(&config.backend)?);
//!
//!     let registry = ModuleRegistry::with_builtin_modules();
//!     let provider = AuthProvider::new(&config, "wifi", &registry, client)?;
//!
//!     let response = provider.authorize("Alice|20").await?;
//!     println!("{}", response);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod module;
pub mod modules;
pub mod password;
pub mod provider;
pub mod request;
pub mod resolve;

pub use cache::{CacheEntry, CacheError, CachePayload, CacheStatus, TtlCache};
pub use config::{AppConfig, BackendConfig, ConfigError, RequestRoute};
pub use directory::{ChurchToolsClient, DirectoryClient, DirectoryError, ExtensionData};
pub use error::{AuthError, ErrorKind};
pub use module::{AuthModule, ModuleRegistry};
pub use modules::{GroupsModule, GuestsModule};
pub use password::{EncryptedPrivateKey, HttpPasswordStore, PasswordError, PasswordService, PasswordStore};
pub use provider::{AuthProvider, Outcome};
pub use request::UserRequest;
pub use resolve::{resolve_module_config, ModuleBlock, ResolvedModuleConfig};

pub use ctradius_proto::{RadiusResponse, VlanAttributes};
