//! Lookup of the password store location and credentials in ChurchTools

use super::PasswordError;
use crate::directory::{DirectoryClient, ExtensionData};
use serde_json::Value;
use tracing::debug;

/// Extension holding the password store settings
pub const PASSWORD_STORE_EXTENSION: &str = "ctpassstore";

const SETTINGS_CATEGORY: &str = "settings";
const BACKEND_URL_FIELD: &str = "backendUrl";

/// Base URL of the password store from the `ctpassstore` settings entry
pub async fn password_store_url(extension: &ExtensionData) -> Result<String, PasswordError> {
    let entry = extension.single_value(SETTINGS_CATEGORY).await?;
    let raw = entry
        .value
        .ok_or_else(|| PasswordError::Settings("settings entry has no value".to_string()))?;

    let settings: Value = serde_json::from_str(&raw)
        .map_err(|e| PasswordError::Settings(format!("settings entry is not JSON: {}", e)))?;

    let url = settings
        .get(BACKEND_URL_FIELD)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| PasswordError::Settings(format!("{} is missing", BACKEND_URL_FIELD)))?;

    debug!(url = %url, "Resolved password store URL");
    Ok(url.to_string())
}

/// Login token of the API user, used to authenticate against the store
pub async fn login_token(client: &dyn DirectoryClient) -> Result<String, PasswordError> {
    let whoami = client.get("/whoami").await?;
    let user_id = whoami
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| PasswordError::InvalidResponse("whoami returned no id".to_string()))?;

    let token = client.get(&format!("/persons/{}/logintoken", user_id)).await?;
    token
        .as_str()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PasswordError::InvalidResponse("login token is empty".to_string()))
}
