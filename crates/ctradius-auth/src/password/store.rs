use super::PasswordError;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

/// Source of encrypted secondary passwords
#[async_trait]
pub trait PasswordStore: Send + Sync {
    /// Base64 ciphertext for `user_id`, `None` when the store has no entry
    async fn fetch_secondary_password(&self, user_id: u64) -> Result<Option<String>, PasswordError>;
}

/// Password store reached over HTTPS (`GET {url}/entries/{id}`)
pub struct HttpPasswordStore {
    http: reqwest::Client,
    server_url: String,
    api_token: String,
}

impl HttpPasswordStore {
    pub fn new(server_url: &str, api_token: &str) -> Result<Self, PasswordError> {
        let server_url = server_url.trim();
        let api_token = api_token.trim();
        if api_token.is_empty() {
            return Err(PasswordError::MissingArgument("apiToken"));
        }
        if server_url.is_empty() {
            return Err(PasswordError::MissingArgument("serverUrl"));
        }
        if !server_url.starts_with("https://") {
            return Err(PasswordError::InsecureServerUrl(server_url.to_string()));
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| PasswordError::Transport(e.to_string()))?;

        Ok(HttpPasswordStore {
            http,
            server_url: server_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        })
    }

    pub fn entry_url(&self, user_id: u64) -> String {
        format!("{}/entries/{}", self.server_url, user_id)
    }
}

#[async_trait]
impl PasswordStore for HttpPasswordStore {
    async fn fetch_secondary_password(&self, user_id: u64) -> Result<Option<String>, PasswordError> {
        debug!(user_id, "Fetching password store entry");

        let response = self
            .http
            .get(self.entry_url(user_id))
            .header(reqwest::header::AUTHORIZATION, format!("Login {}", self.api_token))
            .send()
            .await
            .map_err(|e| PasswordError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| PasswordError::Transport(e.to_string()))?;

        interpret_entry_response(status, &body)
    }
}

/// Map a password store reply to the encrypted password
///
/// 200 must carry a non-blank `secondaryPassword`; 404 means no entry.
/// Everything else is a failure.
pub fn interpret_entry_response(status: u16, body: &str) -> Result<Option<String>, PasswordError> {
    match status {
        200 => {
            let json: Value = serde_json::from_str(body).map_err(|_| {
                PasswordError::InvalidResponse("Failed to parse JSON response from backend".to_string())
            })?;
            match json.get("secondaryPassword").and_then(Value::as_str).map(str::trim) {
                Some(pwd) if !pwd.is_empty() => Ok(Some(pwd.to_string())),
                _ => Err(PasswordError::MissingPassword),
            }
        }
        404 => Ok(None),
        status => Err(PasswordError::UnexpectedStatus {
            status,
            body: body.to_string(),
        }),
    }
}
