use super::{DirectoryClient, DirectoryError};
use crate::config::BackendConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use tracing::{debug, trace};

const PAGE_LIMIT: u32 = 100;

/// HTTP client for the ChurchTools REST API
pub struct ChurchToolsClient {
    http: reqwest::Client,
    api_base: String,
    api_token: String,
}

impl ChurchToolsClient {
    pub fn new(backend: &BackendConfig) -> Result<Self, DirectoryError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;
        Ok(Self::with_http_client(http, backend))
    }

    pub fn with_http_client(http: reqwest::Client, backend: &BackendConfig) -> Self {
        ChurchToolsClient {
            http,
            api_base: format!("{}/api", backend.server_url.trim_end_matches('/')),
            api_token: backend.api_token.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.api_base, path)
        } else {
            format!("{}/{}", self.api_base, path)
        }
    }

    async fn fetch(&self, path: &str, query: &[(&str, String)]) -> Result<Value, DirectoryError> {
        trace!(path = %path, "GET");

        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .header(reqwest::header::AUTHORIZATION, format!("Login {}", self.api_token))
            .send()
            .await
            .map_err(|e| DirectoryError::Transport(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json::<Value>()
                .await
                .map_err(|e| DirectoryError::invalid_response(path, e.to_string())),
            StatusCode::NOT_FOUND => Err(DirectoryError::NotFound(path.to_string())),
            status => Err(DirectoryError::Status {
                status: status.as_u16(),
                path: path.to_string(),
            }),
        }
    }
}

#[async_trait]
impl DirectoryClient for ChurchToolsClient {
    async fn get(&self, path: &str) -> Result<Value, DirectoryError> {
        let body = self.fetch(path, &[]).await?;
        Ok(unwrap_data(body))
    }

    async fn get_all_pages(&self, path: &str) -> Result<Vec<Value>, DirectoryError> {
        let mut items = Vec::new();
        let mut page: u64 = 1;

        loop {
            let body = self
                .fetch(path, &[("page", page.to_string()), ("limit", PAGE_LIMIT.to_string())])
                .await?;
            let last = last_page(&body);

            match unwrap_data(body) {
                Value::Array(chunk) => items.extend(chunk),
                _ => return Err(DirectoryError::invalid_response(path, "expected an array")),
            }

            match last {
                Some(last) if page < last => page += 1,
                _ => break,
            }
        }

        debug!(path = %path, pages = page, count = items.len(), "Fetched paginated collection");
        Ok(items)
    }
}

/// Strip the `{"data": ...}` envelope ChurchTools wraps responses in
fn unwrap_data(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn last_page(body: &Value) -> Option<u64> {
    body.pointer("/meta/pagination/lastPage")?.as_u64()
}
