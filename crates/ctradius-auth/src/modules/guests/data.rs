//! Guest credentials from ChurchTools custom module data
//!
//! The whole set lives in one data category, one JSON document per value.
//! Every refresh replaces the cached set atomically; a single bad value
//! aborts the refresh and leaves the previous set in place.

use crate::cache::{CachePayload, CacheStatus, TtlCache};
use crate::directory::{DataValue, DirectoryClient, ExtensionData};
use crate::error::AuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestCredential {
    pub username: String,
    pub password: String,
    pub valid: ValidityWindow,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_vlan: Option<u32>,
}

impl CachePayload for GuestCredential {}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum GuestDataError {
    #[error("Guest entry {index} has no value")]
    MissingValue { index: usize },
    #[error("Guest entry {index} is malformed: {message}")]
    Malformed { index: usize, message: String },
}

/// Parse every category value; the first bad one fails the whole batch
pub fn parse_guest_values(values: &[DataValue]) -> Result<Vec<GuestCredential>, GuestDataError> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            let raw = value
                .value
                .as_deref()
                .filter(|raw| !raw.trim().is_empty())
                .ok_or(GuestDataError::MissingValue { index })?;
            let guest: GuestCredential =
                serde_json::from_str(raw).map_err(|e| GuestDataError::Malformed {
                    index,
                    message: e.to_string(),
                })?;
            if guest.username.trim().is_empty() || guest.password.is_empty() {
                return Err(GuestDataError::Malformed {
                    index,
                    message: "username and password must not be empty".to_string(),
                });
            }
            Ok(guest)
        })
        .collect()
}

pub struct GuestDataService {
    client: Arc<dyn DirectoryClient>,
    extension_key: String,
    category_name: String,
    cache: TtlCache<GuestCredential>,
}

impl GuestDataService {
    pub async fn open(
        client: Arc<dyn DirectoryClient>,
        extension_key: &str,
        category_name: &str,
        cache_path: impl AsRef<Path>,
        ttl: Duration,
    ) -> Result<Self, AuthError> {
        let cache = TtlCache::open(cache_path, ttl).await?;
        Ok(GuestDataService {
            client,
            extension_key: extension_key.to_string(),
            category_name: category_name.to_string(),
            cache,
        })
    }

    pub fn cache(&self) -> &TtlCache<GuestCredential> {
        &self.cache
    }

    /// Credential for `username`; refreshes the whole set when absent or stale
    pub async fn get(&self, username: &str) -> Result<Option<GuestCredential>, AuthError> {
        match self.cache.get(username).await? {
            CacheStatus::Fresh(entry) | CacheStatus::Partial(entry) => {
                debug!(username = %username, "Guest served from cache");
                Ok(Some(entry.payload))
            }
            CacheStatus::Absent | CacheStatus::Expired(_) => {
                self.refresh().await?;
                Ok(self.cache.peek(username).await?.map(|entry| entry.payload))
            }
        }
    }

    /// Replace the cached set with the current category contents
    pub async fn refresh(&self) -> Result<usize, AuthError> {
        let extension = ExtensionData::new(self.client.clone(), self.extension_key.as_str());

        if !extension.has_category(&self.category_name).await? {
            info!(
                extension = %self.extension_key,
                category = %self.category_name,
                "Guest category does not exist, clearing guest cache"
            );
            return Ok(self.cache.replace_all(&[]).await?);
        }

        let values = extension.values(&self.category_name).await?;
        let guests = parse_guest_values(&values).map_err(|e| {
            AuthError::misconfigured(format!("Failed to load guest data from ChurchTools: {}", e))
        })?;

        let entries: Vec<(String, GuestCredential)> = guests
            .into_iter()
            .map(|guest| (guest.username.trim().to_lowercase(), guest))
            .collect();
        let written = self.cache.replace_all(&entries).await?;
        info!(guests = written, "Refreshed guest credentials");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct FakeDirectory {
        values: Mutex<Value>,
        has_category: bool,
        value_calls: AtomicUsize,
    }

    #[async_trait]
    impl DirectoryClient for FakeDirectory {
        async fn get(&self, path: &str) -> Result<Value, DirectoryError> {
            match path {
                "/custommodules/ctradius" => Ok(json!({ "id": 1 })),
                "/custommodules/1/customdatacategories" if self.has_category => {
                    Ok(json!([{ "id": 2, "name": "guests", "customModuleId": 1 }]))
                }
                "/custommodules/1/customdatacategories" => Ok(json!([])),
                "/custommodules/1/customdatacategories/2/customdatavalues" => {
                    self.value_calls.fetch_add(1, Ordering::SeqCst);
                    Ok(self.values.lock().unwrap().clone())
                }
                _ => Err(DirectoryError::NotFound(path.to_string())),
            }
        }

        async fn get_all_pages(&self, path: &str) -> Result<Vec<Value>, DirectoryError> {
            Err(DirectoryError::NotFound(path.to_string()))
        }
    }

    fn guest_value(username: &str, vlan: Option<u32>) -> Value {
        let mut guest = json!({
            "username": username,
            "password": "Guest.Pass1",
            "valid": { "from": "2026-01-01T00:00:00Z", "to": "2026-12-31T23:59:59Z" }
        });
        if let Some(vlan) = vlan {
            guest["assignedVlan"] = json!(vlan);
        }
        json!({ "id": 1, "value": guest.to_string() })
    }

    fn directory(values: Value, has_category: bool) -> Arc<FakeDirectory> {
        Arc::new(FakeDirectory {
            values: Mutex::new(values),
            has_category,
            value_calls: AtomicUsize::new(0),
        })
    }

    async fn service(dir: &TempDir, client: Arc<FakeDirectory>, ttl: u64) -> GuestDataService {
        GuestDataService::open(
            client,
            "ctradius",
            "guests",
            dir.path().join("guests.sqlite"),
            Duration::from_secs(ttl),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_parse_guest_values() {
        let values: Vec<DataValue> = serde_json::from_value(json!([
            guest_value("Visitor", Some(30)),
            guest_value("other", None)
        ]))
        .unwrap();
        let guests = parse_guest_values(&values).unwrap();
        assert_eq!(guests.len(), 2);
        assert_eq!(guests[0].assigned_vlan, Some(30));
        assert_eq!(guests[0].valid.from.to_rfc3339(), "2026-01-01T00:00:00+00:00");
        assert_eq!(guests[1].assigned_vlan, None);
    }

    #[test]
    fn test_parse_rejects_whole_batch() {
        let values: Vec<DataValue> = serde_json::from_value(json!([
            guest_value("ok", None),
            { "id": 2, "value": "{not json" }
        ]))
        .unwrap();
        assert!(matches!(
            parse_guest_values(&values),
            Err(GuestDataError::Malformed { index: 1, .. })
        ));

        let values: Vec<DataValue> = serde_json::from_value(json!([{ "id": 3 }])).unwrap();
        assert_eq!(
            parse_guest_values(&values),
            Err(GuestDataError::MissingValue { index: 0 })
        );

        let blank = json!({
            "username": " ",
            "password": "x",
            "valid": { "from": "2026-01-01T00:00:00Z", "to": "2026-01-02T00:00:00Z" }
        });
        let values: Vec<DataValue> =
            serde_json::from_value(json!([{ "value": blank.to_string() }])).unwrap();
        assert!(parse_guest_values(&values).is_err());
    }

    #[tokio::test]
    async fn test_get_refreshes_and_caches() {
        let dir = TempDir::new().unwrap();
        let client = directory(json!([guest_value("Visitor", Some(30))]), true);
        let service = service(&dir, client.clone(), 300).await;

        let guest = service.get("visitor").await.unwrap().unwrap();
        assert_eq!(guest.username, "Visitor");
        service.get("visitor").await.unwrap().unwrap();
        assert_eq!(client.value_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_guest() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, directory(json!([]), true), 300).await;
        assert_eq!(service.get("nobody").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_category_clears_cache() {
        let dir = TempDir::new().unwrap();
        {
            let service = service(&dir, directory(json!([guest_value("visitor", None)]), true), 300).await;
            service.refresh().await.unwrap();
            assert_eq!(service.cache().len().await.unwrap(), 1);
        }

        let service = service(&dir, directory(json!([]), false), 0).await;
        assert_eq!(service.get("visitor").await.unwrap(), None);
        assert!(service.cache().is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_refresh_keeps_previous_set() {
        let dir = TempDir::new().unwrap();
        let client = directory(json!([guest_value("visitor", None)]), true);
        let service = service(&dir, client.clone(), 300).await;
        service.refresh().await.unwrap();

        *client.values.lock().unwrap() = json!([{ "id": 9, "value": "{broken" }]);
        let err = service.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::Misconfigured(_)));
        assert!(service.cache().peek("visitor").await.unwrap().is_some());
    }
}
