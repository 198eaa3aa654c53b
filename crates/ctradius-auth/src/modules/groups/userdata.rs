//! Directory records for the groups module
//!
//! Records are fetched in two phases. The identity phase pulls every person
//! and rewrites the whole cache with `username -> id`; the group phase asks
//! for one person's memberships and fills them in, keeping the identity
//! timestamp. An entry without memberships is partial.

use crate::cache::{CacheEntry, CachePayload, CacheStatus, TtlCache};
use crate::directory::{DirectoryClient, DirectoryError};
use crate::error::AuthError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonEntry {
    pub username: String,
    pub id: u64,
    #[serde(default)]
    pub groups: Option<Vec<u64>>,
}

impl CachePayload for PersonEntry {
    fn is_partial(&self) -> bool {
        self.groups.is_none()
    }
}

/// Fully populated directory record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub username: String,
    pub id: u64,
    pub groups: Vec<u64>,
}

pub struct UserdataService {
    client: Arc<dyn DirectoryClient>,
    field_name: String,
    cache: TtlCache<PersonEntry>,
}

impl UserdataService {
    pub async fn open(
        client: Arc<dyn DirectoryClient>,
        field_name: &str,
        cache_path: impl AsRef<Path>,
        ttl: Duration,
    ) -> Result<Self, AuthError> {
        let cache = TtlCache::open(cache_path, ttl).await?;
        Ok(UserdataService {
            client,
            field_name: field_name.trim().to_string(),
            cache,
        })
    }

    pub fn cache(&self) -> &TtlCache<PersonEntry> {
        &self.cache
    }

    /// Record for `username`, refreshing the cache as needed
    ///
    /// `None` when the directory has no person with that username.
    pub async fn get(&self, username: &str) -> Result<Option<DirectoryRecord>, AuthError> {
        let entry = match self.cache.get(username).await? {
            CacheStatus::Fresh(entry) => {
                debug!(username = %username, "Directory record served from cache");
                entry
            }
            CacheStatus::Partial(entry) => self.refresh_groups(entry).await?,
            CacheStatus::Absent | CacheStatus::Expired(_) => {
                self.refresh_identities().await?;
                match self.cache.peek(username).await? {
                    Some(entry) => self.refresh_groups(entry).await?,
                    None => return Ok(None),
                }
            }
        };

        let PersonEntry { username, id, groups } = entry.payload;
        Ok(Some(DirectoryRecord {
            username,
            id,
            groups: groups.unwrap_or_default(),
        }))
    }

    /// Replace the cache with every person of the directory
    pub async fn refresh_identities(&self) -> Result<usize, AuthError> {
        let persons = self.client.get_all_pages("/persons").await?;
        let entries = person_entries(&persons, &self.field_name);
        let written = self.cache.replace_all(&entries).await?;
        info!(persons = persons.len(), cached = written, "Refreshed directory identities");
        Ok(written)
    }

    /// Fetch memberships of one cached person, keeping its identity timestamp
    pub async fn refresh_groups(
        &self,
        entry: CacheEntry<PersonEntry>,
    ) -> Result<CacheEntry<PersonEntry>, AuthError> {
        let path = format!("/persons/{}/groups", entry.payload.id);
        let groups = membership_group_ids(&path, self.client.get(&path).await?)?;
        debug!(username = %entry.key, groups = ?groups, "Refreshed group memberships");

        let payload = PersonEntry {
            groups: Some(groups),
            ..entry.payload
        };
        Ok(self.cache.put_at(&entry.key, &payload, entry.timestamp).await?)
    }
}

/// Cache entries for persons with a usable username, keyed by lowercased name
pub fn person_entries(persons: &[Value], field_name: &str) -> Vec<(String, PersonEntry)> {
    persons
        .iter()
        .filter_map(|person| {
            let username = person.get(field_name)?.as_str()?.trim().to_lowercase();
            let id = person.get("id")?.as_u64()?;
            if username.is_empty() {
                return None;
            }
            Some((
                username.clone(),
                PersonEntry {
                    username,
                    id,
                    groups: None,
                },
            ))
        })
        .collect()
}

/// Group ids from a `/persons/{id}/groups` response
pub fn membership_group_ids(path: &str, body: Value) -> Result<Vec<u64>, DirectoryError> {
    match body {
        Value::Null => Ok(Vec::new()),
        Value::Array(memberships) => Ok(memberships
            .iter()
            .filter_map(|m| m.pointer("/group/id").and_then(Value::as_u64))
            .collect()),
        _ => Err(DirectoryError::invalid_response(path, "expected an array of memberships")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeDirectory {
        persons: Mutex<Vec<Value>>,
        groups: HashMap<u64, Value>,
        person_calls: AtomicUsize,
        group_calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl DirectoryClient for FakeDirectory {
        async fn get(&self, path: &str) -> Result<Value, DirectoryError> {
            self.group_calls.fetch_add(1, Ordering::SeqCst);
            let id: u64 = path
                .trim_start_matches("/persons/")
                .trim_end_matches("/groups")
                .parse()
                .map_err(|_| DirectoryError::NotFound(path.to_string()))?;
            Ok(self.groups.get(&id).cloned().unwrap_or(json!([])))
        }

        async fn get_all_pages(&self, _path: &str) -> Result<Vec<Value>, DirectoryError> {
            self.person_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(DirectoryError::Transport("connection refused".into()));
            }
            Ok(self.persons.lock().unwrap().clone())
        }
    }

    fn directory() -> Arc<FakeDirectory> {
        let mut groups = HashMap::new();
        groups.insert(1, json!([{ "group": { "id": 10 } }, { "group": { "id": 11 } }]));
        groups.insert(2, json!([{ "group": { "id": 20 } }]));
        Arc::new(FakeDirectory {
            persons: Mutex::new(vec![
                json!({ "id": 1, "cmsUserId": " Alice ", "firstName": "Alice" }),
                json!({ "id": 2, "cmsUserId": "bob" }),
                json!({ "id": 3, "cmsUserId": "" }),
                json!({ "id": 4 }),
            ]),
            groups,
            ..Default::default()
        })
    }

    async fn service(dir: &TempDir, client: Arc<FakeDirectory>, ttl: u64) -> UserdataService {
        UserdataService::open(
            client,
            "cmsUserId",
            dir.path().join("groups.sqlite"),
            Duration::from_secs(ttl),
        )
        .await
        .unwrap()
    }

    #[test]
    fn test_person_entries_skip_unusable() {
        let persons = vec![
            json!({ "id": 1, "login": " Alice " }),
            json!({ "id": 2, "login": "  " }),
            json!({ "id": 3, "login": 5 }),
            json!({ "login": "noid" }),
        ];
        let entries = person_entries(&persons, "login");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "alice");
        assert_eq!(entries[0].1.id, 1);
        assert!(entries[0].1.groups.is_none());
    }

    #[test]
    fn test_membership_group_ids() {
        let body = json!([{ "group": { "id": 3 } }, { "group": {} }, { "other": 1 }]);
        assert_eq!(membership_group_ids("/p", body).unwrap(), vec![3]);
        assert!(membership_group_ids("/p", Value::Null).unwrap().is_empty());
        assert!(membership_group_ids("/p", json!({ "x": 1 })).is_err());
    }

    #[tokio::test]
    async fn test_absent_user_triggers_full_refresh() {
        let dir = TempDir::new().unwrap();
        let client = directory();
        let service = service(&dir, client.clone(), 60).await;

        let record = service.get("alice").await.unwrap().unwrap();
        assert_eq!(record.id, 1);
        assert_eq!(record.groups, vec![10, 11]);
        assert_eq!(client.person_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.group_calls.load(Ordering::SeqCst), 1);

        // Other persons are cached without memberships
        assert!(matches!(
            service.cache().get("bob").await.unwrap(),
            CacheStatus::Partial(_)
        ));
        assert_eq!(service.cache().len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fresh_entry_served_from_cache() {
        let dir = TempDir::new().unwrap();
        let client = directory();
        let service = service(&dir, client.clone(), 60).await;

        service.get("alice").await.unwrap();
        service.get("alice").await.unwrap();
        assert_eq!(client.person_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.group_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_partial_entry_refreshes_groups_only() {
        let dir = TempDir::new().unwrap();
        let client = directory();
        let service = service(&dir, client.clone(), 60).await;

        service.refresh_identities().await.unwrap();
        let before = service.cache().peek("bob").await.unwrap().unwrap();

        let record = service.get("bob").await.unwrap().unwrap();
        assert_eq!(record.groups, vec![20]);
        assert_eq!(client.person_calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.group_calls.load(Ordering::SeqCst), 1);

        let after = service.cache().peek("bob").await.unwrap().unwrap();
        assert_eq!(after.timestamp, before.timestamp);
    }

    #[tokio::test]
    async fn test_expired_entry_refreshes_everything() {
        let dir = TempDir::new().unwrap();
        let client = directory();
        let service = service(&dir, client.clone(), 0).await;

        service.get("alice").await.unwrap();
        service.get("alice").await.unwrap();
        assert_eq!(client.person_calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.group_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, directory(), 60).await;
        assert_eq!(service.get("mallory").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_identity_refresh_drops_removed_persons() {
        let dir = TempDir::new().unwrap();
        let client = directory();
        let service = service(&dir, client.clone(), 60).await;

        service.get("bob").await.unwrap().unwrap();
        client.persons.lock().unwrap().retain(|p| p["id"] != json!(2));

        service.refresh_identities().await.unwrap();
        assert!(service.cache().peek("bob").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_backend_failure_keeps_cache() {
        let dir = TempDir::new().unwrap();
        {
            let service = service(&dir, directory(), 60).await;
            service.get("alice").await.unwrap();
        }

        let failing = Arc::new(FakeDirectory {
            fail: true,
            ..Default::default()
        });
        let service = service(&dir, failing, 0).await;
        let err = service.get("alice").await.unwrap_err();
        assert!(matches!(err, AuthError::Directory(_)));
        assert!(service.cache().peek("alice").await.unwrap().is_some());
    }
}
