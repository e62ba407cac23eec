//! In-memory datastore backed by `DashMap`s keyed by record UUID.

use std::path::Path;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Store;
use super::models::{AuthMethodFilter, AuthMethodRecord, Binding, ServiceType};
use crate::{Error, Result};

/// Initial datastore content, as read from a seed file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Seed {
    /// Service types
    pub service_types: Vec<ServiceType>,
    /// Bindings
    pub bindings: Vec<Binding>,
    /// Auth methods
    pub auth_methods: Vec<AuthMethodRecord>,
}

/// In-memory store.
///
/// Lists come back sorted (service types and bindings by name, auth methods
/// by service + host) so responses are stable across calls.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    service_types: DashMap<String, ServiceType>,
    bindings: DashMap<String, Binding>,
    auth_methods: DashMap<String, AuthMethodRecord>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `seed`.
    #[must_use]
    pub fn with_seed(seed: Seed) -> Self {
        let store = Self::new();
        for st in seed.service_types {
            store.service_types.insert(st.uuid.clone(), st);
        }
        for binding in seed.bindings {
            store.bindings.insert(binding.uuid.clone(), binding);
        }
        for am in seed.auth_methods {
            store.auth_methods.insert(am.uuid.clone(), am);
        }
        store
    }

    /// Create a store from a JSON seed file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid seed.
    pub fn from_seed_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .map_err(|e| Error::Config(format!("Cannot read seed file '{}': {e}", path.display())))?;
        let seed: Seed = serde_json::from_slice(&data)
            .map_err(|e| Error::Config(format!("Invalid seed file '{}': {e}", path.display())))?;

        info!(
            service_types = seed.service_types.len(),
            bindings = seed.bindings.len(),
            auth_methods = seed.auth_methods.len(),
            "Loaded datastore seed"
        );

        Ok(Self::with_seed(seed))
    }
}

fn collect_sorted<T: Clone, K: Ord>(
    map: &DashMap<String, T>,
    keep: impl Fn(&T) -> bool,
    key: impl Fn(&T) -> K,
) -> Vec<T> {
    let mut items: Vec<T> = map
        .iter()
        .filter(|entry| keep(entry.value()))
        .map(|entry| entry.value().clone())
        .collect();
    items.sort_by_key(|item| key(item));
    items
}

fn replace<T>(map: &DashMap<String, T>, uuid: &str, updated: T, what: &str) -> Result<()> {
    match map.get_mut(uuid) {
        Some(mut slot) => {
            *slot = updated;
            Ok(())
        }
        None => Err(Error::Database(format!("{what} with uuid {uuid} does not exist"))),
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn query_service_types(&self, name: Option<&str>) -> Result<Vec<ServiceType>> {
        Ok(collect_sorted(
            &self.service_types,
            |st| name.is_none_or(|n| n == st.name),
            |st| st.name.clone(),
        ))
    }

    async fn query_service_types_by_uuid(&self, uuid: &str) -> Result<Vec<ServiceType>> {
        Ok(self
            .service_types
            .get(uuid)
            .map(|st| vec![st.clone()])
            .unwrap_or_default())
    }

    async fn insert_service_type(&self, service_type: ServiceType) -> Result<ServiceType> {
        debug!(name = %service_type.name, uuid = %service_type.uuid, "Inserting service type");
        self.service_types
            .insert(service_type.uuid.clone(), service_type.clone());
        Ok(service_type)
    }

    async fn update_service_type(&self, updated: ServiceType) -> Result<ServiceType> {
        let uuid = updated.uuid.clone();
        replace(&self.service_types, &uuid, updated.clone(), "Service type")?;
        Ok(updated)
    }

    async fn delete_service_type(&self, uuid: &str) -> Result<()> {
        self.service_types.remove(uuid);
        Ok(())
    }

    async fn query_bindings(
        &self,
        service_uuid: Option<&str>,
        host: Option<&str>,
    ) -> Result<Vec<Binding>> {
        Ok(collect_sorted(
            &self.bindings,
            |b| service_uuid.is_none_or(|s| s == b.service_uuid) && host.is_none_or(|h| h == b.host),
            |b| b.name.clone(),
        ))
    }

    async fn query_bindings_by_auth_id(
        &self,
        auth_id: &str,
        service_uuid: &str,
        host: &str,
        auth_type: &str,
    ) -> Result<Vec<Binding>> {
        Ok(collect_sorted(
            &self.bindings,
            |b| {
                b.auth_identifier == auth_id
                    && b.service_uuid == service_uuid
                    && b.host == host
                    && b.auth_type == auth_type
            },
            |b| b.name.clone(),
        ))
    }

    async fn query_bindings_by_uuid_and_name(
        &self,
        uuid: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Binding>> {
        Ok(collect_sorted(
            &self.bindings,
            |b| uuid.is_none_or(|u| u == b.uuid) && name.is_none_or(|n| n == b.name),
            |b| b.name.clone(),
        ))
    }

    async fn insert_binding(&self, binding: Binding) -> Result<Binding> {
        debug!(name = %binding.name, uuid = %binding.uuid, "Inserting binding");
        self.bindings.insert(binding.uuid.clone(), binding.clone());
        Ok(binding)
    }

    async fn update_binding(&self, updated: Binding) -> Result<Binding> {
        let uuid = updated.uuid.clone();
        replace(&self.bindings, &uuid, updated.clone(), "Binding")?;
        Ok(updated)
    }

    async fn update_binding_last_auth(&self, uuid: &str, last_auth: &str) -> Result<()> {
        match self.bindings.get_mut(uuid) {
            Some(mut binding) => {
                binding.last_auth = last_auth.to_string();
                Ok(())
            }
            None => Err(Error::Database(format!("Binding with uuid {uuid} does not exist"))),
        }
    }

    async fn delete_binding(&self, uuid: &str) -> Result<()> {
        self.bindings.remove(uuid);
        Ok(())
    }

    async fn delete_bindings_by_service(&self, service_uuid: &str) -> Result<()> {
        self.bindings.retain(|_, b| b.service_uuid != service_uuid);
        Ok(())
    }

    async fn query_auth_methods(
        &self,
        filter: &AuthMethodFilter,
    ) -> Result<Vec<AuthMethodRecord>> {
        Ok(collect_sorted(
            &self.auth_methods,
            |am| filter.matches(am),
            |am| (am.service_uuid.clone(), am.host.clone()),
        ))
    }

    async fn insert_auth_method(&self, record: AuthMethodRecord) -> Result<AuthMethodRecord> {
        debug!(service_uuid = %record.service_uuid, host = %record.host, kind = %record.kind, "Inserting auth method");
        self.auth_methods.insert(record.uuid.clone(), record.clone());
        Ok(record)
    }

    async fn update_auth_method(&self, updated: AuthMethodRecord) -> Result<AuthMethodRecord> {
        let uuid = updated.uuid.clone();
        replace(&self.auth_methods, &uuid, updated.clone(), "Auth method")?;
        Ok(updated)
    }

    async fn delete_auth_method(&self, uuid: &str) -> Result<()> {
        self.auth_methods.remove(uuid);
        Ok(())
    }

    async fn delete_auth_methods_by_service(&self, service_uuid: &str) -> Result<()> {
        self.auth_methods.retain(|_, am| am.service_uuid != service_uuid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn service_type(name: &str, uuid: &str) -> ServiceType {
        ServiceType {
            name: name.to_string(),
            hosts: vec!["host1".to_string()],
            auth_types: vec!["x509".to_string()],
            auth_method: "api-key".to_string(),
            uuid: uuid.to_string(),
            created_on: "2018-05-05T18:04:05Z".to_string(),
            kind: "ams".to_string(),
        }
    }

    fn binding(name: &str, uuid: &str, service_uuid: &str, dn: &str) -> Binding {
        Binding {
            name: name.to_string(),
            service_uuid: service_uuid.to_string(),
            host: "host1".to_string(),
            uuid: uuid.to_string(),
            auth_identifier: dn.to_string(),
            unique_key: format!("key-{name}"),
            auth_type: "x509".to_string(),
            created_on: "2018-05-05T18:04:05Z".to_string(),
            last_auth: String::new(),
        }
    }

    fn seeded() -> InMemoryStore {
        InMemoryStore::with_seed(Seed {
            service_types: vec![service_type("s2", "uuid2"), service_type("s1", "uuid1")],
            bindings: vec![
                binding("b1", "b_uuid1", "uuid1", "O=COMPANY,C=TC"),
                binding("b2", "b_uuid2", "uuid2", "O=OTHER,C=TC"),
            ],
            auth_methods: vec![AuthMethodRecord {
                service_uuid: "uuid1".to_string(),
                host: "host1".to_string(),
                port: 9000,
                kind: "api-key".to_string(),
                uuid: "am_uuid1".to_string(),
                access_key: Some("access".to_string()),
                ..AuthMethodRecord::default()
            }],
        })
    }

    #[tokio::test]
    async fn query_service_types_by_name_or_all() {
        let store = seeded();

        let all = store.query_service_types(None).await.unwrap();
        assert_eq!(
            all.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            vec!["s1", "s2"]
        );

        let one = store.query_service_types(Some("s2")).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].uuid, "uuid2");

        assert!(store.query_service_types(Some("nope")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_bindings_by_auth_id_matches_all_four_fields() {
        let store = seeded();

        let found = store
            .query_bindings_by_auth_id("O=COMPANY,C=TC", "uuid1", "host1", "x509")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let wrong_service = store
            .query_bindings_by_auth_id("O=COMPANY,C=TC", "uuid2", "host1", "x509")
            .await
            .unwrap();
        assert!(wrong_service.is_empty());
    }

    #[tokio::test]
    async fn update_binding_last_auth_sets_timestamp() {
        let store = seeded();
        store
            .update_binding_last_auth("b_uuid1", "2024-01-01T00:00:00Z")
            .await
            .unwrap();
        let b = store
            .query_bindings_by_uuid_and_name(Some("b_uuid1"), None)
            .await
            .unwrap();
        assert_eq!(b[0].last_auth, "2024-01-01T00:00:00Z");
    }

    #[tokio::test]
    async fn update_missing_record_is_database_error() {
        let store = InMemoryStore::new();
        let err = store
            .update_service_type(service_type("s1", "ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn cascade_deletes_by_service() {
        let store = seeded();
        store.delete_bindings_by_service("uuid1").await.unwrap();
        store.delete_auth_methods_by_service("uuid1").await.unwrap();

        assert_eq!(store.query_bindings(None, None).await.unwrap().len(), 1);
        assert!(
            store
                .query_auth_methods(&AuthMethodFilter::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn from_seed_file_reads_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(
            &path,
            r#"{"service_types":[{"name":"s1","hosts":["host1"],"auth_types":["x509"],"auth_method":"api-key","uuid":"uuid1","created_on":"","type":"ams"}]}"#,
        )
        .unwrap();

        let store = InMemoryStore::from_seed_file(&path).unwrap();

        assert_eq!(store.service_types.len(), 1);
        assert!(store.bindings.is_empty());
    }

    #[test]
    fn from_seed_file_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seed.json");
        std::fs::write(&path, "{").unwrap();

        assert!(matches!(
            InMemoryStore::from_seed_file(&path),
            Err(Error::Config(_))
        ));
    }
}
