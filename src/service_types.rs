//! Service type lookup, validation and lifecycle.

use serde::Deserialize;
use tracing::info;

use crate::config::Config;
use crate::store::{ServiceType, Store, zulu_now};
use crate::{Error, Result};

const RESOURCE: &str = "service-type";

impl ServiceType {
    /// Whether `host` belongs to this service type.
    #[must_use]
    pub fn has_host(&self, host: &str) -> bool {
        self.hosts.iter().any(|h| h == host)
    }

    /// Fail unless this service type accepts `auth_type` credentials.
    ///
    /// # Errors
    ///
    /// `Unprocessable` naming the unsupported auth type.
    pub fn supports_auth_type(&self, auth_type: &str) -> Result<()> {
        if self.auth_types.iter().any(|t| t == auth_type) {
            Ok(())
        } else {
            Err(Error::unsupported("Auth type", auth_type))
        }
    }

    /// Check required fields and that every declared tag is supported.
    ///
    /// # Errors
    ///
    /// `Unprocessable` describing the first violation.
    pub fn validate(&self, config: &Config) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("auth_method", &self.auth_method),
            ("type", &self.kind),
        ] {
            if value.is_empty() {
                return Err(Error::empty_field(RESOURCE, field));
            }
        }
        if self.hosts.is_empty() {
            return Err(Error::empty_field(RESOURCE, "hosts"));
        }
        if self.auth_types.is_empty() {
            return Err(Error::unsupported("auth_types", "empty"));
        }

        if !config.supported_auth_methods.contains(&self.auth_method) {
            return Err(Error::unsupported("auth_method", &self.auth_method));
        }
        if let Some(unknown) = self
            .auth_types
            .iter()
            .find(|t| !config.supported_auth_types.contains(*t))
        {
            return Err(Error::unsupported("auth_types", unknown));
        }
        if !config.supported_service_types.contains(&self.kind) {
            return Err(Error::unsupported("type", &self.kind));
        }

        Ok(())
    }
}

/// Fields of a service type that may change after creation.
#[derive(Debug, Default, Deserialize)]
pub struct ServiceTypeUpdate {
    /// New name
    pub name: Option<String>,
    /// New host list
    pub hosts: Option<Vec<String>>,
    /// New auth types
    pub auth_types: Option<Vec<String>>,
    /// New auth method tag
    pub auth_method: Option<String>,
}

fn single(mut found: Vec<ServiceType>, key: &str) -> Result<ServiceType> {
    match found.len() {
        0 => Err(Error::NotFound("Service-type".to_string())),
        1 => Ok(found.remove(0)),
        _ => Err(Error::Database(format!(
            "More than 1 service-types found for: {key}"
        ))),
    }
}

/// Look up a service type by its unique name.
///
/// # Errors
///
/// `NotFound` when missing, `Database` when the name is duplicated.
pub async fn find_by_name(store: &dyn Store, name: &str) -> Result<ServiceType> {
    single(store.query_service_types(Some(name)).await?, name)
}

/// Look up a service type by UUID.
///
/// # Errors
///
/// `NotFound` when missing, `Database` when the UUID is duplicated.
pub async fn find_by_uuid(store: &dyn Store, uuid: &str) -> Result<ServiceType> {
    single(store.query_service_types_by_uuid(uuid).await?, uuid)
}

/// Every registered service type.
///
/// # Errors
///
/// Propagates datastore errors.
pub async fn find_all(store: &dyn Store) -> Result<Vec<ServiceType>> {
    store.query_service_types(None).await
}

async fn ensure_name_free(store: &dyn Store, name: &str) -> Result<()> {
    if store.query_service_types(Some(name)).await?.is_empty() {
        Ok(())
    } else {
        Err(Error::conflict(RESOURCE, "name", name))
    }
}

/// Validate and persist a new service type under a fresh UUID.
///
/// # Errors
///
/// Validation errors, `Conflict` on a taken name, datastore errors.
pub async fn create(
    store: &dyn Store,
    config: &Config,
    mut service_type: ServiceType,
) -> Result<ServiceType> {
    service_type.validate(config)?;
    ensure_name_free(store, &service_type.name).await?;

    service_type.uuid = uuid::Uuid::new_v4().to_string();
    service_type.created_on = zulu_now();

    let created = store.insert_service_type(service_type).await?;
    info!(name = %created.name, uuid = %created.uuid, "Created service type");
    Ok(created)
}

/// Apply `changes` to `original`, then validate and persist the result.
///
/// # Errors
///
/// Validation errors, `Conflict` when renaming onto a taken name, datastore errors.
pub async fn update(
    store: &dyn Store,
    config: &Config,
    original: &ServiceType,
    changes: ServiceTypeUpdate,
) -> Result<ServiceType> {
    let mut updated = original.clone();
    if let Some(name) = changes.name {
        updated.name = name;
    }
    if let Some(hosts) = changes.hosts {
        updated.hosts = hosts;
    }
    if let Some(auth_types) = changes.auth_types {
        updated.auth_types = auth_types;
    }
    if let Some(auth_method) = changes.auth_method {
        updated.auth_method = auth_method;
    }

    updated.validate(config)?;
    if updated.name != original.name {
        ensure_name_free(store, &updated.name).await?;
    }

    let updated = store.update_service_type(updated).await?;
    info!(name = %updated.name, uuid = %updated.uuid, "Updated service type");
    Ok(updated)
}

/// Delete a service type together with its bindings and auth methods.
///
/// # Errors
///
/// Propagates datastore errors.
pub async fn delete(store: &dyn Store, service_type: &ServiceType) -> Result<()> {
    store.delete_bindings_by_service(&service_type.uuid).await?;
    store
        .delete_auth_methods_by_service(&service_type.uuid)
        .await?;
    store.delete_service_type(&service_type.uuid).await?;
    info!(name = %service_type.name, uuid = %service_type.uuid, "Deleted service type");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, Seed};

    fn s1() -> ServiceType {
        ServiceType {
            name: "s1".to_string(),
            hosts: vec!["host1".to_string(), "host2".to_string()],
            auth_types: vec!["x509".to_string()],
            auth_method: "api-key".to_string(),
            uuid: "uuid1".to_string(),
            created_on: "2018-05-05T18:04:05Z".to_string(),
            kind: "ams".to_string(),
        }
    }

    fn store_with_s1() -> InMemoryStore {
        InMemoryStore::with_seed(Seed {
            service_types: vec![s1()],
            ..Seed::default()
        })
    }

    #[test]
    fn has_host_and_supports_auth_type() {
        let st = s1();
        assert!(st.has_host("host2"));
        assert!(!st.has_host("host9"));
        assert!(st.supports_auth_type("x509").is_ok());
        assert_eq!(
            st.supports_auth_type("oidc").unwrap_err().to_string(),
            "Auth type: oidc is not yet supported"
        );
    }

    #[test]
    fn validate_reports_first_violation() {
        let config = Config::default();

        let mut st = s1();
        st.hosts.clear();
        assert_eq!(
            st.validate(&config).unwrap_err().to_string(),
            "service-type object contains empty fields. empty value for field: hosts"
        );

        let mut st = s1();
        st.auth_method = "carrier-pigeon".to_string();
        assert_eq!(
            st.validate(&config).unwrap_err().to_string(),
            "auth_method: carrier-pigeon is not yet supported"
        );

        let mut st = s1();
        st.auth_types.push("kerberos".to_string());
        assert_eq!(
            st.validate(&config).unwrap_err().to_string(),
            "auth_types: kerberos is not yet supported"
        );

        let mut st = s1();
        st.kind = "nope".to_string();
        assert_eq!(
            st.validate(&config).unwrap_err().to_string(),
            "type: nope is not yet supported"
        );
    }

    #[tokio::test]
    async fn find_by_name_missing_is_not_found() {
        let store = store_with_s1();
        let err = find_by_name(&store, "unknown").await.unwrap_err();
        assert_eq!(err.to_string(), "Service-type was not found");
    }

    #[tokio::test]
    async fn create_assigns_uuid_and_rejects_duplicate_names() {
        // GIVEN: a store that already has s1
        let store = store_with_s1();
        let config = Config::default();

        // WHEN: creating a second service type
        let mut st = s1();
        st.name = "s2".to_string();
        st.uuid = String::new();
        let created = create(&store, &config, st).await.unwrap();

        // THEN: it gets a fresh identity
        assert!(!created.uuid.is_empty());
        assert_ne!(created.uuid, "uuid1");
        assert!(created.created_on.ends_with('Z'));

        // AND: reusing a name conflicts
        let err = create(&store, &config, s1()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "service-type object with name: s1 already exists"
        );
    }

    #[tokio::test]
    async fn update_applies_allowed_fields_only() {
        let store = store_with_s1();
        let config = Config::default();
        let original = find_by_name(&store, "s1").await.unwrap();

        let changes: ServiceTypeUpdate = serde_json::from_str(
            r#"{"name":"s1-renamed","hosts":["host3"],"uuid":"forged","type":"web-api"}"#,
        )
        .unwrap();
        let updated = update(&store, &config, &original, changes).await.unwrap();

        assert_eq!(updated.name, "s1-renamed");
        assert_eq!(updated.hosts, vec!["host3".to_string()]);
        assert_eq!(updated.uuid, "uuid1");
        assert_eq!(updated.kind, "ams");
        assert!(find_by_name(&store, "s1").await.is_err());
    }

    #[tokio::test]
    async fn delete_cascades() {
        let store = store_with_s1();
        let st = find_by_name(&store, "s1").await.unwrap();

        delete(&store, &st).await.unwrap();

        assert!(find_all(&store).await.unwrap().is_empty());
    }
}
