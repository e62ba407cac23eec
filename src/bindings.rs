//! Binding lookup, validation and lifecycle.
//!
//! A binding maps an external identity (the canonical DN of a client
//! certificate for `x509`) on a service type host to the unique key the
//! downstream service knows the caller by.

use serde::Deserialize;
use tracing::info;

use crate::service_types;
use crate::store::{Binding, Store, zulu_now};
use crate::{Error, Result};

const RESOURCE: &str = "binding";

impl Binding {
    /// Check required fields and the owning service type and host.
    ///
    /// # Errors
    ///
    /// `Unprocessable` on empty fields or an unsupported auth type, `NotFound`
    /// for an unknown service type or host.
    pub async fn validate(&self, store: &dyn Store) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("service_uuid", &self.service_uuid),
            ("host", &self.host),
            ("auth_identifier", &self.auth_identifier),
            ("unique_key", &self.unique_key),
            ("auth_type", &self.auth_type),
        ] {
            if value.is_empty() {
                return Err(Error::empty_field(RESOURCE, field));
            }
        }

        let service_type = service_types::find_by_uuid(store, &self.service_uuid).await?;
        if !service_type.has_host(&self.host) {
            return Err(Error::NotFound("Host".to_string()));
        }
        service_type.supports_auth_type(&self.auth_type)
    }
}

/// Fields of a binding that may change after creation.
#[derive(Debug, Default, Deserialize)]
pub struct BindingUpdate {
    /// New name
    pub name: Option<String>,
    /// New owning service type
    pub service_uuid: Option<String>,
    /// New host
    pub host: Option<String>,
    /// New identity
    pub auth_identifier: Option<String>,
    /// New credential kind
    pub auth_type: Option<String>,
    /// New downstream key
    pub unique_key: Option<String>,
}

fn single(mut found: Vec<Binding>, duplicate: impl FnOnce() -> String) -> Result<Binding> {
    match found.len() {
        0 => Err(Error::NotFound("Binding".to_string())),
        1 => Ok(found.remove(0)),
        _ => Err(Error::Database(duplicate())),
    }
}

/// Look up the binding for an identity on a service type host.
///
/// # Errors
///
/// `NotFound` when nothing matches, `Database` when several bindings do.
pub async fn find_by_auth_id(
    store: &dyn Store,
    auth_id: &str,
    service_uuid: &str,
    host: &str,
    auth_type: &str,
) -> Result<Binding> {
    let found = store
        .query_bindings_by_auth_id(auth_id, service_uuid, host, auth_type)
        .await?;
    single(found, || {
        format!(
            "More than 1 bindings found under the service type: {service_uuid} and host: {host} using the same AuthIdentifier: {auth_id}"
        )
    })
}

/// Look up a binding by its unique name.
///
/// # Errors
///
/// `NotFound` when missing, `Database` when the name is duplicated.
pub async fn find_by_name(store: &dyn Store, name: &str) -> Result<Binding> {
    let found = store.query_bindings_by_uuid_and_name(None, Some(name)).await?;
    single(found, || format!("More than 1 bindings found with the name: {name}"))
}

/// Every binding.
///
/// # Errors
///
/// Propagates datastore errors.
pub async fn find_all(store: &dyn Store) -> Result<Vec<Binding>> {
    store.query_bindings(None, None).await
}

/// Bindings registered for one host of a service type.
///
/// # Errors
///
/// Propagates datastore errors.
pub async fn find_by_service_and_host(
    store: &dyn Store,
    service_uuid: &str,
    host: &str,
) -> Result<Vec<Binding>> {
    store.query_bindings(Some(service_uuid), Some(host)).await
}

async fn ensure_auth_id_free(store: &dyn Store, binding: &Binding) -> Result<()> {
    match find_by_auth_id(
        store,
        &binding.auth_identifier,
        &binding.service_uuid,
        &binding.host,
        &binding.auth_type,
    )
    .await
    {
        Ok(_) => Err(Error::conflict(
            RESOURCE,
            "auth_identifier",
            &binding.auth_identifier,
        )),
        Err(Error::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

async fn ensure_name_free(store: &dyn Store, name: &str) -> Result<()> {
    match find_by_name(store, name).await {
        Ok(_) => Err(Error::conflict(RESOURCE, "name", name)),
        Err(Error::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Validate and persist a new binding under a fresh UUID.
///
/// # Errors
///
/// Validation errors, `Conflict` when the identity or the name is taken,
/// datastore errors.
pub async fn create(store: &dyn Store, mut binding: Binding) -> Result<Binding> {
    binding.validate(store).await?;
    ensure_auth_id_free(store, &binding).await?;
    ensure_name_free(store, &binding.name).await?;

    binding.uuid = uuid::Uuid::new_v4().to_string();
    binding.created_on = zulu_now();
    binding.last_auth = String::new();

    let created = store.insert_binding(binding).await?;
    info!(
        name = %created.name,
        service_uuid = %created.service_uuid,
        host = %created.host,
        "Created binding"
    );
    Ok(created)
}

/// Apply `changes` to `original`, then validate and persist the result.
///
/// # Errors
///
/// Validation errors, `Conflict` when the new identity or name is taken,
/// datastore errors.
pub async fn update(
    store: &dyn Store,
    original: &Binding,
    changes: BindingUpdate,
) -> Result<Binding> {
    let mut updated = original.clone();
    if let Some(name) = changes.name {
        updated.name = name;
    }
    if let Some(service_uuid) = changes.service_uuid {
        updated.service_uuid = service_uuid;
    }
    if let Some(host) = changes.host {
        updated.host = host;
    }
    if let Some(auth_identifier) = changes.auth_identifier {
        updated.auth_identifier = auth_identifier;
    }
    if let Some(auth_type) = changes.auth_type {
        updated.auth_type = auth_type;
    }
    if let Some(unique_key) = changes.unique_key {
        updated.unique_key = unique_key;
    }

    updated.validate(store).await?;

    let identity_moved = updated.auth_identifier != original.auth_identifier
        || updated.service_uuid != original.service_uuid
        || updated.host != original.host
        || updated.auth_type != original.auth_type;
    if identity_moved {
        ensure_auth_id_free(store, &updated).await?;
    }
    if updated.name != original.name {
        ensure_name_free(store, &updated.name).await?;
    }

    let updated = store.update_binding(updated).await?;
    info!(name = %updated.name, uuid = %updated.uuid, "Updated binding");
    Ok(updated)
}

/// Delete a binding.
///
/// # Errors
///
/// Propagates datastore errors.
pub async fn delete(store: &dyn Store, binding: &Binding) -> Result<()> {
    store.delete_binding(&binding.uuid).await?;
    info!(name = %binding.name, uuid = %binding.uuid, "Deleted binding");
    Ok(())
}
