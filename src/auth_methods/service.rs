//! Auth method lifecycle against the datastore.

use tracing::info;

use super::{AuthMethod, AuthMethodPatch, AuthMethodRegistry};
use crate::store::{AuthMethodFilter, AuthMethodRecord, ServiceType, Store, zulu_now};
use crate::{Error, Result};

/// Look up the auth method of type `tag` for a service type host.
///
/// # Errors
///
/// `Internal` for an unregistered tag or duplicated records, `NotFound` when
/// nothing matches.
pub async fn find(
    store: &dyn Store,
    registry: &AuthMethodRegistry,
    service_uuid: &str,
    host: &str,
    tag: &str,
) -> Result<AuthMethod> {
    registry.ensure_registered(tag)?;

    let filter = AuthMethodFilter {
        kind: Some(tag.to_string()),
        ..AuthMethodFilter::service_host(service_uuid, host)
    };
    let mut found = store.query_auth_methods(&filter).await?;
    match found.len() {
        0 => Err(Error::NotFound("Auth method".to_string())),
        1 => AuthMethod::try_from(found.remove(0)),
        _ => Err(Error::Internal(
            "More than 1 auth methods found for the given service type and host".to_string(),
        )),
    }
}

/// Every auth method.
///
/// # Errors
///
/// Datastore errors, `Internal` for records of an unknown type.
pub async fn find_all(store: &dyn Store) -> Result<Vec<AuthMethod>> {
    store
        .query_auth_methods(&AuthMethodFilter::default())
        .await?
        .into_iter()
        .map(AuthMethod::try_from)
        .collect()
}

async fn ensure_host_free(store: &dyn Store, service_uuid: &str, host: &str) -> Result<()> {
    let existing = store
        .query_auth_methods(&AuthMethodFilter::service_host(service_uuid, host))
        .await?;
    if existing.is_empty() {
        Ok(())
    } else {
        Err(Error::conflict("Auth method", "host", host))
    }
}

/// Create the auth method for a host of `service_type` from a JSON body.
///
/// The variant comes from `service_type.auth_method`, the owning service from
/// `service_type` itself; the body cannot override either. Nothing is written
/// unless every check passes.
///
/// # Errors
///
/// `BadRequest` for a malformed body, validation errors, `Conflict` when the
/// host already has an auth method of any type, datastore errors.
pub async fn create(
    store: &dyn Store,
    registry: &AuthMethodRegistry,
    service_type: &ServiceType,
    body: &[u8],
) -> Result<AuthMethod> {
    let mut am = registry.create(&service_type.auth_method)?;
    am.set_defaults(registry, &service_type.kind)?;
    am.apply(AuthMethodPatch::from_json(body)?);
    am.service_uuid.clone_from(&service_type.uuid);

    am.validate(store).await?;
    ensure_host_free(store, &am.service_uuid, &am.host).await?;

    am.uuid = uuid::Uuid::new_v4().to_string();
    am.created_on = zulu_now();

    store
        .insert_auth_method(AuthMethodRecord::from(am.clone()))
        .await?;
    info!(
        service_type = %service_type.name,
        host = %am.host,
        kind = am.tag(),
        "Created auth method"
    );
    Ok(am)
}

/// Merge a JSON body onto `original`, then validate and persist the result.
///
/// # Errors
///
/// `BadRequest` for a malformed body, validation errors, `Conflict` when
/// moving onto a host that already has an auth method, datastore errors.
pub async fn update(store: &dyn Store, original: &AuthMethod, body: &[u8]) -> Result<AuthMethod> {
    let updated = original.update(body)?;
    updated.validate(store).await?;
    if updated.host != original.host {
        ensure_host_free(store, &updated.service_uuid, &updated.host).await?;
    }

    store
        .update_auth_method(AuthMethodRecord::from(updated.clone()))
        .await?;
    info!(uuid = %updated.uuid, host = %updated.host, "Updated auth method");
    Ok(updated)
}

/// Delete an auth method.
///
/// # Errors
///
/// Propagates datastore errors.
pub async fn delete(store: &dyn Store, am: &AuthMethod) -> Result<()> {
    store.delete_auth_method(&am.uuid).await?;
    info!(uuid = %am.uuid, host = %am.host, "Deleted auth method");
    Ok(())
}
