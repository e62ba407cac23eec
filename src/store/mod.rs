//! Datastore layer.
//!
//! The [`Store`] trait abstracts over storage backends. The only current
//! implementation is [`InMemoryStore`], backed by `DashMap`s keyed by record
//! UUID and optionally seeded from a JSON file at startup.
//!
//! Query methods return every matching record; deciding whether zero or
//! several matches is an error belongs to the callers.

pub mod memory;
pub mod models;

pub use memory::{InMemoryStore, Seed};
pub use models::{AuthMethodFilter, AuthMethodRecord, Binding, ServiceType, zulu_now};

use crate::Result;

/// Trait abstracting the datastore.
///
/// Implementations must be `Send + Sync` because the store is shared across
/// request handlers.
#[async_trait::async_trait]
pub trait Store: Send + Sync + 'static {
    // ── service types ───────────────────────────────────────────────────────

    /// Service types with the given name, or all of them for `None`.
    async fn query_service_types(&self, name: Option<&str>) -> Result<Vec<ServiceType>>;

    /// Service types with the given UUID.
    async fn query_service_types_by_uuid(&self, uuid: &str) -> Result<Vec<ServiceType>>;

    /// Persist a new service type.
    async fn insert_service_type(&self, service_type: ServiceType) -> Result<ServiceType>;

    /// Replace the service type sharing `updated.uuid`.
    async fn update_service_type(&self, updated: ServiceType) -> Result<ServiceType>;

    /// Remove a service type.
    async fn delete_service_type(&self, uuid: &str) -> Result<()>;

    // ── bindings ────────────────────────────────────────────────────────────

    /// Bindings, optionally restricted to one service type and host.
    async fn query_bindings(
        &self,
        service_uuid: Option<&str>,
        host: Option<&str>,
    ) -> Result<Vec<Binding>>;

    /// Bindings matching an auth identifier under a service type and host.
    async fn query_bindings_by_auth_id(
        &self,
        auth_id: &str,
        service_uuid: &str,
        host: &str,
        auth_type: &str,
    ) -> Result<Vec<Binding>>;

    /// Bindings matching a UUID and/or a name.
    async fn query_bindings_by_uuid_and_name(
        &self,
        uuid: Option<&str>,
        name: Option<&str>,
    ) -> Result<Vec<Binding>>;

    /// Persist a new binding.
    async fn insert_binding(&self, binding: Binding) -> Result<Binding>;

    /// Replace the binding sharing `updated.uuid`.
    async fn update_binding(&self, updated: Binding) -> Result<Binding>;

    /// Record a successful authentication time on a binding.
    async fn update_binding_last_auth(&self, uuid: &str, last_auth: &str) -> Result<()>;

    /// Remove a binding.
    async fn delete_binding(&self, uuid: &str) -> Result<()>;

    /// Remove every binding of a service type.
    async fn delete_bindings_by_service(&self, service_uuid: &str) -> Result<()>;

    // ── auth methods ────────────────────────────────────────────────────────

    /// Auth methods passing `filter`.
    async fn query_auth_methods(&self, filter: &AuthMethodFilter)
    -> Result<Vec<AuthMethodRecord>>;

    /// Persist a new auth method.
    async fn insert_auth_method(&self, record: AuthMethodRecord) -> Result<AuthMethodRecord>;

    /// Replace the auth method sharing `updated.uuid`.
    async fn update_auth_method(&self, updated: AuthMethodRecord) -> Result<AuthMethodRecord>;

    /// Remove an auth method.
    async fn delete_auth_method(&self, uuid: &str) -> Result<()>;

    /// Remove every auth method of a service type.
    async fn delete_auth_methods_by_service(&self, service_uuid: &str) -> Result<()>;
}
