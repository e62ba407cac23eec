//! HTTP router

use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use super::auth::service_token_middleware;
use super::authenticator::CertificateAuthenticator;
use super::handlers;
use crate::Result;
use crate::auth_methods::AuthMethodRegistry;
use crate::config::Config;
use crate::store::Store;

/// Shared application state
pub struct AppState {
    /// Configuration (supported tags for validation)
    pub config: Config,
    /// Datastore
    pub store: Arc<dyn Store>,
    /// Auth method variants and defaults
    pub registry: AuthMethodRegistry,
    /// Certificate authentication flow
    pub authenticator: CertificateAuthenticator,
    /// Shared secret for the management API
    pub service_token: String,
}

impl AppState {
    /// Build the state for `config` around `store`, using the production
    /// auth method variants.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn new(config: Config, store: Arc<dyn Store>) -> Result<Self> {
        let registry = AuthMethodRegistry::from_config(&config);
        Self::with_registry(config, store, registry)
    }

    /// Like [`AppState::new`] with an explicit registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn with_registry(
        config: Config,
        store: Arc<dyn Store>,
        registry: AuthMethodRegistry,
    ) -> Result<Self> {
        Ok(Self {
            authenticator: CertificateAuthenticator::new(&config)?,
            service_token: config.service_token.clone(),
            config,
            store,
            registry,
        })
    }

    /// Datastore as a trait object reference
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let management = Router::new()
        .route(
            "/v1/service-types",
            get(handlers::list_service_types).post(handlers::create_service_type),
        )
        .route(
            "/v1/service-types/{service_type}",
            get(handlers::get_service_type)
                .put(handlers::update_service_type)
                .delete(handlers::delete_service_type),
        )
        .route(
            "/v1/service-types/{service_type}/authm",
            post(handlers::create_auth_method),
        )
        .route(
            "/v1/service-types/{service_type}/hosts/{host}/authm",
            get(handlers::get_auth_method)
                .put(handlers::update_auth_method)
                .delete(handlers::delete_auth_method),
        )
        .route(
            "/v1/service-types/{service_type}/hosts/{host}/bindings",
            get(handlers::list_host_bindings),
        )
        .route(
            "/v1/service-types/{service_type}/hosts/{host}/bindings/{auth_identifier}",
            get(handlers::get_host_binding),
        )
        .route("/v1/authm", get(handlers::list_auth_methods))
        .route("/v1/bindings", get(handlers::list_bindings))
        .route(
            "/v1/bindings/{name}",
            get(handlers::get_binding)
                .post(handlers::create_binding)
                .put(handlers::update_binding)
                .delete(handlers::delete_binding),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            service_token_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        // `{host}` carries the `:authx509` action suffix
        .route(
            "/v1/service-types/{service_type}/hosts/{host}",
            get(handlers::authenticate_x509),
        )
        .merge(management)
        .layer(CatchPanicLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
