//! HTTP handlers
//!
//! Handlers only decode the request, call into the domain modules and encode
//! the result; every failure is an [`Error`] rendered by its `IntoResponse`.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::authenticator::X509;
use super::listener::TlsConnectInfo;
use super::router::AppState;
use crate::auth_methods::{self, AuthMethod, DownstreamToken};
use crate::bindings::{self, BindingUpdate};
use crate::service_types::{self, ServiceTypeUpdate};
use crate::store::{Binding, ServiceType};
use crate::{Error, Result};

/// Action suffix of the certificate authentication route
pub const AUTHX509_SUFFIX: &str = ":authx509";

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(Error::malformed_json)
}

async fn host_of(state: &AppState, service_type: &str, host: &str) -> Result<ServiceType> {
    let service_type = service_types::find_by_name(state.store(), service_type).await?;
    if service_type.has_host(host) {
        Ok(service_type)
    } else {
        Err(Error::NotFound("Host".to_string()))
    }
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── certificate authentication ──────────────────────────────────────────────

/// GET /v1/service-types/{service_type}/hosts/{host}:authx509
pub async fn authenticate_x509(
    State(state): State<Arc<AppState>>,
    ConnectInfo(conn): ConnectInfo<TlsConnectInfo>,
    Path((service_type, host)): Path<(String, String)>,
) -> Result<Json<DownstreamToken>> {
    let host = host
        .strip_suffix(AUTHX509_SUFFIX)
        .ok_or_else(|| Error::NotFound("Resource".to_string()))?;

    let token = state
        .authenticator
        .authenticate(
            state.store(),
            &state.registry,
            &conn.peer_certificates,
            &service_type,
            host,
        )
        .await?;

    Ok(Json(token))
}

// ── service types ───────────────────────────────────────────────────────────

/// POST /v1/service-types
pub async fn create_service_type(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let service_type: ServiceType = parse_json(&body)?;
    let created = service_types::create(state.store(), &state.config, service_type).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /v1/service-types
pub async fn list_service_types(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let all = service_types::find_all(state.store()).await?;
    Ok(Json(json!({ "service_types": all })))
}

/// GET /v1/service-types/{service_type}
pub async fn get_service_type(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<ServiceType>> {
    Ok(Json(service_types::find_by_name(state.store(), &name).await?))
}

/// PUT /v1/service-types/{service_type}
pub async fn update_service_type(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<ServiceType>> {
    let changes: ServiceTypeUpdate = parse_json(&body)?;
    let original = service_types::find_by_name(state.store(), &name).await?;
    let updated = service_types::update(state.store(), &state.config, &original, changes).await?;
    Ok(Json(updated))
}

/// DELETE /v1/service-types/{service_type}
pub async fn delete_service_type(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    let service_type = service_types::find_by_name(state.store(), &name).await?;
    service_types::delete(state.store(), &service_type).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── auth methods ────────────────────────────────────────────────────────────

/// POST /v1/service-types/{service_type}/authm
pub async fn create_auth_method(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let service_type = service_types::find_by_name(state.store(), &name).await?;
    let created =
        auth_methods::service::create(state.store(), &state.registry, &service_type, &body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /v1/authm
pub async fn list_auth_methods(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let all = auth_methods::service::find_all(state.store()).await?;
    Ok(Json(json!({ "auth_methods": all })))
}

async fn auth_method_of(state: &AppState, service_type: &str, host: &str) -> Result<AuthMethod> {
    let service_type = host_of(state, service_type, host).await?;
    auth_methods::service::find(
        state.store(),
        &state.registry,
        &service_type.uuid,
        host,
        &service_type.auth_method,
    )
    .await
}

/// GET /v1/service-types/{service_type}/hosts/{host}/authm
pub async fn get_auth_method(
    State(state): State<Arc<AppState>>,
    Path((service_type, host)): Path<(String, String)>,
) -> Result<Json<AuthMethod>> {
    Ok(Json(auth_method_of(&state, &service_type, &host).await?))
}

/// PUT /v1/service-types/{service_type}/hosts/{host}/authm
pub async fn update_auth_method(
    State(state): State<Arc<AppState>>,
    Path((service_type, host)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<AuthMethod>> {
    let original = auth_method_of(&state, &service_type, &host).await?;
    let updated = auth_methods::service::update(state.store(), &original, &body).await?;
    Ok(Json(updated))
}

/// DELETE /v1/service-types/{service_type}/hosts/{host}/authm
pub async fn delete_auth_method(
    State(state): State<Arc<AppState>>,
    Path((service_type, host)): Path<(String, String)>,
) -> Result<StatusCode> {
    let am = auth_method_of(&state, &service_type, &host).await?;
    auth_methods::service::delete(state.store(), &am).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── bindings ────────────────────────────────────────────────────────────────

/// GET /v1/service-types/{service_type}/hosts/{host}/bindings
pub async fn list_host_bindings(
    State(state): State<Arc<AppState>>,
    Path((service_type, host)): Path<(String, String)>,
) -> Result<Json<Value>> {
    let service_type = host_of(&state, &service_type, &host).await?;
    let found = bindings::find_by_service_and_host(state.store(), &service_type.uuid, &host).await?;
    Ok(Json(json!({ "bindings": found })))
}

/// GET /v1/service-types/{service_type}/hosts/{host}/bindings/{auth_identifier}
pub async fn get_host_binding(
    State(state): State<Arc<AppState>>,
    Path((service_type, host, auth_identifier)): Path<(String, String, String)>,
) -> Result<Json<Binding>> {
    let service_type = host_of(&state, &service_type, &host).await?;
    let binding =
        bindings::find_by_auth_id(state.store(), &auth_identifier, &service_type.uuid, &host, X509)
            .await?;
    Ok(Json(binding))
}

/// GET /v1/bindings
pub async fn list_bindings(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let all = bindings::find_all(state.store()).await?;
    Ok(Json(json!({ "bindings": all })))
}

/// POST /v1/bindings/{name}
pub async fn create_binding(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse> {
    let mut binding: Binding = parse_json(&body)?;
    binding.name = name;
    let created = bindings::create(state.store(), binding).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /v1/bindings/{name}
pub async fn get_binding(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Binding>> {
    Ok(Json(bindings::find_by_name(state.store(), &name).await?))
}

/// PUT /v1/bindings/{name}
pub async fn update_binding(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Json<Binding>> {
    let changes: BindingUpdate = parse_json(&body)?;
    let original = bindings::find_by_name(state.store(), &name).await?;
    Ok(Json(bindings::update(state.store(), &original, changes).await?))
}

/// DELETE /v1/bindings/{name}
pub async fn delete_binding(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode> {
    let binding = bindings::find_by_name(state.store(), &name).await?;
    bindings::delete(state.store(), &binding).await?;
    Ok(StatusCode::NO_CONTENT)
}
