//! Records persisted by the datastore.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Current UTC time in the `2006-01-02T15:04:05Z` form used for all timestamps.
#[must_use]
pub fn zulu_now() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// A registered backend service description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceType {
    /// Unique name used in request paths
    #[serde(default)]
    pub name: String,
    /// Hosts belonging to this service type
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Accepted client credential kinds (e.g. `x509`)
    #[serde(default)]
    pub auth_types: Vec<String>,
    /// Auth method tag used to reach the service (e.g. `api-key`)
    #[serde(default)]
    pub auth_method: String,
    /// Immutable identifier
    #[serde(default)]
    pub uuid: String,
    /// Creation timestamp
    #[serde(default)]
    pub created_on: String,
    /// Service type tag selecting auth method defaults (e.g. `ams`)
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Links an external identity on a service+host to a downstream unique key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Unique binding name
    #[serde(default)]
    pub name: String,
    /// Owning service type
    #[serde(default)]
    pub service_uuid: String,
    /// Host of the service type
    #[serde(default)]
    pub host: String,
    /// Immutable identifier
    #[serde(default)]
    pub uuid: String,
    /// Identity to match: a canonical DN for `x509`
    #[serde(default)]
    pub auth_identifier: String,
    /// Key interpolated into the downstream request
    #[serde(default)]
    pub unique_key: String,
    /// Credential kind of `auth_identifier`
    #[serde(default)]
    pub auth_type: String,
    /// Creation timestamp
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created_on: String,
    /// Time of the last successful authentication
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_auth: String,
}

/// Flat storage form of an auth method.
///
/// Variant specific fields are optional; `kind` says which ones are set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMethodRecord {
    /// Owning service type
    pub service_uuid: String,
    /// Host of the service type
    pub host: String,
    /// Port of the token endpoint
    pub port: u16,
    /// Path template of the token endpoint
    #[serde(default)]
    pub path: String,
    /// Response field holding the token
    #[serde(default)]
    pub retrieval_field: String,
    /// Auth method tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Immutable identifier
    pub uuid: String,
    /// Creation timestamp
    #[serde(default)]
    pub created_on: String,
    /// `api-key`: key interpolated into the path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    /// `headers`: literal request headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

/// Selects auth method records; `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct AuthMethodFilter {
    /// Owning service type
    pub service_uuid: Option<String>,
    /// Host
    pub host: Option<String>,
    /// Auth method tag
    pub kind: Option<String>,
}

impl AuthMethodFilter {
    /// Filter on service + host, any tag.
    pub fn service_host(service_uuid: &str, host: &str) -> Self {
        Self {
            service_uuid: Some(service_uuid.to_string()),
            host: Some(host.to_string()),
            kind: None,
        }
    }

    /// Whether `record` passes this filter.
    #[must_use]
    pub fn matches(&self, record: &AuthMethodRecord) -> bool {
        self.service_uuid
            .as_deref()
            .is_none_or(|s| s == record.service_uuid)
            && self.host.as_deref().is_none_or(|h| h == record.host)
            && self.kind.as_deref().is_none_or(|k| k == record.kind)
    }
}
