//! Auth methods: how the gateway obtains a downstream token for a caller.
//!
//! Every service type host gets exactly one auth method. All variants share
//! the endpoint coordinates (`host`, `port`, `path`) and the response field
//! holding the token; they differ in how the request is authenticated:
//!
//! - `api-key`: the access key is interpolated into the path
//! - `headers`: literal headers are sent with the request
//! - `mock`: canned responses, no network
//!
//! New variants are wired in through [`AuthMethodRegistry`].

pub mod registry;
pub mod service;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, warn};

pub use registry::{AuthMethodRegistry, Constructor};

use crate::config::{ACCESS_KEY_PLACEHOLDER, IDENTIFIER_PLACEHOLDER};
use crate::service_types;
use crate::store::{AuthMethodRecord, Binding, Store};
use crate::{Error, Result};

/// Tag of the access-key-in-path variant
pub const API_KEY: &str = "api-key";
/// Tag of the literal-headers variant
pub const HEADERS: &str = "headers";
/// Tag of the canned-response variant
pub const MOCK: &str = "mock";

const RESOURCE: &str = "auth method";

/// Variant specific part of an auth method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethodKind {
    /// Access key interpolated into the request path
    ApiKey {
        /// Key substituted for `{{access_key}}`
        access_key: String,
    },
    /// Literal headers added to the request
    Headers {
        /// Header name to value
        headers: BTreeMap<String, String>,
    },
    /// Canned responses selected by the binding's unique key
    Mock,
}

impl AuthMethodKind {
    /// Type tag of this variant.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::ApiKey { .. } => API_KEY,
            Self::Headers { .. } => HEADERS,
            Self::Mock => MOCK,
        }
    }
}

/// An auth method attached to one host of a service type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "AuthMethodRecord")]
pub struct AuthMethod {
    /// Owning service type
    pub service_uuid: String,
    /// Host of the service type, also the downstream host
    pub host: String,
    /// Downstream port
    pub port: u16,
    /// Downstream path template
    pub path: String,
    /// Response field holding the token
    pub retrieval_field: String,
    /// Immutable identifier
    pub uuid: String,
    /// Creation timestamp
    pub created_on: String,
    /// Variant
    pub kind: AuthMethodKind,
}

/// Caller supplied fields of an auth method, used for both create and update.
///
/// Identity fields (`uuid`, `created_on`, `type`, `service_uuid`) are not part
/// of it, so a payload carrying them has no effect on them.
#[derive(Debug, Default, Deserialize)]
pub struct AuthMethodPatch {
    /// Downstream host
    pub host: Option<String>,
    /// Downstream port
    pub port: Option<u16>,
    /// Path template
    pub path: Option<String>,
    /// Response field holding the token
    pub retrieval_field: Option<String>,
    /// `api-key` only
    pub access_key: Option<String>,
    /// `headers` only
    pub headers: Option<BTreeMap<String, String>>,
}

impl AuthMethodPatch {
    /// Decode a JSON request body.
    ///
    /// # Errors
    ///
    /// `BadRequest` when the body is not a valid payload.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        serde_json::from_slice(body).map_err(Error::malformed_json)
    }
}

/// Normalized downstream retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownstreamToken {
    /// Value of the retrieval field, whatever its original name
    pub token: Value,
}

impl AuthMethod {
    /// Empty auth method of the given variant.
    #[must_use]
    pub fn new(kind: AuthMethodKind) -> Self {
        Self {
            service_uuid: String::new(),
            host: String::new(),
            port: 0,
            path: String::new(),
            retrieval_field: String::new(),
            uuid: String::new(),
            created_on: String::new(),
            kind,
        }
    }

    /// Type tag.
    #[must_use]
    pub fn tag(&self) -> &'static str {
        self.kind.tag()
    }

    /// Overwrite the fields present in `patch`.
    ///
    /// Variant fields of a different variant are ignored.
    pub fn apply(&mut self, patch: AuthMethodPatch) {
        if let Some(host) = patch.host {
            self.host = host;
        }
        if let Some(port) = patch.port {
            self.port = port;
        }
        if let Some(path) = patch.path {
            self.path = path;
        }
        if let Some(retrieval_field) = patch.retrieval_field {
            self.retrieval_field = retrieval_field;
        }
        match &mut self.kind {
            AuthMethodKind::ApiKey { access_key } => {
                if let Some(key) = patch.access_key {
                    *access_key = key;
                }
            }
            AuthMethodKind::Headers { headers } => {
                if let Some(h) = patch.headers {
                    *headers = h;
                }
            }
            AuthMethodKind::Mock => {}
        }
    }

    /// Merge a JSON update payload onto a copy of this auth method.
    ///
    /// # Errors
    ///
    /// `BadRequest` when the body is not valid JSON.
    pub fn update(&self, body: &[u8]) -> Result<Self> {
        let patch = AuthMethodPatch::from_json(body)?;
        let mut updated = self.clone();
        updated.apply(patch);
        Ok(updated)
    }

    /// Fill `path` and `retrieval_field` with the defaults registered for a
    /// service type tag.
    ///
    /// # Errors
    ///
    /// `Internal` when the tag has no registered defaults.
    pub fn set_defaults(
        &mut self,
        registry: &AuthMethodRegistry,
        service_type_tag: &str,
    ) -> Result<()> {
        if matches!(self.kind, AuthMethodKind::Mock) {
            return Ok(());
        }
        let defaults = registry.defaults_for(service_type_tag)?;
        self.path.clone_from(&defaults.path);
        self.retrieval_field.clone_from(&defaults.retrieval_field);
        Ok(())
    }

    /// Check required fields, the owning service type and host, the
    /// endpoint URL and the variant specific fields.
    ///
    /// # Errors
    ///
    /// `Unprocessable` for invalid content, `NotFound` for an unknown service
    /// type or host.
    pub async fn validate(&self, store: &dyn Store) -> Result<()> {
        for (field, value) in [
            ("service_uuid", &self.service_uuid),
            ("host", &self.host),
            ("path", &self.path),
            ("retrieval_field", &self.retrieval_field),
        ] {
            if value.is_empty() {
                return Err(Error::empty_field(RESOURCE, field));
            }
        }
        if self.port == 0 {
            return Err(Error::empty_field(RESOURCE, "port"));
        }

        let service_type = service_types::find_by_uuid(store, &self.service_uuid).await?;
        if !service_type.has_host(&self.host) {
            return Err(Error::NotFound("Host".to_string()));
        }

        let endpoint = format!("https://{}:{}{}", self.host, self.port, self.path);
        if url::Url::parse(&endpoint).is_err() {
            return Err(Error::Unprocessable(format!(
                "The url to access resources in invalid. URL: {endpoint}"
            )));
        }

        match &self.kind {
            AuthMethodKind::ApiKey { access_key } => {
                if access_key.is_empty() {
                    return Err(Error::empty_field(RESOURCE, "access_key"));
                }
                for placeholder in [IDENTIFIER_PLACEHOLDER, ACCESS_KEY_PLACEHOLDER] {
                    if !self.path.contains(placeholder) {
                        return Err(Error::invalid_field(
                            "path",
                            &format!("Missing {placeholder} interpolation"),
                        ));
                    }
                }
            }
            AuthMethodKind::Headers { headers } => {
                if headers.is_empty() {
                    return Err(Error::empty_field(RESOURCE, "headers"));
                }
            }
            AuthMethodKind::Mock => {}
        }

        Ok(())
    }

    /// Downstream URL for `binding`, placeholders substituted.
    #[must_use]
    pub fn resource_url(&self, scheme: &str, binding: &Binding) -> String {
        let mut url = format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
            .replacen(IDENTIFIER_PLACEHOLDER, &binding.unique_key, 1);
        if let AuthMethodKind::ApiKey { access_key } = &self.kind {
            url = url.replacen(ACCESS_KEY_PLACEHOLDER, access_key, 1);
        }
        url
    }

    /// Fetch the downstream token for `binding`.
    ///
    /// Issues one GET, expects a 2xx JSON object and picks `retrieval_field`
    /// out of it.
    ///
    /// # Errors
    ///
    /// `Internal` on transport failure, non-2xx status (body as message),
    /// malformed JSON or a missing retrieval field.
    pub async fn retrieve_downstream_token(
        &self,
        binding: &Binding,
        client: &reqwest::Client,
        scheme: &str,
    ) -> Result<DownstreamToken> {
        let body = match &self.kind {
            AuthMethodKind::Mock => mock_response(&binding.unique_key)?,
            AuthMethodKind::ApiKey { .. } => {
                let url = self.resource_url(scheme, binding);
                fetch_json(client.get(&url), &url).await?
            }
            AuthMethodKind::Headers { headers } => {
                let url = self.resource_url(scheme, binding);
                let request = headers
                    .iter()
                    .fold(client.get(&url), |req, (name, value)| req.header(name, value));
                fetch_json(request, &url).await?
            }
        };

        extract_token(body, &self.retrieval_field)
    }
}

async fn fetch_json(
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<serde_json::Map<String, Value>> {
    debug!(url = %redact_query(url), "Requesting downstream token");

    let response = request
        .send()
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let text = response
            .text()
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        warn!(status = status.as_u16(), url = %redact_query(url), "Downstream service refused token request");
        return Err(Error::Internal(text));
    }

    response
        .json()
        .await
        .map_err(|e| Error::Internal(e.to_string()))
}

fn extract_token(mut body: serde_json::Map<String, Value>, field: &str) -> Result<DownstreamToken> {
    body.remove(field)
        .map(|token| DownstreamToken { token })
        .ok_or_else(|| {
            Error::Internal(format!(
                "The specified retrieval field: `{field}` was not found in the response body of the service type"
            ))
        })
}

fn mock_response(unique_key: &str) -> Result<serde_json::Map<String, Value>> {
    let canned = match unique_key {
        "success" => json!({"token": "some-value"}),
        "incorrect-retrieval-field" => json!({"other_field": "some-value"}),
        _ => return Err(Error::Internal("Backend error".to_string())),
    };
    match canned {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Internal("Backend error".to_string())),
    }
}

// Query strings may carry the access key.
fn redact_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

// ── storage conversion ──────────────────────────────────────────────────────

impl From<AuthMethod> for AuthMethodRecord {
    fn from(am: AuthMethod) -> Self {
        let kind = am.tag().to_string();
        let (access_key, headers) = match am.kind {
            AuthMethodKind::ApiKey { access_key } => (Some(access_key), None),
            AuthMethodKind::Headers { headers } => (None, Some(headers)),
            AuthMethodKind::Mock => (None, None),
        };
        Self {
            service_uuid: am.service_uuid,
            host: am.host,
            port: am.port,
            path: am.path,
            retrieval_field: am.retrieval_field,
            kind,
            uuid: am.uuid,
            created_on: am.created_on,
            access_key,
            headers,
        }
    }
}

impl TryFrom<AuthMethodRecord> for AuthMethod {
    type Error = Error;

    fn try_from(record: AuthMethodRecord) -> Result<Self> {
        let kind = match record.kind.as_str() {
            API_KEY => AuthMethodKind::ApiKey {
                access_key: record.access_key.unwrap_or_default(),
            },
            HEADERS => AuthMethodKind::Headers {
                headers: record.headers.unwrap_or_default(),
            },
            MOCK => AuthMethodKind::Mock,
            other => {
                return Err(Error::Internal(format!(
                    "Stored auth method {} has unknown type {other}",
                    record.uuid
                )));
            }
        };
        Ok(Self {
            service_uuid: record.service_uuid,
            host: record.host,
            port: record.port,
            path: record.path,
            retrieval_field: record.retrieval_field,
            uuid: record.uuid,
            created_on: record.created_on,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, Seed, ServiceType};
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store() -> InMemoryStore {
        InMemoryStore::with_seed(Seed {
            service_types: vec![ServiceType {
                name: "s1".to_string(),
                hosts: vec!["host1".to_string(), "127.0.0.1".to_string()],
                auth_types: vec!["x509".to_string()],
                auth_method: API_KEY.to_string(),
                uuid: "uuid1".to_string(),
                created_on: String::new(),
                kind: "ams".to_string(),
            }],
            ..Seed::default()
        })
    }

    fn api_key_method() -> AuthMethod {
        AuthMethod {
            service_uuid: "uuid1".to_string(),
            host: "host1".to_string(),
            port: 9000,
            path: "/v1/users:byUUID/{{identifier}}?key={{access_key}}".to_string(),
            retrieval_field: "token".to_string(),
            uuid: "am_uuid1".to_string(),
            created_on: "2018-05-05T15:04:05Z".to_string(),
            kind: AuthMethodKind::ApiKey {
                access_key: "access_key".to_string(),
            },
        }
    }

    fn headers_method() -> AuthMethod {
        AuthMethod {
            path: "/api/v2/admin/users:byID/{{identifier}}?export=flat".to_string(),
            kind: AuthMethodKind::Headers {
                headers: BTreeMap::from([("x-api-key".to_string(), "secret".to_string())]),
            },
            ..api_key_method()
        }
    }

    fn binding(unique_key: &str) -> Binding {
        Binding {
            unique_key: unique_key.to_string(),
            ..Binding::default()
        }
    }

    #[tokio::test]
    async fn validate_accepts_well_formed_methods() {
        let store = store();
        assert!(api_key_method().validate(&store).await.is_ok());
        assert!(headers_method().validate(&store).await.is_ok());
    }

    #[tokio::test]
    async fn validate_rejects_path_without_placeholders() {
        let store = store();

        let mut am = api_key_method();
        am.path = "/v1/users?key={{access_key}}".to_string();
        assert_eq!(
            am.validate(&store).await.unwrap_err().to_string(),
            "Field: path contains invalid data. Missing {{identifier}} interpolation"
        );

        let mut am = api_key_method();
        am.path = "/v1/users:byUUID/{{identifier}}".to_string();
        assert_eq!(
            am.validate(&store).await.unwrap_err().to_string(),
            "Field: path contains invalid data. Missing {{access_key}} interpolation"
        );
    }

    #[tokio::test]
    async fn validate_rejects_empty_headers() {
        let store = store();
        let mut am = headers_method();
        am.kind = AuthMethodKind::Headers {
            headers: BTreeMap::new(),
        };
        assert_eq!(
            am.validate(&store).await.unwrap_err().to_string(),
            "auth method object contains empty fields. empty value for field: headers"
        );
    }

    #[tokio::test]
    async fn validate_checks_required_fields_service_and_host() {
        let store = store();

        let mut am = api_key_method();
        am.port = 0;
        assert_eq!(
            am.validate(&store).await.unwrap_err().to_string(),
            "auth method object contains empty fields. empty value for field: port"
        );

        let mut am = api_key_method();
        am.service_uuid = "unknown".to_string();
        assert_eq!(
            am.validate(&store).await.unwrap_err().to_string(),
            "Service-type was not found"
        );

        let mut am = api_key_method();
        am.host = "host9".to_string();
        assert_eq!(
            am.validate(&store).await.unwrap_err().to_string(),
            "Host was not found"
        );
    }

    #[test]
    fn update_ignores_identity_fields() {
        // GIVEN: a stored auth method
        let original = api_key_method();

        // WHEN: the payload tries to rewrite identity fields too
        let updated = original
            .update(
                br#"{"uuid":"forged","created_on":"never","type":"headers","service_uuid":"other",
                    "host":"host2","port":9999,"access_key":"rotated"}"#,
            )
            .unwrap();

        // THEN: only the allowed fields moved
        assert_eq!(updated.uuid, "am_uuid1");
        assert_eq!(updated.created_on, "2018-05-05T15:04:05Z");
        assert_eq!(updated.service_uuid, "uuid1");
        assert_eq!(updated.tag(), API_KEY);
        assert_eq!(updated.host, "host2");
        assert_eq!(updated.port, 9999);
        assert_eq!(
            updated.kind,
            AuthMethodKind::ApiKey {
                access_key: "rotated".to_string()
            }
        );
    }

    #[test]
    fn update_rejects_malformed_json() {
        let err = api_key_method().update(b"{\"port\":").unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
        assert!(err.to_string().starts_with("Poorly formatted JSON."));
    }

    #[test]
    fn record_conversion_keeps_variant_fields() {
        let record = AuthMethodRecord::from(headers_method());
        assert_eq!(record.kind, HEADERS);
        assert!(record.access_key.is_none());
        assert_eq!(AuthMethod::try_from(record).unwrap(), headers_method());

        let unknown = AuthMethodRecord {
            kind: "carrier-pigeon".to_string(),
            ..AuthMethodRecord::default()
        };
        assert!(AuthMethod::try_from(unknown).is_err());
    }

    #[test]
    fn serializes_as_flat_record() {
        let json = serde_json::to_value(api_key_method()).unwrap();
        assert_eq!(json["type"], "api-key");
        assert_eq!(json["access_key"], "access_key");
        assert!(json.get("headers").is_none());
    }

    #[test]
    fn resource_url_interpolates_placeholders() {
        assert_eq!(
            api_key_method().resource_url("https", &binding("uk1")),
            "https://host1:9000/v1/users:byUUID/uk1?key=access_key"
        );
    }

    fn pointing_at(mut am: AuthMethod, server: &MockServer) -> AuthMethod {
        am.host = server.address().ip().to_string();
        am.port = server.address().port();
        am
    }

    #[tokio::test]
    async fn api_key_retrieval_returns_normalized_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/users:byUUID/uk1"))
            .and(query_param("key", "access_key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t0k3n", "name": "u"})))
            .expect(1)
            .mount(&server)
            .await;

        let am = pointing_at(api_key_method(), &server);
        let token = am
            .retrieve_downstream_token(&binding("uk1"), &reqwest::Client::new(), "http")
            .await
            .unwrap();

        assert_eq!(token.token, json!("t0k3n"));
    }

    #[tokio::test]
    async fn headers_retrieval_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/admin/users:byID/uk1"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "from-headers"})))
            .expect(1)
            .mount(&server)
            .await;

        let am = pointing_at(headers_method(), &server);
        let token = am
            .retrieve_downstream_token(&binding("uk1"), &reqwest::Client::new(), "http")
            .await
            .unwrap();

        assert_eq!(token.token, json!("from-headers"));
    }

    #[tokio::test]
    async fn retrieval_surfaces_downstream_failures() {
        let server = MockServer::start().await;
        Mock::given(path("/v1/users:byUUID/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("user not found"))
            .mount(&server)
            .await;
        Mock::given(path("/v1/users:byUUID/nofield"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "u"})))
            .mount(&server)
            .await;
        Mock::given(path("/v1/users:byUUID/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let am = pointing_at(api_key_method(), &server);
        let client = reqwest::Client::new();

        let err = am
            .retrieve_downstream_token(&binding("missing"), &client, "http")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Internal Error: user not found");

        let err = am
            .retrieve_downstream_token(&binding("nofield"), &client, "http")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Internal Error: The specified retrieval field: `token` was not found in the response body of the service type"
        );

        let err = am
            .retrieve_downstream_token(&binding("garbage"), &client, "http")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
    }

    #[tokio::test]
    async fn mock_variant_uses_canned_responses() {
        let mut am = api_key_method();
        am.kind = AuthMethodKind::Mock;
        let client = reqwest::Client::new();

        let token = am
            .retrieve_downstream_token(&binding("success"), &client, "https")
            .await
            .unwrap();
        assert_eq!(token.token, json!("some-value"));

        assert!(
            am.retrieve_downstream_token(&binding("incorrect-retrieval-field"), &client, "https")
                .await
                .is_err()
        );
    }
}
