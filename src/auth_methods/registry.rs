//! Auth method registry: type tag to constructor, plus per service type
//! defaults.
//!
//! Built once at startup and shared through the application state.

use std::collections::{BTreeMap, HashMap};

use tracing::error;

use super::{API_KEY, AuthMethod, AuthMethodKind, HEADERS, MOCK};
use crate::config::{Config, ServiceTypeDefaults};
use crate::{Error, Result};

/// Builds the empty variant for a type tag.
pub type Constructor = fn() -> AuthMethodKind;

const NOT_FOUND: &str = "Type is supported but not found";

fn api_key() -> AuthMethodKind {
    AuthMethodKind::ApiKey {
        access_key: String::new(),
    }
}

fn headers() -> AuthMethodKind {
    AuthMethodKind::Headers {
        headers: BTreeMap::new(),
    }
}

fn mock() -> AuthMethodKind {
    AuthMethodKind::Mock
}

/// Registry of auth method variants and service type defaults.
#[derive(Debug, Clone, Default)]
pub struct AuthMethodRegistry {
    constructors: HashMap<String, Constructor>,
    defaults: HashMap<String, ServiceTypeDefaults>,
}

impl AuthMethodRegistry {
    /// Registry with no variants and the given defaults.
    #[must_use]
    pub fn new(defaults: HashMap<String, ServiceTypeDefaults>) -> Self {
        Self {
            constructors: HashMap::new(),
            defaults,
        }
    }

    /// Registry with the production variants (`api-key`, `headers`) and the
    /// configured service type defaults.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new(config.service_type_defaults.clone());
        registry.register(API_KEY, api_key).register(HEADERS, headers);
        registry
    }

    /// Add the canned-response `mock` variant.
    #[must_use]
    pub fn with_mock(mut self) -> Self {
        self.register(MOCK, mock);
        self
    }

    /// Register a constructor under `tag`, replacing any previous one.
    pub fn register(&mut self, tag: &str, constructor: Constructor) -> &mut Self {
        self.constructors.insert(tag.to_string(), constructor);
        self
    }

    /// Whether `tag` has a constructor.
    #[must_use]
    pub fn is_registered(&self, tag: &str) -> bool {
        self.constructors.contains_key(tag)
    }

    /// Registered tags, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Fail unless `tag` has a constructor.
    ///
    /// # Errors
    ///
    /// `Internal`: a tag accepted as supported has no implementation.
    pub fn ensure_registered(&self, tag: &str) -> Result<()> {
        self.constructor(tag).map(|_| ())
    }

    /// Empty auth method of the variant registered under `tag`.
    ///
    /// # Errors
    ///
    /// `Internal` when `tag` is not registered.
    pub fn create(&self, tag: &str) -> Result<AuthMethod> {
        let constructor = self.constructor(tag)?;
        Ok(AuthMethod::new(constructor()))
    }

    fn constructor(&self, tag: &str) -> Result<Constructor> {
        self.constructors.get(tag).copied().ok_or_else(|| {
            error!(auth_method = %tag, "Auth method type is supported but has no constructor");
            Error::Internal(NOT_FOUND.to_string())
        })
    }

    /// Defaults for a service type tag.
    ///
    /// # Errors
    ///
    /// `Internal` when the tag has no registered defaults.
    pub fn defaults_for(&self, service_type_tag: &str) -> Result<&ServiceTypeDefaults> {
        self.defaults.get(service_type_tag).ok_or_else(|| {
            error!(
                service_type = %service_type_tag,
                "Service type is supported but has no auth method defaults"
            );
            Error::Internal(NOT_FOUND.to_string())
        })
    }
}
