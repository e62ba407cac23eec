//! Configuration management

use std::{collections::HashMap, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Placeholder substituted with the binding's unique key
pub const IDENTIFIER_PLACEHOLDER: &str = "{{identifier}}";
/// Placeholder substituted with the auth method's access key
pub const ACCESS_KEY_PLACEHOLDER: &str = "{{access_key}}";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    pub env_files: Vec<String>,
    /// Server configuration
    pub server: ServerConfig,
    /// TLS front end configuration
    pub tls: TlsConfig,
    /// Run expiry and revocation checks on presented certificates
    pub verify_certificate: bool,
    /// CRL fetch-and-scan tuning
    pub revocation: RevocationConfig,
    /// Downstream token retrieval
    pub retrieval: RetrievalConfig,
    /// Shared secret guarding the management API (`?key=`)
    pub service_token: String,
    /// Auth types a service type may declare (e.g. `x509`)
    pub supported_auth_types: Vec<String>,
    /// Auth methods a service type may declare (e.g. `api-key`)
    pub supported_auth_methods: Vec<String>,
    /// Service type tags (e.g. `ams`)
    pub supported_service_types: Vec<String>,
    /// Per service type tag defaults applied to new auth methods
    pub service_type_defaults: HashMap<String, ServiceTypeDefaults>,
    /// Datastore configuration
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env_files: Vec::new(),
            server: ServerConfig::default(),
            tls: TlsConfig::default(),
            verify_certificate: true,
            revocation: RevocationConfig::default(),
            retrieval: RetrievalConfig::default(),
            service_token: String::new(),
            supported_auth_types: vec!["x509".to_string(), "oidc".to_string()],
            supported_auth_methods: vec!["api-key".to_string(), "headers".to_string()],
            supported_service_types: vec!["ams".to_string(), "web-api".to_string()],
            service_type_defaults: default_service_type_defaults(),
            store: StoreConfig::default(),
        }
    }
}

fn default_service_type_defaults() -> HashMap<String, ServiceTypeDefaults> {
    HashMap::from([
        (
            "ams".to_string(),
            ServiceTypeDefaults {
                path: "/v1/users:byUUID/{{identifier}}?key={{access_key}}".to_string(),
                retrieval_field: "token".to_string(),
            },
        ),
        (
            "web-api".to_string(),
            ServiceTypeDefaults {
                path: "/api/v2/admin/users:byID/{{identifier}}?export=flat".to_string(),
                retrieval_field: "token".to_string(),
            },
        ),
    ])
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8443,
        }
    }
}

/// TLS front end configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Serve HTTPS. Plain HTTP never sees client certificates, so only
    /// the management API is usable with this turned off.
    pub enabled: bool,
    /// Server certificate chain (PEM)
    pub server_cert: String,
    /// Server private key (PEM)
    pub server_key: String,
    /// Directory of `*.pem` trust anchors for client certificates
    pub ca_dir: String,
    /// Accept client certificates issued by any CA
    pub trust_unknown_cas: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_cert: "/etc/authn-gateway/tls/server.crt".to_string(),
            server_key: "/etc/authn-gateway/tls/server.key".to_string(),
            ca_dir: "/etc/grid-security/certificates".to_string(),
            trust_unknown_cas: false,
        }
    }
}

/// CRL fetch-and-scan tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevocationConfig {
    /// Timeout for one CRL download
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    /// Concurrent scan workers per distribution point
    pub scan_workers: usize,
}

impl Default for RevocationConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(60),
            scan_workers: 2,
        }
    }
}

/// Downstream token retrieval
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Verify the downstream service's TLS certificate
    pub verify_ssl: bool,
    /// Timeout for one retrieval request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// URL scheme used to reach downstream services
    pub scheme: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            verify_ssl: true,
            timeout: Duration::from_secs(30),
            scheme: "https".to_string(),
        }
    }
}

/// Defaults applied to auth methods of one service type tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTypeDefaults {
    /// Path template (may contain `{{identifier}}` / `{{access_key}}`)
    pub path: String,
    /// Field of the downstream JSON response holding the token
    pub retrieval_field: String,
}

/// Datastore configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file with `service_types`, `bindings` and `auth_methods` to load at startup
    pub seed_file: Option<String>,
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("AUTHN_GATEWAY_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();

        Ok(config)
    }

    /// Check the settings needed to serve requests
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the first unusable setting.
    pub fn validate(&self) -> Result<()> {
        if self.service_token.is_empty() {
            return Err(Error::Config("service_token must be set".to_string()));
        }
        if self.revocation.scan_workers == 0 {
            return Err(Error::Config(
                "revocation.scan_workers must be at least 1".to_string(),
            ));
        }
        for tag in &self.supported_service_types {
            if !self.service_type_defaults.contains_key(tag) {
                tracing::warn!(
                    service_type = %tag,
                    "Supported service type has no registered defaults"
                );
            }
        }
        Ok(())
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                    Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Config with the service token masked, for logging
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.service_token.is_empty() {
            copy.service_token = "***".to_string();
        }
        copy
    }
}
