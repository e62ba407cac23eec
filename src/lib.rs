//! Authentication Gateway Library
//!
//! Exchanges a client's X.509 certificate for a token issued by a downstream
//! service.
//!
//! # Features
//!
//! - **Mutual TLS front end**: client certificates verified against a CA directory
//! - **Certificate checks**: expiry plus concurrent CRL fetch-and-scan
//! - **Bindings**: canonical DN to per-service unique key
//! - **Pluggable auth methods**: API key in path, literal headers
//! - **Management API**: service types, bindings and auth methods behind a shared key

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth_methods;
pub mod bindings;
pub mod cli;
pub mod config;
pub mod error;
pub mod gateway;
pub mod mtls;
pub mod service_types;
pub mod store;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` takes precedence over `level`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}
