//! Gateway server implementation

pub mod auth;
pub mod authenticator;
pub mod handlers;
pub mod listener;
mod router;
mod server;

pub use authenticator::{CertificateAuthenticator, X509};
pub use listener::{TlsConnectInfo, TlsListener};
pub use router::{AppState, create_router};
pub use server::Gateway;
