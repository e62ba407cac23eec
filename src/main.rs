//! Authentication Gateway
//!
//! Trades a client certificate for a downstream service token.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use authn_gateway::{
    auth_methods::AuthMethodRegistry,
    cli::{Cli, Command},
    config::Config,
    gateway::Gateway,
    mtls::build_tls_config,
    setup_tracing,
    store::InMemoryStore,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::CheckConfig) => run_check_config(&config),
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Load the configuration file and apply CLI overrides
fn load_config(cli: &Cli) -> authn_gateway::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host = host.clone();
    }
    Ok(config)
}

/// Validate everything `serve` would load, without binding
fn run_check_config(config: &Config) -> ExitCode {
    let mut failed = false;

    if let Err(e) = config.validate() {
        eprintln!("❌ {e}");
        failed = true;
    }

    let registry = AuthMethodRegistry::from_config(config);
    for tag in &config.supported_auth_methods {
        if !registry.is_registered(tag) {
            eprintln!(
                "❌ Supported auth method '{tag}' has no implementation (available: {})",
                registry.tags().join(", ")
            );
            failed = true;
        }
    }

    if config.tls.enabled {
        match build_tls_config(&config.tls) {
            Ok(_) => println!("✅ TLS material loaded (CA dir: {})", config.tls.ca_dir),
            Err(e) => {
                eprintln!("❌ TLS: {e}");
                failed = true;
            }
        }
    }

    if let Some(ref seed) = config.store.seed_file {
        match InMemoryStore::from_seed_file(Path::new(seed)) {
            Ok(_) => println!("✅ Datastore seed loaded: {seed}"),
            Err(e) => {
                eprintln!("❌ {e}");
                failed = true;
            }
        }
    }

    if failed {
        ExitCode::FAILURE
    } else {
        match serde_yaml::to_string(&config.redacted()) {
            Ok(yaml) => println!("{yaml}"),
            Err(e) => eprintln!("Failed to render configuration: {e}"),
        }
        println!("✅ Configuration is valid");
        ExitCode::SUCCESS
    }
}

async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        tls = config.tls.enabled,
        verify_certificate = config.verify_certificate,
        "Starting authentication gateway"
    );

    let gateway = match Gateway::new(config) {
        Ok(g) => g,
        Err(e) => {
            error!("Failed to create gateway: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Run with graceful shutdown
    if let Err(e) = gateway.run().await {
        error!("Gateway error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Gateway shutdown complete");
    ExitCode::SUCCESS
}
