use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use rusty_guard::auth::AuthService;
use rusty_guard::clock::system_clock;
use rusty_guard::config::AuthConfig;
use rusty_guard::handlers::routes;
use rusty_guard::security_logger::AuditLogger;

#[tokio::main]
async fn main() {
    // Initialize env
    match dotenvy::dotenv() {
        Ok(_) => info!("Environment variables loaded from .env file"),
        Err(e) => warn!("Failed to load .env file: {}", e),
    };

    // Initialize logging
    env_logger::init();

    // Load config from environment
    let config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    config.warn_insecure_settings();

    info!(
        "Configuration: host={}, port={}, access_ttl={}s, session_ttl={}s",
        config.host,
        config.port,
        config.access_token_ttl.as_secs(),
        config.session_ttl.as_secs()
    );

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let tls_paths = match (config.enable_tls, &config.tls_cert_path, &config.tls_key_path) {
        (true, Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
        _ => None,
    };

    let audit = Arc::new(AuditLogger::to_log());
    let service = match AuthService::in_memory(config, audit, system_clock()) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            error!("Failed to initialize auth service: {}", e);
            std::process::exit(1);
        }
    };

    // Session sweep, refresh-record cleanup and rate-limit eviction
    let _maintenance = service.start_maintenance();

    let routes = routes(service);

    match tls_paths {
        Some((cert, key)) => {
            info!("Starting Rusty Guard server on https://{}", addr);
            warp::serve(routes).tls().cert_path(cert).key_path(key).run(addr).await;
        }
        None => {
            info!("Starting Rusty Guard server on http://{}", addr);
            warp::serve(routes).run(addr).await;
        }
    }
}
