//! `spacecat`: binary entry point.
//!
//! Startup sequence:
//! 1. Load and validate [`Config`] from environment variables.
//! 2. Initialise structured JSON logging.
//! 3. Load the TLS identity.
//! 4. Build the router: upload guards, then the in-memory capsule.
//! 5. Serve until Ctrl-C.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use spacecat::capsule::Capsule;
use spacecat::config::Config;
use spacecat::server::{require_cert_fingerprint, require_token, titan_only, tls, GeminiServer};
use spacecat::{telemetry, Router};

#[tokio::main]
async fn main() -> Result<()> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = Config::from_env().map_err(|e| {
        // Telemetry is not yet up; write to stderr directly.
        eprintln!("ERROR: configuration invalid: {e:#}");
        e
    })?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        listen_port = cfg.listen_port,
        "spacecat starting"
    );

    // -----------------------------------------------------------------------
    // 3. TLS
    // -----------------------------------------------------------------------
    let tls_config = tls::load_server_config(cfg.tls_cert_path(), cfg.tls_key_path())?;

    // -----------------------------------------------------------------------
    // 4. Routes
    // -----------------------------------------------------------------------
    let mut router = Router::new();
    if let Some(token) = cfg.titan_token() {
        router.use_all(require_token(token));
        info!("titan uploads require a token");
    }
    if let Some(fingerprint) = cfg.titan_fingerprint() {
        router.use_all(titan_only(require_cert_fingerprint(fingerprint)));
        info!(fingerprint, "titan uploads pinned to a client certificate");
    }
    if cfg.titan_token().is_none() && cfg.titan_fingerprint().is_none() {
        warn!("titan uploads are open to every client");
    }
    Capsule::with_max_bytes(cfg.capsule_max_bytes).mount(&mut router)?;

    // -----------------------------------------------------------------------
    // 5. Server
    // -----------------------------------------------------------------------
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        signal.cancel();
    });

    GeminiServer::new(tls_config, router)
        .with_limits(cfg.limits())
        .listen(cfg.listen_port, shutdown)
        .await
}
