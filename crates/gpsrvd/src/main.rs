// # gpsrvd - GPSrv Daemon
//
// Thin integration layer: all provisioning, update and persistence logic
// lives in gpsrv-core. The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing tracing and the runtime
// 3. Registering providers and opening the state store
// 4. Bootstrapping the master provisioning secret
// 5. Serving the HTTP surface until SIGINT/SIGTERM
//
// ## Example
//
// ```bash
// export GPSRV_PROVIDER_API_TOKEN=your_token
// export GPSRV_PROVIDER_ZONE_ID=your_zone_id
// export GPSRV_STATE_STORE_PATH=/var/lib/gpsrv/kdb.json
//
// gpsrvd
// ```
//
// See `config.rs` for the full list of variables.

use anyhow::{Context, Result};
use gpsrv_core::secret::{ProvisionKeyBootstrap, RawSecret, bootstrap_provision_key};
use gpsrv_core::traits::StateStore;
use gpsrv_core::{DomainStore, GpsrvConfig, ProviderRegistry, SecretManager, SystemClock};
use gpsrvd::{ApiState, Config, router};
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown, or master secret regenerated
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum GpsrvExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<GpsrvExitCode> for ExitCode {
    fn from(code: GpsrvExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return GpsrvExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return GpsrvExitCode::ConfigError.into();
    }

    let log_level = match config.log_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration validation error: {:#}", e);
            return GpsrvExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return GpsrvExitCode::ConfigError.into();
    }

    info!("Starting gpsrvd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return GpsrvExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            GpsrvExitCode::RuntimeError
        } else {
            GpsrvExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let core_config: GpsrvConfig = config.to_core_config();

    let registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare provider");
        gpsrv_provider_cloudflare::register(&registry);
    }

    let provider = registry
        .create_provider(&core_config.provider)
        .context("Failed to create DNS provider")?;
    info!("Provider type: {}", core_config.provider.type_name());
    if config.dry_run {
        warn!("Running in DRY-RUN mode: DNS records will not be changed");
    }

    let backend = gpsrv_core::state::open(&core_config.state_store)
        .await
        .context("Failed to open state store")?;
    info!("State store type: {}", backend.backend_name());

    let store = Arc::new(
        DomainStore::open(backend)
            .await
            .context("Failed to load state")?,
    );
    info!("Loaded {} provisioned domain(s)", store.len().await);

    let secrets = SecretManager::new();
    match bootstrap_provision_key(&store, &secrets, config.regenerate_provision_key)
        .await
        .context("Failed to bootstrap master provisioning secret")?
    {
        ProvisionKeyBootstrap::Existing => info!("Master provisioning secret loaded"),
        ProvisionKeyBootstrap::Generated {
            secret,
            regenerated,
        } => {
            print_provision_key_notice(&secret);
            if regenerated {
                info!("Master provisioning secret regenerated; exiting");
                return Ok(());
            }
        }
    }

    let state = Arc::new(ApiState::new(
        store,
        provider,
        secrets,
        core_config.service,
        Arc::new(SystemClock),
    ));

    let shutdown = shutdown_signal()?;

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Listening on {}", config.listen_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")?;

    info!("Shutting down daemon");
    Ok(())
}

/// Show a freshly generated master secret on the operator console
///
/// Goes to stdout rather than the log; this is the only place the raw
/// value ever appears.
fn print_provision_key_notice(secret: &RawSecret) {
    println!(
        "NOTICE: No master provisioning secret was set, so a new one has been created.\n\n\
        THIS WILL ONLY BE SHOWN ONCE, and it CANNOT be retrieved from the state file afterwards.\n\
        If you lose it, regenerate it by running gpsrvd with GPSRV_REGEN_PKEY=1"
    );
    println!("NEW KEY: {}", secret.expose());
}

/// Resolve once SIGTERM or SIGINT arrives
///
/// Handlers are installed up front so a failure surfaces before serving.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(async move {
        let signal = tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        };
        info!("Received shutdown signal: {}", signal);
    })
}

/// Resolve once CTRL-C arrives
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal: SIGINT"),
            Err(e) => {
                error!("Failed to wait for CTRL-C: {}", e);
                std::future::pending::<()>().await;
            }
        }
    })
}
