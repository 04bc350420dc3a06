//! ScreenView orchestrator entry point.
//!
//! Loads the configuration, wires the orchestrator to the headless engine and
//! surfaces, and runs until Ctrl-C.  UI commands are read from stdin as JSON
//! lines and notifications are written to stdout (see
//! [`sv_orchestrator::infrastructure::ui_surface::headless`]); logs go to
//! stderr.
//!
//! ```text
//! main()
//!  ├─ ConfigStore       -- --config <path> or the platform config file
//!  ├─ Orchestrator::new -- router subscriptions, command and notice pumps
//!  ├─ init()            -- main surface + configured hosts
//!  ├─ command shell     -- stdin → EventRouter::dispatch
//!  └─ Ctrl-C            -- shutdown() tears every session down once
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sv_orchestrator::application::orchestrator::Orchestrator;
use sv_orchestrator::application::SessionContext;
use sv_orchestrator::infrastructure::engine::headless::HeadlessEngine;
use sv_orchestrator::infrastructure::event_router::EventRouter;
use sv_orchestrator::infrastructure::storage::config::{
    ConfigStore, FileConfigStore, MemoryConfigStore,
};
use sv_orchestrator::infrastructure::ui_surface::headless::{
    run_command_shell, HeadlessSurfaceFactory,
};

/// ScreenView session orchestrator.
#[derive(Debug, Parser)]
#[command(name = "sv-orchestrator", version)]
struct Cli {
    /// Configuration file to load and save instead of the platform default.
    #[arg(long, env = "SCREENVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Log level used when `RUST_LOG` is not set; overrides the configured one.
    #[arg(long, env = "SCREENVIEW_LOG_LEVEL")]
    log_level: Option<String>,
}

fn config_store(cli: &Cli) -> (Arc<dyn ConfigStore>, Option<String>) {
    match &cli.config {
        Some(path) => (Arc::new(FileConfigStore::new(path)), None),
        None => match FileConfigStore::platform_default() {
            Ok(store) => (Arc::new(store), None),
            Err(e) => (
                Arc::new(MemoryConfigStore::default()),
                Some(format!("{e}; configuration will not be persisted")),
            ),
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (store, store_warning) = config_store(&cli);

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| store.load().log_level);
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&level)),
        )
        .init();

    info!("ScreenView orchestrator starting");
    if let Some(warning) = store_warning {
        warn!("{warning}");
    }

    let router = EventRouter::detached();
    let surfaces = Arc::new(HeadlessSurfaceFactory::new());
    let ctx = SessionContext::new(Arc::new(HeadlessEngine::new()), router.clone(), surfaces.clone());
    let orchestrator = Orchestrator::new(ctx, store);
    orchestrator.init().await;

    let shell = tokio::spawn(async move {
        if let Err(e) = run_command_shell(router, surfaces, BufReader::new(tokio::io::stdin())).await {
            warn!("command shell stopped: {e}");
        }
    });

    info!("ready; press Ctrl-C to exit");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    shell.abort();
    orchestrator.shutdown().await;
    info!("ScreenView orchestrator stopped");
    Ok(())
}
