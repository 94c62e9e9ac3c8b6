// src/main.rs — plancraft entry point

use std::path::Path;
use std::sync::Arc;

use clap::Parser;

use plancraft::api::{self, ApiState};
use plancraft::cli::{self, Cli, Commands};
use plancraft::infra::config::Config;
use plancraft::infra::logger;

#[tokio::main]
async fn main() {
    // RUST_LOG overrides the default level
    logger::init_logging("info");

    if let Err(e) = run().await {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = if let Some(ref path) = cli.config {
        Config::load_from(Path::new(path))?
    } else {
        Config::load()?
    };
    if cli.config.is_some() {
        config.apply_env_overrides();
    }

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.api.port = port;
            }
            let store = cli::open_store(&config).await?;
            let orchestrator = cli::build_orchestrator(&config, store.clone())?;
            let state = ApiState {
                store,
                orchestrator: Arc::new(orchestrator),
            };
            api::start_server(&config.api, state).await
        }
        Commands::Generate(args) => {
            let store = cli::open_store(&config).await?;
            let orchestrator = cli::build_orchestrator(&config, store)?;
            cli::generate::run_generate(&args, Arc::new(orchestrator)).await
        }
        Commands::Attempts { plan, json } => {
            let store = cli::open_store(&config).await?;
            cli::attempts::show_attempts(&store, &plan, json).await
        }
        Commands::Migrate { status, rollback } => {
            cli::migrate::run_migrate(&config.db_path(), status, rollback)
        }
    }
}
