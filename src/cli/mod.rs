// src/cli/mod.rs — CLI definition (clap derive)

pub mod attempts;
pub mod generate;
pub mod migrate;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::core::clock::SystemClock;
use crate::core::ledger::AttemptLedger;
use crate::core::orchestrator::GenerationOrchestrator;
use crate::core::types::{LearningStyle, SkillLevel};
use crate::infra::config::Config;
use crate::infra::paths;
use crate::memory::{MemoryManager, StoreHandle};
use crate::provider::openai_compat::OpenAICompatProvider;

#[derive(Parser)]
#[command(
    name = "plancraft",
    about = "Generate paced learning plans with an LLM",
    version
)]
pub struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Port to listen on (overrides config)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one generation attempt and print its event frames
    Generate(GenerateArgs),
    /// List recorded attempts for a plan
    Attempts {
        #[arg(long)]
        plan: String,
        /// Print raw JSON records
        #[arg(long)]
        json: bool,
    },
    /// Show migration status or roll back the latest migration
    Migrate {
        #[arg(long)]
        status: bool,
        #[arg(long)]
        rollback: bool,
    },
}

#[derive(clap::Args, Clone, Debug)]
pub struct GenerateArgs {
    /// Plan identifier attempts are counted against
    #[arg(long)]
    pub plan: String,
    #[arg(long, default_value = "local")]
    pub user: String,
    #[arg(long)]
    pub topic: String,
    #[arg(long)]
    pub notes: Option<String>,
    /// beginner, intermediate or advanced
    #[arg(long, default_value = "intermediate")]
    pub skill: SkillLevel,
    /// reading, video, practice or mixed
    #[arg(long, default_value = "mixed")]
    pub style: LearningStyle,
    #[arg(long, default_value = "5")]
    pub weekly_hours: f64,
    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<String>,
    /// Deadline (YYYY-MM-DD)
    #[arg(long)]
    pub deadline: Option<String>,
}

/// Open the configured database and move it onto the store server task.
pub async fn open_store(config: &Config) -> anyhow::Result<StoreHandle> {
    paths::ensure_dirs().await?;
    let path = config.db_path();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(MemoryManager::open(&path)?.spawn())
}

/// Wire the configured provider, ledger and timeout into an orchestrator.
pub fn build_orchestrator(
    config: &Config,
    store: StoreHandle,
) -> anyhow::Result<GenerationOrchestrator> {
    let api_key = config.api_key().ok_or_else(|| {
        anyhow::anyhow!(
            "No API key for provider '{}'. Set {}.",
            config.provider.id,
            config.provider.api_key_env
        )
    })?;
    let provider = OpenAICompatProvider::from_config(&config.provider, api_key);
    let clock = Arc::new(SystemClock);
    let ledger = AttemptLedger::new(Arc::new(store), clock.clone(), config.attempt_cap());

    Ok(GenerationOrchestrator::new(
        Arc::new(provider),
        ledger,
        config.timeout,
        clock,
    ))
}
