// src/cli/generate.rs — `plancraft generate`: one attempt, events as JSON lines on stdout

use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::GenerateArgs;
use crate::api::handlers::generation_stream;
use crate::core::orchestrator::{GenerationContext, GenerationOrchestrator};
use crate::core::types::GenerationInput;

impl From<&GenerateArgs> for GenerationInput {
    fn from(args: &GenerateArgs) -> Self {
        GenerationInput {
            topic: args.topic.clone(),
            notes: args.notes.clone(),
            skill_level: args.skill,
            weekly_hours: args.weekly_hours,
            learning_style: args.style,
            start_date: args.start.clone(),
            deadline_date: args.deadline.clone(),
        }
    }
}

/// Run the attempt and print every event as one JSON line. Ctrl-C cancels the attempt.
pub async fn run_generate(
    args: &GenerateArgs,
    orchestrator: Arc<GenerationOrchestrator>,
) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling generation");
            on_interrupt.cancel();
        }
    });

    let ctx = GenerationContext::new(args.plan.clone(), args.user.clone(), args.into());
    let mut stream = generation_stream(orchestrator, ctx, Some(&cancel));

    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next().await {
        let line = serde_json::to_string(&event?)?;
        writeln!(stdout, "{line}")?;
        stdout.flush()?;
    }
    Ok(())
}
