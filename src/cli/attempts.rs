// src/cli/attempts.rs — `plancraft attempts`: attempt history for a plan

use crate::core::ledger::AttemptStore;
use crate::core::types::AttemptRecord;

pub async fn show_attempts(store: &dyn AttemptStore, plan_id: &str, json: bool) -> anyhow::Result<()> {
    let attempts = store.list_attempts(plan_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&attempts)?);
        return Ok(());
    }

    if attempts.is_empty() {
        println!("No attempts recorded for plan '{plan_id}'.");
        return Ok(());
    }

    println!("Attempts for plan '{plan_id}':");
    for attempt in &attempts {
        println!("  {}", format_attempt(attempt));
    }
    Ok(())
}

fn format_attempt(a: &AttemptRecord) -> String {
    let number = a
        .attempt_number
        .map(|n| format!("#{n}"))
        .unwrap_or_else(|| "--".into());
    let outcome = match a.classification {
        Some(c) => format!("{} ({c})", a.status),
        None => a.status.to_string(),
    };
    let mut line = format!(
        "{number:<4} {outcome:<24} {:>6}ms  {} modules / {} tasks  {}",
        a.duration_ms,
        a.modules_count,
        a.tasks_count,
        a.created_at.format("%Y-%m-%d %H:%M:%S"),
    );
    if a.extended_timeout {
        line.push_str("  [extended]");
    }
    line
}
