// src/provider/prompt.rs — Prompt rendering for plan generation

use std::sync::OnceLock;

use minijinja::{context, Environment};

use crate::core::types::GenerationInput;
use crate::infra::errors::PlanError;

pub const SYSTEM_PROMPT: &str = "You are an expert curriculum designer. You produce structured, \
realistic learning plans and reply with JSON only, never prose.";

const USER_TEMPLATE: &str = r#"Create a learning plan for the topic "{{ topic }}".

Learner profile:
- Skill level: {{ skill_level }}
- Preferred learning style: {{ learning_style }}
- Available time: {{ weekly_hours }} hours per week
{%- if start_date %}
- Starts on: {{ start_date }}
{%- endif %}
{%- if deadline_date %}
- Must finish by: {{ deadline_date }}
{%- endif %}
{%- if notes %}

Additional notes from the learner:
{{ notes }}
{%- endif %}

Respond with a single JSON object of this exact shape:
{"modules": [{"title": string, "description": string, "estimatedMinutes": integer,
  "tasks": [{"title": string, "description": string, "estimatedMinutes": integer}]}]}

Order modules from foundational to advanced. Every task needs estimatedMinutes greater than 0."#;

static PROMPT_ENV: OnceLock<Result<Environment<'static>, String>> = OnceLock::new();

/// Template environment, compiled on first use.
fn prompt_env() -> Result<&'static Environment<'static>, PlanError> {
    PROMPT_ENV
        .get_or_init(|| {
            let mut env = Environment::new();
            env.add_template("plan", USER_TEMPLATE)
                .map_err(|e| e.to_string())?;
            Ok(env)
        })
        .as_ref()
        .map_err(|e| PlanError::Config(format!("invalid prompt template: {e}")))
}

/// Render the user message for `input`.
pub fn render_user_prompt(input: &GenerationInput) -> Result<String, PlanError> {
    let template = prompt_env()?
        .get_template("plan")
        .map_err(|e| PlanError::Config(format!("missing prompt template: {e}")))?;

    template
        .render(context! {
            topic => input.topic,
            skill_level => input.skill_level.to_string(),
            learning_style => input.learning_style.to_string(),
            weekly_hours => format_hours(input.weekly_hours),
            start_date => input.start_date,
            deadline_date => input.deadline_date,
            notes => input.notes,
        })
        .map_err(|e| PlanError::Config(format!("failed to render prompt: {e}")))
}

fn format_hours(hours: f64) -> String {
    if hours.fract() == 0.0 {
        format!("{}", hours as i64)
    } else {
        format!("{hours:.1}")
    }
}
