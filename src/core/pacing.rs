// src/core/pacing.rs — Fit generated modules to the user's time budget
//
// Capacity is a task count derived from weekly hours and the weeks until the
// deadline. Trimming keeps the first task of every module before spending the
// rest of the budget in original (module, task) order.

use chrono::{DateTime, NaiveDate};

use super::types::{count_tasks, GenerationInput, ParsedModule, SkillLevel};

const BASE_TASK_MINUTES: i64 = 45;
const MIN_TASK_MINUTES: i64 = 20;
const MAX_TASK_MINUTES: i64 = 90;

/// The subset of the input that drives capacity.
#[derive(Debug, Clone, Copy)]
pub struct PacingInput<'a> {
    pub weekly_hours: f64,
    pub skill_level: SkillLevel,
    pub start_date: Option<&'a str>,
    pub deadline_date: Option<&'a str>,
}

impl<'a> From<&'a GenerationInput> for PacingInput<'a> {
    fn from(input: &'a GenerationInput) -> Self {
        Self {
            weekly_hours: input.weekly_hours,
            skill_level: input.skill_level,
            start_date: input.start_date.as_deref(),
            deadline_date: input.deadline_date.as_deref(),
        }
    }
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp (its date part).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

pub fn average_task_minutes(skill_level: SkillLevel) -> i64 {
    let adjustment = match skill_level {
        SkillLevel::Beginner => 10,
        SkillLevel::Intermediate => 0,
        SkillLevel::Advanced => -10,
    };
    (BASE_TASK_MINUTES + adjustment).clamp(MIN_TASK_MINUTES, MAX_TASK_MINUTES)
}

/// Number of tasks that fit before the deadline. 0 when there is no usable deadline.
pub fn compute_capacity(input: PacingInput<'_>, today: NaiveDate) -> usize {
    let Some(deadline) = input.deadline_date.and_then(parse_date) else {
        return 0;
    };
    let start = input.start_date.and_then(parse_date).unwrap_or(today);

    let days = (deadline - start).num_days();
    let weeks = if days <= 0 {
        1
    } else {
        ((days + 6) / 7).max(1)
    };

    if !input.weekly_hours.is_finite() || input.weekly_hours <= 0.0 {
        return 0;
    }

    let minutes = input.weekly_hours * weeks as f64 * 60.0;
    let capacity = (minutes / average_task_minutes(input.skill_level) as f64).floor();
    if capacity <= 0.0 {
        0
    } else if capacity >= usize::MAX as f64 {
        usize::MAX
    } else {
        capacity as usize
    }
}

/// Drop whole tasks until at most `capacity` remain, keeping order and at
/// least one task per module while the budget allows. Never returns a module
/// without tasks.
pub fn trim_modules_to_capacity(modules: &[ParsedModule], capacity: usize) -> Vec<ParsedModule> {
    if capacity == 0 {
        return Vec::new();
    }

    if capacity >= count_tasks(modules) {
        return drop_empty_modules(modules);
    }

    let non_empty: Vec<usize> = modules
        .iter()
        .enumerate()
        .filter(|(_, m)| !m.tasks.is_empty())
        .map(|(i, _)| i)
        .collect();

    if non_empty.len() >= capacity {
        return non_empty
            .iter()
            .take(capacity)
            .map(|&i| with_tasks(&modules[i], &[0]))
            .collect();
    }

    // keep[module] = indices of surviving tasks, in order
    let mut keep: Vec<Vec<usize>> = modules
        .iter()
        .map(|m| if m.tasks.is_empty() { vec![] } else { vec![0] })
        .collect();
    let mut total = non_empty.len();

    'fill: for (mi, module) in modules.iter().enumerate() {
        for ti in 1..module.tasks.len() {
            if total >= capacity {
                break 'fill;
            }
            keep[mi].push(ti);
            total += 1;
        }
    }

    modules
        .iter()
        .zip(keep.iter())
        .filter(|(_, kept)| !kept.is_empty())
        .map(|(module, kept)| with_tasks(module, kept))
        .collect()
}

/// Apply the input's time budget to parsed modules.
///
/// Without a deadline only empty modules are removed. A computed capacity of
/// zero falls back to one slot per module with tasks, so the plan is never emptied.
pub fn pace_plan(modules: &[ParsedModule], input: &GenerationInput, today: NaiveDate) -> Vec<ParsedModule> {
    if input.deadline_date.is_none() {
        return drop_empty_modules(modules);
    }

    let mut capacity = compute_capacity(PacingInput::from(input), today);
    if capacity == 0 {
        capacity = modules.iter().filter(|m| !m.tasks.is_empty()).count();
    }

    let paced = trim_modules_to_capacity(modules, capacity);
    tracing::debug!(
        capacity,
        tasks_before = count_tasks(modules),
        tasks_after = count_tasks(&paced),
        "Paced plan"
    );
    paced
}

fn drop_empty_modules(modules: &[ParsedModule]) -> Vec<ParsedModule> {
    modules
        .iter()
        .filter(|m| !m.tasks.is_empty())
        .cloned()
        .collect()
}

fn with_tasks(module: &ParsedModule, task_indices: &[usize]) -> ParsedModule {
    ParsedModule {
        title: module.title.clone(),
        description: module.description.clone(),
        estimated_minutes: module.estimated_minutes,
        tasks: task_indices
            .iter()
            .map(|&i| module.tasks[i].clone())
            .collect(),
    }
}
