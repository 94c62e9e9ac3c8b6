// src/core/types.rs — Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::infra::errors::PlanError;
use crate::provider::ProviderMetadata;

const MAX_TOPIC_CHARS: usize = 200;
const MAX_NOTES_CHARS: usize = 2_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
}

impl std::fmt::Display for SkillLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkillLevel::Beginner => write!(f, "beginner"),
            SkillLevel::Intermediate => write!(f, "intermediate"),
            SkillLevel::Advanced => write!(f, "advanced"),
        }
    }
}

impl std::str::FromStr for SkillLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "beginner" => Ok(SkillLevel::Beginner),
            "intermediate" => Ok(SkillLevel::Intermediate),
            "advanced" => Ok(SkillLevel::Advanced),
            other => Err(format!("unknown skill level '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LearningStyle {
    Reading,
    Video,
    Practice,
    #[default]
    Mixed,
}

impl std::fmt::Display for LearningStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LearningStyle::Reading => write!(f, "reading"),
            LearningStyle::Video => write!(f, "video"),
            LearningStyle::Practice => write!(f, "practice"),
            LearningStyle::Mixed => write!(f, "mixed"),
        }
    }
}

impl std::str::FromStr for LearningStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reading" => Ok(LearningStyle::Reading),
            "video" => Ok(LearningStyle::Video),
            "practice" => Ok(LearningStyle::Practice),
            "mixed" => Ok(LearningStyle::Mixed),
            other => Err(format!("unknown learning style '{other}'")),
        }
    }
}

/// What the user asked for. Immutable for the duration of an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationInput {
    pub topic: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub skill_level: SkillLevel,
    pub weekly_hours: f64,
    #[serde(default)]
    pub learning_style: LearningStyle,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub deadline_date: Option<String>,
}

impl GenerationInput {
    pub fn new(topic: impl Into<String>, weekly_hours: f64) -> Self {
        Self {
            topic: topic.into(),
            notes: None,
            skill_level: SkillLevel::default(),
            weekly_hours,
            learning_style: LearningStyle::default(),
            start_date: None,
            deadline_date: None,
        }
    }

    /// Normalized copy used for the attempt: trimmed and length-bounded text,
    /// blank optionals dropped, weekly hours forced to a finite non-negative value.
    pub fn sanitized(&self) -> Self {
        let weekly_hours = if self.weekly_hours.is_finite() && self.weekly_hours > 0.0 {
            self.weekly_hours
        } else {
            0.0
        };

        Self {
            topic: truncate_chars(self.topic.trim(), MAX_TOPIC_CHARS),
            notes: non_blank(self.notes.as_deref()).map(|n| truncate_chars(n, MAX_NOTES_CHARS)),
            skill_level: self.skill_level,
            weekly_hours,
            learning_style: self.learning_style,
            start_date: non_blank(self.start_date.as_deref()).map(str::to_string),
            deadline_date: non_blank(self.deadline_date.as_deref()).map(str::to_string),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].trim_end().to_string(),
        None => s.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub estimated_minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedModule {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub estimated_minutes: u32,
    pub tasks: Vec<ParsedTask>,
}

/// Total task count across modules.
pub fn count_tasks(modules: &[ParsedModule]) -> usize {
    modules.iter().map(|m| m.tasks.len()).sum()
}

/// Closed failure taxonomy. `Unknown` is a client-side fallback only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClassification {
    Timeout,
    RateLimit,
    ProviderError,
    Validation,
    Capped,
    InProgress,
    Unknown,
}

impl FailureClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClassification::Timeout => "timeout",
            FailureClassification::RateLimit => "rate_limit",
            FailureClassification::ProviderError => "provider_error",
            FailureClassification::Validation => "validation",
            FailureClassification::Capped => "capped",
            FailureClassification::InProgress => "in_progress",
            FailureClassification::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FailureClassification {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "timeout" => Ok(FailureClassification::Timeout),
            "rate_limit" => Ok(FailureClassification::RateLimit),
            "provider_error" => Ok(FailureClassification::ProviderError),
            "validation" => Ok(FailureClassification::Validation),
            "capped" => Ok(FailureClassification::Capped),
            "in_progress" => Ok(FailureClassification::InProgress),
            "unknown" => Ok(FailureClassification::Unknown),
            other => Err(format!("unknown classification '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Success,
    Failure,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Success => "success",
            AttemptStatus::Failure => "failure",
        }
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "success" => Ok(AttemptStatus::Success),
            "failure" => Ok(AttemptStatus::Failure),
            other => Err(format!("unknown attempt status '{other}'")),
        }
    }
}

/// One persisted generation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub id: String,
    pub plan_id: String,
    pub user_id: String,
    /// Absent on capped records, which never allocate a number.
    pub attempt_number: Option<u32>,
    pub status: AttemptStatus,
    pub classification: Option<FailureClassification>,
    pub duration_ms: u64,
    pub modules_count: u32,
    pub tasks_count: u32,
    pub timed_out: bool,
    pub extended_timeout: bool,
    pub input: serde_json::Value,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Terminal update for a reserved attempt.
#[derive(Debug, Clone)]
pub struct AttemptCompletion {
    pub attempt_id: String,
    pub plan_id: String,
    pub status: AttemptStatus,
    pub classification: Option<FailureClassification>,
    pub duration_ms: u64,
    pub timed_out: bool,
    pub extended_timeout: bool,
    pub metadata: Option<serde_json::Value>,
    /// Paced modules to store as the plan's current content (success only).
    pub modules: Option<Vec<ParsedModule>>,
    pub modules_count: u32,
    pub tasks_count: u32,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct GenerationSuccess {
    pub modules: Vec<ParsedModule>,
    pub raw_text: String,
    pub metadata: ProviderMetadata,
    pub duration_ms: u64,
    pub extended_timeout: bool,
    pub attempt: AttemptRecord,
}

#[derive(Debug)]
pub struct GenerationFailure {
    pub classification: FailureClassification,
    pub error: PlanError,
    pub duration_ms: u64,
    pub extended_timeout: bool,
    pub timed_out: bool,
    pub attempt: AttemptRecord,
}

/// Outcome of one orchestrator run.
#[derive(Debug)]
pub enum GenerationResult {
    Success(GenerationSuccess),
    Failure(GenerationFailure),
}

impl GenerationResult {
    pub fn attempt(&self) -> &AttemptRecord {
        match self {
            GenerationResult::Success(s) => &s.attempt,
            GenerationResult::Failure(f) => &f.attempt,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, GenerationResult::Success(_))
    }

    pub fn classification(&self) -> Option<FailureClassification> {
        match self {
            GenerationResult::Success(_) => None,
            GenerationResult::Failure(f) => Some(f.classification),
        }
    }
}
