// src/core/parser.rs — Incremental parsing of streamed plan output
//
// Expected shape:
// ```text
// {"modules": [
//   {"title": "...", "description": "...", "estimatedMinutes": 120,
//    "tasks": [{"title": "...", "description": "...", "estimatedMinutes": 30}]}
// ]}
// ```
// Markdown code fences around the JSON are tolerated.

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::types::{ParsedModule, ParsedTask};
use crate::infra::errors::{ParseErrorKind, PlanError};

/// Parsed modules plus the exact text they came from.
#[derive(Debug, Clone)]
pub struct ParsedPlan {
    pub modules: Vec<ParsedModule>,
    pub raw_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Looking for the `"modules"` key.
    SeekKey,
    /// Key seen, waiting for the opening `[`.
    SeekArray,
    /// Inside the array, between elements.
    InArray,
    /// Inside a module object at the given brace depth.
    InModule,
    /// First module seen or array closed; nothing left to detect.
    Done,
}

/// Accumulates fragments and reports the first complete module object exactly
/// once through the observer.
pub struct StreamingPlanParser<F: FnMut()> {
    buffer: String,
    scanned: usize,
    state: ScanState,
    depth: usize,
    in_string: bool,
    escaped: bool,
    on_first_module: Option<F>,
}

impl<F: FnMut()> StreamingPlanParser<F> {
    pub fn new(on_first_module: F) -> Self {
        Self {
            buffer: String::new(),
            scanned: 0,
            state: ScanState::SeekKey,
            depth: 0,
            in_string: false,
            escaped: false,
            on_first_module: Some(on_first_module),
        }
    }

    pub fn feed(&mut self, fragment: &str) {
        self.buffer.push_str(fragment);
        self.scan();
    }

    pub fn first_module_seen(&self) -> bool {
        self.on_first_module.is_none()
    }

    fn scan(&mut self) {
        if self.state == ScanState::SeekKey {
            match self.buffer.find("\"modules\"") {
                Some(pos) => {
                    self.scanned = pos + "\"modules\"".len();
                    self.state = ScanState::SeekArray;
                }
                // whole buffer is searched again next feed, so split keys are found
                None => return,
            }
        }

        let bytes = self.buffer.as_bytes();
        while self.scanned < bytes.len() && self.state != ScanState::Done {
            let b = bytes[self.scanned];
            self.scanned += 1;

            match self.state {
                ScanState::SeekArray => match b {
                    b'[' => self.state = ScanState::InArray,
                    b':' | b' ' | b'\n' | b'\r' | b'\t' => {}
                    _ => self.state = ScanState::Done,
                },
                ScanState::InArray => match b {
                    b'{' => {
                        self.state = ScanState::InModule;
                        self.depth = 1;
                    }
                    b']' => self.state = ScanState::Done,
                    _ => {}
                },
                ScanState::InModule => {
                    if self.in_string {
                        if self.escaped {
                            self.escaped = false;
                        } else if b == b'\\' {
                            self.escaped = true;
                        } else if b == b'"' {
                            self.in_string = false;
                        }
                        continue;
                    }
                    match b {
                        b'"' => self.in_string = true,
                        b'{' => self.depth += 1,
                        b'}' => {
                            self.depth -= 1;
                            if self.depth == 0 {
                                self.state = ScanState::Done;
                                if let Some(mut observer) = self.on_first_module.take() {
                                    observer();
                                }
                            }
                        }
                        _ => {}
                    }
                }
                ScanState::SeekKey | ScanState::Done => {}
            }
        }
    }

    /// Validate the accumulated text and produce the plan.
    pub fn finish(self) -> Result<ParsedPlan, PlanError> {
        let modules = parse_plan_text(&self.buffer)?;
        Ok(ParsedPlan {
            modules,
            raw_text: self.buffer,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPlan {
    modules: Vec<RawModule>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawModule {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    estimated_minutes: Option<f64>,
    #[serde(default)]
    tasks: Vec<RawTask>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTask {
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    estimated_minutes: Option<f64>,
}

/// Parse and validate complete plan text.
pub fn parse_plan_text(text: &str) -> Result<Vec<ParsedModule>, PlanError> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err(PlanError::Parse {
            kind: ParseErrorKind::EmptyOutput,
            message: "provider returned no content".into(),
        });
    }

    let raw: RawPlan = serde_json::from_str(body)
        .map_err(|e| PlanError::validation(format!("output is not a valid plan: {e}")))?;

    if raw.modules.is_empty() {
        return Err(PlanError::validation("plan has no modules"));
    }

    raw.modules
        .into_iter()
        .enumerate()
        .map(|(mi, m)| validate_module(mi, m))
        .collect()
}

fn validate_module(index: usize, raw: RawModule) -> Result<ParsedModule, PlanError> {
    let title = raw.title.trim().to_string();
    if title.is_empty() {
        return Err(PlanError::validation(format!("module {} has no title", index + 1)));
    }

    let tasks = raw
        .tasks
        .into_iter()
        .enumerate()
        .map(|(ti, t)| {
            let task_title = t.title.trim().to_string();
            if task_title.is_empty() {
                return Err(PlanError::validation(format!(
                    "task {} in module '{title}' has no title",
                    ti + 1
                )));
            }
            let minutes = positive_minutes(t.estimated_minutes).ok_or_else(|| {
                PlanError::validation(format!(
                    "task '{task_title}' in module '{title}' needs estimatedMinutes > 0"
                ))
            })?;
            Ok(ParsedTask {
                title: task_title,
                description: t.description.unwrap_or_default().trim().to_string(),
                estimated_minutes: minutes,
            })
        })
        .collect::<Result<Vec<_>, PlanError>>()?;

    let estimated_minutes = positive_minutes(raw.estimated_minutes)
        .unwrap_or_else(|| tasks.iter().map(|t| t.estimated_minutes).sum());

    Ok(ParsedModule {
        title,
        description: raw.description.unwrap_or_default().trim().to_string(),
        estimated_minutes,
        tasks,
    })
}

/// Whole minutes for a positive finite estimate, rounded up.
fn positive_minutes(value: Option<f64>) -> Option<u32> {
    let v = value?;
    if !v.is_finite() || v <= 0.0 {
        return None;
    }
    Some(v.ceil().min(u32::MAX as f64) as u32)
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string ("json") on the opening fence line
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

/// Drive a parser over a fragment stream until it ends, an upstream error
/// arrives, or `signal` fires.
pub async fn parse_plan_stream<S, F>(
    mut stream: S,
    signal: &CancellationToken,
    on_first_module: F,
) -> Result<ParsedPlan, PlanError>
where
    S: Stream<Item = Result<String, PlanError>> + Unpin,
    F: FnMut(),
{
    let mut parser = StreamingPlanParser::new(on_first_module);

    loop {
        let next = tokio::select! {
            biased;
            _ = signal.cancelled() => return Err(PlanError::Cancelled),
            next = stream.next() => next,
        };

        match next {
            Some(Ok(fragment)) => parser.feed(&fragment),
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    parser.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    const PLAN: &str = r#"{"modules":[{"title":"Basics","description":"Start here","estimatedMinutes":60,"tasks":[{"title":"Read intro","description":"Chapter 1","estimatedMinutes":30},{"title":"Exercises","estimatedMinutes":30}]},{"title":"Next","tasks":[{"title":"Project","estimatedMinutes":90}]}]}"#;

    #[test]
    fn test_parse_complete_plan() {
        let modules = parse_plan_text(PLAN).unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].title, "Basics");
        assert_eq!(modules[0].tasks.len(), 2);
        assert_eq!(modules[0].tasks[1].description, "");
        // module minutes default to the task total
        assert_eq!(modules[1].estimated_minutes, 90);
    }

    #[test]
    fn test_parse_strips_code_fence() {
        let fenced = format!("```json\n{PLAN}\n```");
        assert_eq!(parse_plan_text(&fenced).unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_json_is_validation_error() {
        let err = parse_plan_text("{\"modules\": [").unwrap_err();
        assert!(matches!(
            err,
            PlanError::Parse {
                kind: ParseErrorKind::Validation,
                ..
            }
        ));
    }

    #[test]
    fn test_empty_output_is_not_validation() {
        let err = parse_plan_text("   ").unwrap_err();
        assert!(matches!(
            err,
            PlanError::Parse {
                kind: ParseErrorKind::EmptyOutput,
                ..
            }
        ));
    }

    #[test]
    fn test_rejects_no_modules_and_bad_tasks() {
        assert!(parse_plan_text(r#"{"modules":[]}"#).is_err());
        assert!(parse_plan_text(r#"{"modules":[{"title":" ","tasks":[]}]}"#).is_err());
        let zero = r#"{"modules":[{"title":"A","tasks":[{"title":"t","estimatedMinutes":0}]}]}"#;
        assert!(parse_plan_text(zero).is_err());
        let missing = r#"{"modules":[{"title":"A","tasks":[{"title":"t"}]}]}"#;
        assert!(parse_plan_text(missing).is_err());
        let negative = r#"{"modules":[{"title":"A","tasks":[{"title":"t","estimatedMinutes":-5}]}]}"#;
        assert!(parse_plan_text(negative).is_err());
    }

    #[test]
    fn test_fractional_minutes_round_up() {
        let plan = r#"{"modules":[{"title":"A","tasks":[
            {"title":"t1","estimatedMinutes":0.75},
            {"title":"t2","estimatedMinutes":12.2}]}]}"#;
        let modules = parse_plan_text(plan).unwrap();
        assert_eq!(modules[0].tasks[0].estimated_minutes, 1);
        assert_eq!(modules[0].tasks[1].estimated_minutes, 13);
        assert_eq!(modules[0].estimated_minutes, 14);
    }

    #[test]
    fn test_first_module_detected_once_across_fragments() {
        let calls = Cell::new(0);
        let mut parser = StreamingPlanParser::new(|| calls.set(calls.get() + 1));

        let split = PLAN.find("]},").unwrap() + 2;
        for chunk in PLAN[..split].as_bytes().chunks(7) {
            assert_eq!(calls.get(), 0);
            parser.feed(std::str::from_utf8(chunk).unwrap());
        }
        assert_eq!(calls.get(), 1);
        assert!(parser.first_module_seen());

        parser.feed(&PLAN[split..]);
        assert_eq!(calls.get(), 1);
        let plan = parser.finish().unwrap();
        assert_eq!(plan.raw_text, PLAN);
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let calls = Cell::new(0);
        let mut parser = StreamingPlanParser::new(|| calls.set(calls.get() + 1));
        parser.feed(r#"{"modules":[{"title":"Sets {a} and \"}\" quoting","#);
        assert_eq!(calls.get(), 0);
        parser.feed(r#""tasks":[{"title":"x","estimatedMinutes":5}]}]}"#);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_split_key_is_found() {
        let calls = Cell::new(0);
        let mut parser = StreamingPlanParser::new(|| calls.set(calls.get() + 1));
        parser.feed("{\"mod");
        parser.feed("ules\": [ {\"title\":\"A\",\"tasks\":[]}");
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn test_parse_plan_stream() {
        let fragments: Vec<Result<String, PlanError>> = PLAN
            .as_bytes()
            .chunks(16)
            .map(|c| Ok(String::from_utf8(c.to_vec()).unwrap()))
            .collect();
        let signal = CancellationToken::new();
        let mut seen = 0;
        let plan = parse_plan_stream(futures::stream::iter(fragments), &signal, || seen += 1)
            .await
            .unwrap();
        assert_eq!(seen, 1);
        assert_eq!(plan.modules.len(), 2);
    }

    #[tokio::test]
    async fn test_parse_plan_stream_propagates_upstream_error() {
        let fragments = vec![
            Ok("{\"modules\":".to_string()),
            Err(PlanError::RateLimited {
                provider: "test".into(),
                retry_after_ms: 0,
            }),
        ];
        let signal = CancellationToken::new();
        let err = parse_plan_stream(futures::stream::iter(fragments), &signal, || {})
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn test_parse_plan_stream_stops_on_cancel() {
        let signal = CancellationToken::new();
        signal.cancel();
        let stream = futures::stream::pending::<Result<String, PlanError>>();
        let err = parse_plan_stream(stream, &signal, || {})
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::Cancelled));
    }
}
