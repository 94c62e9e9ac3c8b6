// src/provider/openai_compat.rs — Plan provider for OpenAI-compatible chat APIs
//
// Streams `/chat/completions` over SSE and yields content deltas as fragments.
// Works with OpenAI, Groq, DeepSeek, Together, OpenRouter and self-hosted
// servers that speak the same protocol.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest_eventsource::{Event, RequestBuilderExt};

use super::prompt::{render_user_prompt, SYSTEM_PROMPT};
use super::{GenerateOptions, PlanProvider, ProviderMetadata, ProviderResponse};
use crate::core::types::GenerationInput;
use crate::infra::config::ProviderConfig;
use crate::infra::errors::{PlanError, ProviderErrorKind};

pub struct OpenAICompatProvider {
    id_str: String,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAICompatProvider {
    pub fn new(id: impl Into<String>, api_key: String, base_url: String, model: String) -> Self {
        Self {
            id_str: id.into(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            temperature: 0.4,
            max_tokens: 4096,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &ProviderConfig, api_key: String) -> Self {
        let mut provider = Self::new(
            config.id.clone(),
            api_key,
            config.base_url.clone(),
            config.model.clone(),
        );
        provider.temperature = config.temperature;
        provider.max_tokens = config.max_tokens;
        provider
    }

    fn request_body(&self, input: &GenerationInput) -> Result<serde_json::Value, PlanError> {
        let user = render_user_prompt(input)?;
        Ok(serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user},
            ],
            "stream": true,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": {"type": "json_object"},
        }))
    }
}

enum Step {
    Cancelled,
    Deadline,
    Event(Option<Result<Event, reqwest_eventsource::Error>>),
}

/// Map a non-success HTTP status to the provider error taxonomy.
fn status_error(provider: &str, status: StatusCode, retry_after: Option<u64>) -> PlanError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => PlanError::RateLimited {
            provider: provider.to_string(),
            retry_after_ms: retry_after.map(|s| s * 1000).unwrap_or(0),
        },
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => PlanError::Provider {
            provider: provider.to_string(),
            message: format!("HTTP {status}"),
            kind: ProviderErrorKind::Timeout,
        },
        _ => PlanError::Provider {
            provider: provider.to_string(),
            message: format!("HTTP {status}"),
            kind: ProviderErrorKind::Upstream,
        },
    }
}

fn stream_error(provider: &str, error: reqwest_eventsource::Error) -> PlanError {
    match error {
        reqwest_eventsource::Error::InvalidStatusCode(status, response) => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            status_error(provider, status, retry_after)
        }
        reqwest_eventsource::Error::Transport(e) if e.is_timeout() => PlanError::Provider {
            provider: provider.to_string(),
            message: e.to_string(),
            kind: ProviderErrorKind::Timeout,
        },
        other => PlanError::Provider {
            provider: provider.to_string(),
            message: format!("SSE stream error: {other}"),
            kind: ProviderErrorKind::Upstream,
        },
    }
}

#[async_trait]
impl PlanProvider for OpenAICompatProvider {
    fn id(&self) -> &str {
        &self.id_str
    }

    async fn generate(
        &self,
        input: &GenerationInput,
        options: GenerateOptions,
    ) -> Result<ProviderResponse, PlanError> {
        let body = self.request_body(input)?;
        let provider_id = self.id_str.clone();

        let request_builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header(
                "User-Agent",
                format!("plancraft/{}", env!("CARGO_PKG_VERSION")),
            )
            .json(&body);

        let mut es = request_builder
            .eventsource()
            .map_err(|e| PlanError::Provider {
                provider: provider_id.clone(),
                message: format!("Failed to open event source: {e}"),
                kind: ProviderErrorKind::Upstream,
            })?;

        let GenerateOptions { signal, timeout } = options;
        let deadline = tokio::time::Instant::now() + timeout;

        let stream = async_stream::stream! {
            loop {
                let step = tokio::select! {
                    biased;
                    _ = signal.cancelled() => Step::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Step::Deadline,
                    event = es.next() => Step::Event(event),
                };

                let event = match step {
                    Step::Cancelled => {
                        yield Err(PlanError::Cancelled);
                        break;
                    }
                    Step::Deadline => {
                        yield Err(PlanError::ProviderTimeout {
                            provider: provider_id.clone(),
                            timeout_ms: timeout.as_millis() as u64,
                        });
                        break;
                    }
                    Step::Event(event) => event,
                };

                match event {
                    None => break,
                    Some(Ok(Event::Open)) => {}
                    Some(Ok(Event::Message(msg))) => {
                        if msg.data == "[DONE]" {
                            break;
                        }
                        let parsed: serde_json::Value = match serde_json::from_str(&msg.data) {
                            Ok(v) => v,
                            Err(e) => {
                                yield Err(PlanError::Provider {
                                    provider: provider_id.clone(),
                                    message: format!("Failed to parse SSE data: {e}"),
                                    kind: ProviderErrorKind::Upstream,
                                });
                                break;
                            }
                        };

                        if let Some(delta) = parsed["choices"][0]["delta"]["content"].as_str() {
                            if !delta.is_empty() {
                                yield Ok(delta.to_string());
                            }
                        }
                    }
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) => break,
                    Some(Err(e)) => {
                        yield Err(stream_error(&provider_id, e));
                        break;
                    }
                }
            }
            es.close();
        };

        Ok(ProviderResponse {
            stream: Box::pin(stream),
            metadata: ProviderMetadata::new(self.id_str.clone(), self.model.clone()),
        })
    }
}
