// tests/common/mod.rs — Shared fixtures: scripted providers and stores

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use plancraft::core::clock::{Clock, FixedClock};
use plancraft::core::ledger::{AttemptLedger, AttemptStore};
use plancraft::core::orchestrator::GenerationOrchestrator;
use plancraft::core::timeout::TimeoutConfig;
use plancraft::core::types::{AttemptCompletion, AttemptRecord, GenerationInput, ParsedModule};
use plancraft::infra::errors::PlanError;
use plancraft::memory::{MemoryManager, StoreHandle};
use plancraft::provider::{GenerateOptions, PlanProvider, ProviderMetadata, ProviderResponse};

/// What a scripted provider does when called.
#[derive(Clone)]
pub enum Script {
    /// Reject the call itself.
    Reject(fn() -> PlanError),
    /// Yield each fragment after its delay.
    Fragments(Vec<(u64, String)>),
    /// Open a stream that never produces anything.
    Hang,
}

pub struct ScriptedProvider {
    script: Script,
    calls: AtomicUsize,
    seen: Mutex<Vec<(GenerationInput, GenerateOptions)>>,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Input and options from the most recent call.
    pub fn last_call(&self) -> Option<(GenerationInput, GenerateOptions)> {
        self.seen.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PlanProvider for ScriptedProvider {
    fn id(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        input: &GenerationInput,
        options: GenerateOptions,
    ) -> Result<ProviderResponse, PlanError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .push((input.clone(), options.clone()));

        let stream: plancraft::provider::FragmentStream = match &self.script {
            Script::Reject(make) => return Err(make()),
            Script::Fragments(fragments) => {
                let fragments = fragments.clone();
                Box::pin(async_stream::stream! {
                    for (delay_ms, fragment) in fragments {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        yield Ok(fragment);
                    }
                })
            }
            Script::Hang => Box::pin(futures::stream::pending()),
        };

        Ok(ProviderResponse {
            stream,
            metadata: ProviderMetadata::new("scripted", "script-1"),
        })
    }
}

/// Split a plan document so the first module closes in the first fragment.
pub fn two_module_fragments(first_at_ms: u64, rest_after_ms: u64) -> Vec<(u64, String)> {
    vec![
        (
            first_at_ms,
            r#"{"modules":[{"title":"A","description":"first","tasks":[{"title":"a1","estimatedMinutes":30}]}"#
                .to_string(),
        ),
        (
            rest_after_ms,
            r#",{"title":"B","tasks":[{"title":"b1","estimatedMinutes":30},{"title":"b2","estimatedMinutes":30}]}]}"#
                .to_string(),
        ),
    ]
}

pub fn short_timeout() -> TimeoutConfig {
    TimeoutConfig {
        base_ms: 1_000,
        extension_ms: 500,
        extension_threshold_ms: 300,
    }
}

pub fn clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock::on(2024, 1, 1).unwrap())
}

pub fn sqlite_store() -> StoreHandle {
    MemoryManager::in_memory().unwrap().spawn()
}

pub fn orchestrator_with(
    provider: Arc<ScriptedProvider>,
    store: Arc<dyn AttemptStore>,
    cap: u32,
) -> GenerationOrchestrator {
    let clock = clock();
    let ledger = AttemptLedger::new(store, clock.clone(), cap);
    GenerationOrchestrator::new(provider, ledger, short_timeout(), clock)
}

/// Store whose writes can be made to fail.
pub struct FlakyStore {
    pub inner: StoreHandle,
    pub fail_count: bool,
    pub fail_complete: bool,
}

#[async_trait]
impl AttemptStore for FlakyStore {
    async fn count_attempts(&self, plan_id: &str) -> anyhow::Result<u32> {
        if self.fail_count {
            anyhow::bail!("database is locked");
        }
        self.inner.count_attempts(plan_id).await
    }

    async fn insert_attempt(&self, record: &AttemptRecord) -> anyhow::Result<()> {
        self.inner.insert_attempt(record).await
    }

    async fn complete_attempt(
        &self,
        completion: &AttemptCompletion,
    ) -> anyhow::Result<AttemptRecord> {
        if self.fail_complete {
            anyhow::bail!("disk I/O error");
        }
        self.inner.complete_attempt(completion).await
    }

    async fn list_attempts(&self, plan_id: &str) -> anyhow::Result<Vec<AttemptRecord>> {
        self.inner.list_attempts(plan_id).await
    }

    async fn plan_modules(&self, plan_id: &str) -> anyhow::Result<Vec<ParsedModule>> {
        self.inner.plan_modules(plan_id).await
    }
}
