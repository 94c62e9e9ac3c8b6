// src/memory/store_server.rs — Async message passing for Store

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::core::ledger::AttemptStore;
use crate::core::types::{AttemptCompletion, AttemptRecord, ParsedModule};
use crate::memory::store::Store;

#[derive(Debug)]
pub enum StoreCommand {
    CountAttempts {
        plan_id: String,
        resp: oneshot::Sender<anyhow::Result<u32>>,
    },
    InsertAttempt {
        record: Box<AttemptRecord>,
        resp: oneshot::Sender<anyhow::Result<()>>,
    },
    CompleteAttempt {
        completion: Box<AttemptCompletion>,
        resp: oneshot::Sender<anyhow::Result<AttemptRecord>>,
    },
    ListAttempts {
        plan_id: String,
        resp: oneshot::Sender<anyhow::Result<Vec<AttemptRecord>>>,
    },
    PlanModules {
        plan_id: String,
        resp: oneshot::Sender<anyhow::Result<Vec<ParsedModule>>>,
    },
}

/// A handle to the Store that uses message passing.
#[derive(Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    pub fn new(tx: mpsc::Sender<StoreCommand>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl AttemptStore for StoreHandle {
    async fn count_attempts(&self, plan_id: &str) -> anyhow::Result<u32> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::CountAttempts {
                plan_id: plan_id.to_string(),
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    async fn insert_attempt(&self, record: &AttemptRecord) -> anyhow::Result<()> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::InsertAttempt {
                record: Box::new(record.clone()),
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    async fn complete_attempt(
        &self,
        completion: &AttemptCompletion,
    ) -> anyhow::Result<AttemptRecord> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::CompleteAttempt {
                completion: Box::new(completion.clone()),
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    async fn list_attempts(&self, plan_id: &str) -> anyhow::Result<Vec<AttemptRecord>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::ListAttempts {
                plan_id: plan_id.to_string(),
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }

    async fn plan_modules(&self, plan_id: &str) -> anyhow::Result<Vec<ParsedModule>> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(StoreCommand::PlanModules {
                plan_id: plan_id.to_string(),
                resp: resp_tx,
            })
            .await?;
        resp_rx.await?
    }
}

/// Spawn the store server task.
pub fn spawn_store_server(store: Store) -> (StoreHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(100);
    let handle = StoreHandle::new(tx);
    let join_handle = tokio::spawn(run_store_server(store, rx));
    (handle, join_handle)
}

/// The background task that owns the Store.
pub async fn run_store_server(store: Store, mut rx: mpsc::Receiver<StoreCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::CountAttempts { plan_id, resp } => {
                let _ = resp.send(store.count_attempts(&plan_id));
            }
            StoreCommand::InsertAttempt { record, resp } => {
                let _ = resp.send(store.insert_attempt(&record));
            }
            StoreCommand::CompleteAttempt { completion, resp } => {
                let _ = resp.send(store.complete_attempt(&completion));
            }
            StoreCommand::ListAttempts { plan_id, resp } => {
                let _ = resp.send(store.list_attempts(&plan_id));
            }
            StoreCommand::PlanModules { plan_id, resp } => {
                let _ = resp.send(store.plan_modules(&plan_id));
            }
        }
    }
    tracing::debug!("store server stopped");
}
