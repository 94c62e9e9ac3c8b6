// src/core/mod.rs — Generation attempt pipeline

pub mod classifier;
pub mod clock;
pub mod ledger;
pub mod orchestrator;
pub mod pacing;
pub mod parser;
pub mod timeout;
pub mod types;
