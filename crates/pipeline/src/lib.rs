//! Ingestion pipeline: the scheduled, vendor-aware, politeness-constrained
//! path from civic-tech platforms into the relational store.
//!
//! The [`conductor::Conductor`] daemon owns two loops: a full-sync loop
//! driving the [`fetcher::Fetcher`] across all active cities, and a
//! queue-drain loop handing pending jobs to the external
//! [`processor::SummarizationProcessor`]. Each fetched meeting flows
//! through the [`orchestrator::MeetingSyncOrchestrator`] inside one
//! transaction.

pub mod conductor;
pub mod fetcher;
pub mod llm_limit;
pub mod orchestrator;
pub mod processor;
pub mod shutdown;

pub use conductor::{Conductor, SyncStatusReport};
pub use fetcher::{Fetcher, RetryPolicy, SyncResult, SyncStatus};
pub use orchestrator::{MeetingSyncOrchestrator, StorageStats};
pub use processor::{ProcessorOutput, SummarizationProcessor};
pub use shutdown::ShutdownFlag;
