//! Sync module - pairwise transfer, dedup and n-way orchestration.

mod sync_model;
mod sync_service;

pub use sync_model::{FailurePolicy, PairSyncSummary, SyncConfig, SyncRunSummary};
pub use sync_service::SyncService;
