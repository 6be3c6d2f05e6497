//! Scheduler module - periodic driver with run exclusion.

mod scheduler_service;

pub use scheduler_service::{SyncScheduler, SyncTask};

#[cfg(test)]
mod scheduler_service_tests;
