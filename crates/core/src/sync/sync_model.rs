//! Sync configuration and run summaries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What to do when a single photo fails to transfer.
///
/// `IsolateAndContinue` is the default; `FailFast` matches the single-pair
/// mode where the whole batch is retried on the next tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// The first upload or download error aborts the remaining batch.
    FailFast,
    /// Log the failure, count it, continue with the next photo.
    #[default]
    IsolateAndContinue,
}

impl std::str::FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail-fast" | "fail_fast" | "failfast" => Ok(Self::FailFast),
            "isolate" | "isolate-and-continue" | "isolate_and_continue" => {
                Ok(Self::IsolateAndContinue)
            }
            other => Err(format!("unknown failure policy '{}'", other)),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::FailFast => write!(f, "fail-fast"),
            FailurePolicy::IsolateAndContinue => write!(f, "isolate-and-continue"),
        }
    }
}

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub failure_policy: FailurePolicy,
    /// Delete the source copy after a successful upload during n-way runs.
    /// The single-pair legacy mode always deletes.
    pub delete_after_transfer: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            delete_after_transfer: false,
        }
    }
}

/// Outcome of one directional pass between two endpoints.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PairSyncSummary {
    pub source: String,
    pub destination: String,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub deleted: usize,
    pub delete_failed: usize,
    /// Set when the pass could not run at all (listing failed).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PairSyncSummary {
    pub fn new(source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            ..Default::default()
        }
    }
}

/// Outcome of one scheduler tick across all endpoint pairs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pairs: Vec<PairSyncSummary>,
}

impl SyncRunSummary {
    pub fn uploaded(&self) -> usize {
        self.pairs.iter().map(|p| p.uploaded).sum()
    }

    pub fn failed(&self) -> usize {
        self.pairs.iter().map(|p| p.failed).sum()
    }

    pub fn success(&self) -> bool {
        self.pairs.iter().all(|p| p.failed == 0 && p.error.is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_config_default() {
        let config = SyncConfig::default();
        assert_eq!(config.failure_policy, FailurePolicy::IsolateAndContinue);
        assert!(!config.delete_after_transfer);
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("fail-fast".parse::<FailurePolicy>(), Ok(FailurePolicy::FailFast));
        assert_eq!(
            "Isolate".parse::<FailurePolicy>(),
            Ok(FailurePolicy::IsolateAndContinue)
        );
        assert!("retry".parse::<FailurePolicy>().is_err());
    }
}
