//! Pairwise transfer-and-dedup engine.
//!
//! For an ordered (source, destination) pair the service uploads every source
//! photo the destination does not already have, optionally deleting the
//! source copy afterwards. `sync_all` repeats that over every ordered pair of
//! the configured endpoints, one pair at a time.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use log::{debug, error, info, warn};

use super::sync_model::{FailurePolicy, PairSyncSummary, SyncConfig, SyncRunSummary};
use crate::endpoints::Endpoint;
use crate::errors::Result;

/// Per-endpoint photo id sets, keyed by endpoint name.
type IdsByEndpoint = HashMap<String, HashSet<String>>;

#[derive(Default)]
struct SessionState {
    /// Ids transferred to each destination.
    handled: IdsByEndpoint,
    /// Ids moved (uploaded, then deleted from their source). A moved photo is
    /// not transferred again.
    moved: HashSet<String>,
}

/// Owns the handled set for one sync session.
///
/// The handled set records, per destination, the photo ids this service has
/// already transferred. It lives as long as the service and is only reset by
/// [`SyncService::clear_handled`].
pub struct SyncService {
    config: SyncConfig,
    state: Mutex<SessionState>,
}

impl SyncService {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            state: Mutex::new(SessionState::default()),
        }
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.config.failure_policy
    }

    /// Whether `photo_id` was handled for any destination.
    pub fn is_handled(&self, photo_id: &str) -> bool {
        self.state().handled.values().any(|ids| ids.contains(photo_id))
    }

    /// Whether `photo_id` was handled for `destination`.
    pub fn is_handled_for(&self, destination: &str, photo_id: &str) -> bool {
        contains(&self.state().handled, destination, photo_id)
    }

    /// Whether `photo_id` was moved off its source during this session.
    pub fn was_moved(&self, photo_id: &str) -> bool {
        self.state().moved.contains(photo_id)
    }

    pub fn handled_count(&self) -> usize {
        self.state().handled.values().map(HashSet::len).sum()
    }

    pub fn clear_handled(&self) {
        let mut state = self.state();
        state.handled.clear();
        state.moved.clear();
        info!("Cleared handled photo set");
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mark_handled(&self, destination: &str, photo_id: &str) {
        insert(&mut self.state().handled, destination, photo_id);
    }

    fn mark_moved(&self, photo_id: &str) {
        self.state().moved.insert(photo_id.to_string());
    }

    /// Single-pair mode: move photos from `source` to `destination`, deleting
    /// each source copy after it was uploaded.
    pub async fn sync_legacy(
        &self,
        source: &dyn Endpoint,
        destination: &dyn Endpoint,
    ) -> Result<PairSyncSummary> {
        self.sync_pair(source, destination, true).await
    }

    /// One directional pass from `source` to `destination`.
    ///
    /// Under [`FailurePolicy::FailFast`] the first upload error is returned
    /// and the remaining photos are left for the next run.
    pub async fn sync_pair(
        &self,
        source: &dyn Endpoint,
        destination: &dyn Endpoint,
        delete_from_source: bool,
    ) -> Result<PairSyncSummary> {
        let mut summary = PairSyncSummary::new(source.name(), destination.name());
        let delete_from_source = delete_from_source && source.capabilities().delete;

        let source_photos = source.photos().await?;
        let destination_ids: HashSet<String> = destination
            .photos()
            .await?
            .into_iter()
            .map(|photo| photo.id)
            .collect();

        info!(
            "Syncing {} -> {}: {} source photos, {} already on destination",
            source.name(),
            destination.name(),
            source_photos.len(),
            destination_ids.len()
        );

        for photo in &source_photos {
            if destination_ids.contains(&photo.id) {
                debug!("'{}' already present on {}", photo.id, destination.name());
                summary.skipped += 1;
                continue;
            }
            if self.is_handled_for(destination.name(), &photo.id) {
                debug!("'{}' already synced to {}", photo.id, destination.name());
                summary.skipped += 1;
                continue;
            }
            if self.was_moved(&photo.id) {
                debug!("'{}' was already moved this session", photo.id);
                summary.skipped += 1;
                continue;
            }

            let created_id = match destination.upload(photo).await {
                Ok(created_id) => created_id,
                Err(err) => match self.config.failure_policy {
                    FailurePolicy::FailFast => {
                        error!(
                            "Upload of '{}' to {} failed, aborting batch: {}",
                            photo.id,
                            destination.name(),
                            err
                        );
                        return Err(err);
                    }
                    FailurePolicy::IsolateAndContinue => {
                        error!(
                            "Upload of '{}' to {} failed: {}",
                            photo.id,
                            destination.name(),
                            err
                        );
                        summary.failed += 1;
                        continue;
                    }
                },
            };
            summary.uploaded += 1;
            info!(
                "Uploaded '{}' to {} as '{}'",
                photo.id,
                destination.name(),
                created_id
            );

            if delete_from_source {
                match photo.delete().await {
                    Ok(true) => {
                        summary.deleted += 1;
                        debug!("Deleted '{}' from {}", photo.id, source.name());
                    }
                    Ok(false) => {
                        summary.delete_failed += 1;
                        warn!("{} did not delete '{}'", source.name(), photo.id);
                    }
                    Err(err) => {
                        summary.delete_failed += 1;
                        warn!(
                            "Failed to delete '{}' from {}: {}",
                            photo.id,
                            source.name(),
                            err
                        );
                    }
                }
                self.mark_moved(&photo.id);
            }

            // Marked even when the delete failed so the next tick does not
            // upload a duplicate.
            self.mark_handled(destination.name(), &photo.id);
        }

        info!(
            "Sync {} -> {} finished: {} uploaded, {} skipped, {} failed",
            source.name(),
            destination.name(),
            summary.uploaded,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    /// n-way mode: every ordered pair (i != j) in enumeration order.
    ///
    /// Pairs whose destination cannot accept uploads are skipped.
    pub async fn sync_all(&self, endpoints: &[Arc<dyn Endpoint>]) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let mut pairs = Vec::new();

        for (i, source) in endpoints.iter().enumerate() {
            for (j, destination) in endpoints.iter().enumerate() {
                if i == j {
                    continue;
                }
                if !destination.capabilities().upload {
                    debug!(
                        "Skipping pair {} -> {}: destination is read-only",
                        source.name(),
                        destination.name()
                    );
                    continue;
                }

                match self
                    .sync_pair(
                        source.as_ref(),
                        destination.as_ref(),
                        self.config.delete_after_transfer,
                    )
                    .await
                {
                    Ok(summary) => pairs.push(summary),
                    Err(err) if self.config.failure_policy == FailurePolicy::FailFast => {
                        return Err(err);
                    }
                    Err(err) => {
                        error!(
                            "Pair {} -> {} failed: {}",
                            source.name(),
                            destination.name(),
                            err
                        );
                        let mut summary = PairSyncSummary::new(source.name(), destination.name());
                        summary.error = Some(err.to_string());
                        pairs.push(summary);
                    }
                }
            }
        }

        let run = SyncRunSummary {
            started_at,
            finished_at: Utc::now(),
            pairs,
        };
        info!(
            "Sync run completed: {} uploaded, {} failed across {} pairs",
            run.uploaded(),
            run.failed(),
            run.pairs.len()
        );
        Ok(run)
    }
}

fn contains(ids: &IdsByEndpoint, endpoint: &str, photo_id: &str) -> bool {
    ids.get(endpoint)
        .map(|ids| ids.contains(photo_id))
        .unwrap_or(false)
}

fn insert(ids: &mut IdsByEndpoint, endpoint: &str, photo_id: &str) {
    ids.entry(endpoint.to_string())
        .or_default()
        .insert(photo_id.to_string());
}

impl Default for SyncService {
    fn default() -> Self {
        Self::new(SyncConfig::default())
    }
}
