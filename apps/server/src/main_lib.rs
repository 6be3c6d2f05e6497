use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use framesync_cloud::{CloudApiClient, CloudConfig, CloudEndpoint};
use framesync_core::scheduler::SyncTask;
use framesync_core::secrets::SecretStore;
use framesync_core::sync::SyncRunSummary;
use framesync_core::{Endpoint, Result, SyncConfig, SyncService};
use framesync_frame_tv::{FrameTvConfig, FrameTvEndpoint};

use crate::challenge::stdin_resolver;
use crate::config::{Config, SyncMode};
use crate::secrets::FileSecretStore;

/// Installs the global subscriber. `log` records from the library crates are
/// forwarded into it as tracing events.
pub fn init_tracing(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if log_format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }
}

/// The configured endpoints and the service that moves photos between them.
pub struct SyncApp {
    service: SyncService,
    mode: SyncMode,
    source: Arc<dyn Endpoint>,
    sink: Arc<dyn Endpoint>,
}

impl SyncApp {
    pub fn new(
        service: SyncService,
        mode: SyncMode,
        source: Arc<dyn Endpoint>,
        sink: Arc<dyn Endpoint>,
    ) -> Self {
        Self {
            service,
            mode,
            source,
            sink,
        }
    }

    fn endpoints(&self) -> Vec<Arc<dyn Endpoint>> {
        vec![self.source.clone(), self.sink.clone()]
    }

    pub async fn initialize(&self) -> Result<()> {
        for endpoint in self.endpoints() {
            endpoint.initialize().await?;
            tracing::info!("Endpoint {} initialized", endpoint.name());
        }
        Ok(())
    }

    /// One synchronization pass in the configured mode.
    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let summary = match self.mode {
            SyncMode::Legacy => {
                let started_at = Utc::now();
                let pair = self
                    .service
                    .sync_legacy(self.source.as_ref(), self.sink.as_ref())
                    .await?;
                SyncRunSummary {
                    started_at,
                    finished_at: Utc::now(),
                    pairs: vec![pair],
                }
            }
            SyncMode::NWay => self.service.sync_all(&self.endpoints()).await?,
        };

        tracing::info!(
            "Sync run finished: {} uploaded, {} failed",
            summary.uploaded(),
            summary.failed()
        );
        for pair in &summary.pairs {
            tracing::debug!(
                "{} -> {}: uploaded={} skipped={} failed={} deleted={} delete_failed={}",
                pair.source,
                pair.destination,
                pair.uploaded,
                pair.skipped,
                pair.failed,
                pair.deleted,
                pair.delete_failed
            );
        }
        Ok(summary)
    }

    /// Scheduler work unit running [`SyncApp::run_once`].
    pub fn task(self: Arc<Self>) -> SyncTask {
        Arc::new(move || {
            let app = self.clone();
            async move { app.run_once().await.map(|_| ()) }.boxed()
        })
    }

    pub async fn close(&self) {
        for endpoint in self.endpoints() {
            if let Err(e) = endpoint.close().await {
                tracing::warn!("Closing {} failed: {}", endpoint.name(), e);
            }
        }
    }
}

/// Wires the cloud source and the Frame TV sink from `config`.
pub fn build_app(config: &Config) -> Result<Arc<SyncApp>> {
    let secrets: Arc<dyn SecretStore> = Arc::new(FileSecretStore::new(config.secret_file.clone()));
    tracing::info!("Secret file in use: {}", config.secret_file.display());

    let api = CloudApiClient::new(&config.cloud_api_url, &config.cloud_token)?;
    let cloud = CloudEndpoint::new(CloudConfig::new(&config.cloud_album), Arc::new(api))
        .with_challenge_resolver(stdin_resolver());

    let tv_config = FrameTvConfig {
        name: config.tv_name.clone(),
        trust: config.tv_trust,
        ..FrameTvConfig::new(&config.tv_host)
    };
    let tv = FrameTvEndpoint::new(tv_config, secrets);

    let service = SyncService::new(SyncConfig {
        failure_policy: config.failure_policy,
        delete_after_transfer: config.delete_after_transfer,
    });
    tracing::info!(
        "Sync mode {:?}, failure policy {}, interval {} s",
        config.sync_mode,
        config.failure_policy,
        config.sync_interval_secs
    );

    Ok(Arc::new(SyncApp::new(
        service,
        config.sync_mode,
        Arc::new(cloud),
        Arc::new(tv),
    )))
}
