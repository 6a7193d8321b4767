//! The poll loop driver: one owner for the whole fetch/decode/reconcile
//! pipeline and the metric cache.

use std::sync::Arc;
use std::time::Duration;

use prometheus::Registry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ConfigSource, ExporterConfig};
use crate::decode;
use crate::error::FetchError;
use crate::fetch::Fetcher;
use crate::reconcile::{self, MetricCache, ReconcileSummary};
use crate::record::RecordBatch;

/// Backoff applied when configuration load or a cycle fails outright, so a
/// broken control plane is retried instead of busy-looped.
const CYCLE_RETRY_DELAY: Duration = Duration::from_secs(5);

pub struct Poller {
    config_source: Arc<dyn ConfigSource>,
    fetcher: Fetcher,
    registry: Registry,
    cache: MetricCache,
    cancel: CancellationToken,
}

impl Poller {
    pub fn new(
        config_source: Arc<dyn ConfigSource>,
        fetcher: Fetcher,
        registry: Registry,
        cache: MetricCache,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config_source,
            fetcher,
            registry,
            cache,
            cancel,
        }
    }

    pub fn cache(&self) -> &MetricCache {
        &self.cache
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs cycles until the token cancels. Configuration is loaded before
    /// the first cycle and, when `reload_each_cycle` is set, before every
    /// subsequent one.
    pub async fn run(mut self) {
        let mut config: Option<ExporterConfig> = None;
        while !self.cancel.is_cancelled() {
            let needs_load = match &config {
                None => true,
                Some(current) => current.reload_each_cycle,
            };
            if needs_load {
                match self.config_source.load() {
                    Ok(loaded) => config = Some(loaded),
                    Err(err) => {
                        error!(error = %err, "configuration load failed");
                        if !self.pause(CYCLE_RETRY_DELAY).await {
                            break;
                        }
                        continue;
                    }
                }
            }
            let Some(current) = config.clone() else {
                continue;
            };

            match self.run_cycle(&current).await {
                Ok(_) => {}
                Err(FetchError::Cancelled) => break,
                Err(err) => {
                    error!(error = %err, "poll cycle failed");
                    if !self.pause(CYCLE_RETRY_DELAY).await {
                        break;
                    }
                    continue;
                }
            }

            if !self.pause(current.polling_interval()).await {
                break;
            }
        }
        info!("poll loop stopped");
    }

    /// One full resolve -> fetch -> decode -> reconcile pass. Reconciliation
    /// only ever sees a fully decoded batch; a decode failure is downgraded
    /// to an empty one.
    pub async fn run_cycle(
        &mut self,
        config: &ExporterConfig,
    ) -> Result<ReconcileSummary, FetchError> {
        let payload = self.fetcher.fetch(config).await?;
        let batch = match decode::decode(&payload, config) {
            Ok(batch) => batch,
            Err(err) => {
                warn!(error = %err, "payload decode failed, applying empty batch");
                RecordBatch::empty()
            }
        };
        let summary = reconcile::reconcile(
            &mut self.cache,
            &self.registry,
            &config.provider.name,
            &batch,
        );
        info!(
            created = summary.created,
            updated = summary.updated,
            skipped = summary.skipped,
            series = self.cache.len(),
            "reconciled record batch"
        );
        Ok(summary)
    }

    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
