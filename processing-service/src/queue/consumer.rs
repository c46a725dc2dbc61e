use futures::stream::{self, StreamExt};
use shared::storage::SharedStore;
use shared::types::report::IMAGE_PREFIX;
use shared::{image_id_from_key, report_key_for, ServiceResult};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::pipeline::{Pipeline, ProcessOutcome};

/// Polls the store for new images and feeds them through the pipeline
///
/// A key is remembered once its report check succeeds, and for as long as it
/// stays listed, whether processing succeeds or fails. A failed image is only
/// retried through `POST /process` or after a restart.
pub struct StoreConsumer {
    store: SharedStore,
    pipeline: Arc<Pipeline>,
    interval: Duration,
    max_concurrent: usize,
    seen: Mutex<HashSet<String>>,
}

impl StoreConsumer {
    pub fn new(
        store: SharedStore,
        pipeline: Arc<Pipeline>,
        interval: Duration,
        max_concurrent: usize,
    ) -> Self {
        Self {
            store,
            pipeline,
            interval,
            max_concurrent: max_concurrent.max(1),
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Claim every image key that has not been seen and has no report yet.
    ///
    /// A key whose report check fails stays unclaimed and is retried on the
    /// next pass. Keys that drop out of the listing are forgotten.
    async fn claim_pending(&self) -> ServiceResult<Vec<String>> {
        let keys = self.store.list_keys(IMAGE_PREFIX).await?;
        let listed: HashSet<&str> = keys.iter().map(String::as_str).collect();
        self.seen
            .lock()
            .await
            .retain(|key| listed.contains(key.as_str()));

        let mut pending = Vec::new();
        for key in &keys {
            if image_id_from_key(key).is_none() || self.seen.lock().await.contains(key) {
                continue;
            }

            match self.store.exists(&report_key_for(key)).await {
                Ok(has_report) => {
                    self.seen.lock().await.insert(key.clone());
                    if !has_report {
                        pending.push(key.clone());
                    }
                }
                Err(e) => warn!(image_key = %key, "Report check failed, retrying next scan: {}", e),
            }
        }

        Ok(pending)
    }

    /// Run one listing pass. Returns the number of reports written.
    pub async fn scan_once(&self) -> ServiceResult<usize> {
        let pending = self.claim_pending().await?;
        if pending.is_empty() {
            return Ok(0);
        }

        info!("Found {} unprocessed image(s)", pending.len());

        let results: Vec<bool> = stream::iter(pending)
            .map(|key| {
                let pipeline = self.pipeline.clone();
                async move {
                    match pipeline.process(&key).await {
                        Ok(ProcessOutcome::Written(_)) => true,
                        Ok(ProcessOutcome::AlreadyProcessed) => false,
                        Err(e) => {
                            error!("Failed to process {}: {}", key, e);
                            false
                        }
                    }
                }
            })
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        Ok(results.into_iter().filter(|written| *written).count())
    }

    /// Scan forever at the configured interval.
    pub async fn run(self: Arc<Self>) {
        info!(
            "Starting store consumer: interval={:?}, max_concurrent={}",
            self.interval, self.max_concurrent
        );

        loop {
            match self.scan_once().await {
                Ok(0) => debug!("No new images"),
                Ok(written) => info!("Scan wrote {} report(s)", written),
                Err(e) => warn!("Store scan failed: {}", e),
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}
