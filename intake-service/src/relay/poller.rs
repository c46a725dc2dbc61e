use std::time::Duration;

use shared::storage::SharedStore;
use shared::{report_key_for, Report, ServiceError, ServiceResult};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Ready(Report),
    Exhausted { attempts: u32 },
}

/// Fixed-interval poll for the report matching an uploaded image
#[derive(Clone)]
pub struct ReportPoller {
    store: SharedStore,
    max_attempts: u32,
    interval: Duration,
}

impl ReportPoller {
    pub fn new(store: SharedStore, max_attempts: u32, interval: Duration) -> Self {
        Self {
            store,
            max_attempts,
            interval,
        }
    }

    /// Returns the first report carrying analysis text, or `Exhausted` after
    /// `max_attempts` reads. Authentication failures end the loop early.
    pub async fn wait_for_report(&self, image_key: &str) -> ServiceResult<PollOutcome> {
        let report_key = report_key_for(image_key);

        for attempt in 1..=self.max_attempts {
            match self.store.get_object(&report_key).await {
                Ok(data) => match Report::from_bytes(&data) {
                    Ok(report) if report.has_analysis() => {
                        info!(report_key = %report_key, attempt, "Report ready");
                        return Ok(PollOutcome::Ready(report));
                    }
                    Ok(_) => debug!(report_key = %report_key, attempt, "Report has no analysis yet"),
                    Err(e) => warn!(report_key = %report_key, attempt, "Unreadable report: {}", e),
                },
                Err(e) if e.is_not_found() => {
                    debug!(report_key = %report_key, attempt, "Report not available yet")
                }
                Err(e @ ServiceError::Authentication(_)) => return Err(e),
                Err(e) => warn!(report_key = %report_key, attempt, "Report poll failed: {}", e),
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        info!(report_key = %report_key, attempts = self.max_attempts, "Gave up waiting for report");
        Ok(PollOutcome::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use shared::storage::{MemoryStore, ObjectStore};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Counts reads and optionally fails them
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        reads: AtomicU32,
        fail_with_auth: bool,
        fail_with_timeout: bool,
        // Report becomes visible from this read onward
        appears_on_read: Option<u32>,
    }

    #[async_trait]
    impl ObjectStore for CountingStore {
        async fn ensure_container(&self) -> ServiceResult<()> {
            Ok(())
        }

        async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> ServiceResult<()> {
            self.inner.put_object(key, data, content_type).await
        }

        async fn create_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> ServiceResult<()> {
            self.inner.create_object(key, data, content_type).await
        }

        async fn get_object(&self, key: &str) -> ServiceResult<Vec<u8>> {
            let read = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_with_auth {
                return Err(ServiceError::Authentication("expired SAS".to_string()));
            }
            if self.fail_with_timeout {
                return Err(ServiceError::Timeout("blob read timed out".to_string()));
            }
            if let Some(n) = self.appears_on_read {
                if read < n {
                    return Err(ServiceError::NotFound(key.to_string()));
                }
            }
            self.inner.get_object(key).await
        }

        async fn exists(&self, key: &str) -> ServiceResult<bool> {
            self.inner.exists(key).await
        }

        async fn list_keys(&self, prefix: &str) -> ServiceResult<Vec<String>> {
            self.inner.list_keys(prefix).await
        }
    }

    fn report_bytes(analysis: &str) -> Vec<u8> {
        Report::new("images/abc", "ocr".to_string(), analysis.to_string())
            .to_bytes()
            .unwrap()
    }

    #[tokio::test]
    async fn test_existing_report_returned_on_first_attempt() {
        let store = Arc::new(CountingStore::default());
        store
            .put_object("reports/abc.json", report_bytes("not sensitive"), "application/json")
            .await
            .unwrap();

        let poller = ReportPoller::new(store.clone(), 5, Duration::from_secs(60));
        let outcome = poller.wait_for_report("images/abc").await.unwrap();

        match outcome {
            PollOutcome::Ready(report) => assert_eq!(report.security_analysis, "not sensitive"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_report_exhausts_exactly_n_attempts() {
        let store = Arc::new(CountingStore::default());
        let poller = ReportPoller::new(store.clone(), 4, Duration::from_millis(1));

        let outcome = poller.wait_for_report("images/abc").await.unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 4 });
        assert_eq!(store.reads.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_report_appearing_later_is_picked_up() {
        let store = Arc::new(CountingStore {
            appears_on_read: Some(3),
            ..Default::default()
        });
        store
            .put_object("reports/abc.json", report_bytes("sensitive"), "application/json")
            .await
            .unwrap();

        let poller = ReportPoller::new(store.clone(), 10, Duration::from_millis(1));
        let outcome = poller.wait_for_report("images/abc").await.unwrap();

        assert!(matches!(outcome, PollOutcome::Ready(_)));
        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_empty_analysis_keeps_polling() {
        let store = Arc::new(CountingStore::default());
        store
            .put_object("reports/abc.json", report_bytes(""), "application/json")
            .await
            .unwrap();

        let poller = ReportPoller::new(store.clone(), 3, Duration::from_millis(1));
        let outcome = poller.wait_for_report("images/abc").await.unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 3 });
    }

    #[tokio::test]
    async fn test_malformed_report_keeps_polling() {
        let store = Arc::new(CountingStore::default());
        store
            .put_object("reports/abc.json", b"not json".to_vec(), "application/json")
            .await
            .unwrap();

        let poller = ReportPoller::new(store.clone(), 2, Duration::from_millis(1));
        let outcome = poller.wait_for_report("images/abc").await.unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 2 });
        assert_eq!(store.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_authentication_failure_stops_polling() {
        let store = Arc::new(CountingStore {
            fail_with_auth: true,
            ..Default::default()
        });

        let poller = ReportPoller::new(store.clone(), 10, Duration::from_millis(1));
        let err = poller.wait_for_report("images/abc").await.unwrap_err();

        assert!(matches!(err, ServiceError::Authentication(_)));
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_use_up_attempts() {
        let store = Arc::new(CountingStore {
            fail_with_timeout: true,
            ..Default::default()
        });

        let poller = ReportPoller::new(store.clone(), 4, Duration::from_millis(1));
        let outcome = poller.wait_for_report("images/abc").await.unwrap();

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 4 });
        assert_eq!(store.reads.load(Ordering::SeqCst), 4);
    }
}
