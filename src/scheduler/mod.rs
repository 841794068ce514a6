//! Scheduler module for running probe cycles.

use crate::config::{load_endpoints, ConfigError};
use crate::db::{CheckResult, Endpoint, LogStore, StoreError};
use crate::probe::Prober;

use chrono::{DateTime, SubsecRound, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, Semaphore};
use tokio::task::JoinHandle;

/// Errors that abort a single cycle.
#[derive(Error, Debug)]
pub enum CycleError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub timestamp: DateTime<Utc>,
    pub logged: usize,
    pub total: usize,
}

/// Runs a probe cycle on startup and then once per interval.
pub struct Scheduler {
    store: Arc<LogStore>,
    prober: Prober,
    config_path: PathBuf,
    interval: Duration,
    stop: Mutex<Option<broadcast::Sender<()>>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<LogStore>,
        prober: Prober,
        config_path: PathBuf,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            prober,
            config_path,
            interval,
            stop: Mutex::new(None),
        }
    }

    /// Start the background loop. The first cycle runs immediately.
    ///
    /// A tick that fires while the previous cycle is still running is skipped.
    /// After a stop the returned task finishes only once the running cycle has.
    pub async fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let (tx, mut rx) = broadcast::channel(1);
        *self.stop.lock().await = Some(tx);

        let scheduler = self.clone();
        tokio::spawn(async move {
            tracing::info!(
                "Scheduler started: every {}s, timeout {}ms",
                scheduler.interval.as_secs(),
                scheduler.prober.timeout().as_millis()
            );

            let busy = Arc::new(Semaphore::new(1));
            let mut interval = tokio::time::interval(scheduler.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = rx.recv() => break,
                    _ = interval.tick() => {
                        let permit = match busy.clone().try_acquire_owned() {
                            Ok(p) => p,
                            Err(_) => {
                                tracing::warn!("Skipping tick, previous cycle still running");
                                continue;
                            }
                        };

                        let scheduler = scheduler.clone();
                        tokio::spawn(async move {
                            let _permit = permit; // Hold permit until done
                            if let Err(e) = scheduler.run_cycle().await {
                                tracing::error!("Cycle failed: {}", e);
                            }
                        });
                    }
                }
            }

            if busy.available_permits() == 0 {
                tracing::info!("Waiting for running cycle to finish");
            }
            let _ = busy.acquire().await;

            tracing::info!("Scheduler stopped");
        })
    }

    /// Stop the background loop. No new cycle starts after this.
    pub async fn stop(&self) {
        let stop = self.stop.lock().await;
        if let Some(tx) = stop.as_ref() {
            let _ = tx.send(());
        }
    }

    /// Probe every configured endpoint once and append the batch.
    ///
    /// The endpoint list is re-read each cycle. If it cannot be read the
    /// stored logs are left alone.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let endpoints = load_endpoints(&self.config_path)?;
        let timestamp = Utc::now().trunc_subsecs(3);

        let batch = probe_all(&self.prober, &endpoints, timestamp).await;
        let total = match self.store.append_batch(&batch) {
            Ok(total) => total,
            Err(e) => {
                tracing::error!(
                    "Failed to persist {} results, keeping them in memory until the next write: {}",
                    batch.len(),
                    e
                );
                return Err(e.into());
            }
        };

        tracing::info!("Logged {} results. Total logs: {}", batch.len(), total);

        Ok(CycleReport {
            timestamp,
            logged: batch.len(),
            total,
        })
    }
}

/// Probe endpoints concurrently, returning results in endpoint order.
pub async fn probe_all(
    prober: &Prober,
    endpoints: &[Endpoint],
    timestamp: DateTime<Utc>,
) -> Vec<CheckResult> {
    let handles: Vec<_> = endpoints
        .iter()
        .cloned()
        .map(|endpoint| {
            let prober = prober.clone();
            tokio::spawn(async move { prober.probe(&endpoint, timestamp).await })
        })
        .collect();

    let mut results = Vec::with_capacity(endpoints.len());
    for (endpoint, handle) in endpoints.iter().zip(handles) {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                let message = format!("probe task failed: {}", e);
                CheckResult::failed(endpoint, timestamp, 0, 0, message)
            }
        };

        if result.success {
            tracing::info!(
                "ok {} - {} ({}ms)",
                result.url,
                result.status,
                result.response_time
            );
        } else {
            tracing::warn!(
                "failed {} - {} ({}ms)",
                result.url,
                result.message,
                result.response_time
            );
        }
        results.push(result);
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DEFAULT_CAPACITY;
    use crate::probe::SuccessPolicy;
    use crate::query::{compute_endpoint_stats, LastStatus};
    use tempfile::TempDir;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write_config(dir: &TempDir, endpoints: &[(&str, Option<&str>)]) -> PathBuf {
        let list: Vec<_> = endpoints
            .iter()
            .map(|(url, name)| Endpoint::new(url, *name))
            .collect();
        let path = dir.path().join("config.json");
        std::fs::write(&path, serde_json::json!({ "endpoints": list }).to_string()).unwrap();
        path
    }

    fn scheduler(dir: &TempDir, config_path: PathBuf, timeout: Duration) -> Arc<Scheduler> {
        scheduler_every(dir, config_path, timeout, Duration::from_secs(3600))
    }

    fn scheduler_every(
        dir: &TempDir,
        config_path: PathBuf,
        timeout: Duration,
        interval: Duration,
    ) -> Arc<Scheduler> {
        let store = Arc::new(LogStore::open(dir.path().join("logs.json"), DEFAULT_CAPACITY));
        let prober = Prober::new(timeout, SuccessPolicy::AnyResponse).unwrap();
        Arc::new(Scheduler::new(store, prober, config_path, interval))
    }

    async fn server_with_delay(delay: Duration) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(delay))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_stop_waits_for_running_cycle() {
        let server = server_with_delay(Duration::from_millis(800)).await;
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, &[(server.uri().as_str(), None)]);
        let scheduler = scheduler(&dir, config, Duration::from_secs(5));

        let handle = scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        // The in-flight cycle landed before the task finished, and nothing follows it.
        assert_eq!(scheduler.store.len(), 1);
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(scheduler.store.len(), 1);
    }

    #[tokio::test]
    async fn test_ticks_during_running_cycle_are_skipped() {
        let server = server_with_delay(Duration::from_millis(450)).await;
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, &[(server.uri().as_str(), None)]);
        let scheduler = scheduler_every(
            &dir,
            config,
            Duration::from_secs(5),
            Duration::from_millis(100),
        );

        let handle = scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(1200)).await;
        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();

        // At a 100ms interval, queued or concurrent ticks would send about a dozen requests.
        let requests = server.received_requests().await.unwrap();
        assert!((2..=3).contains(&requests.len()), "got {} requests", requests.len());
        assert_eq!(scheduler.store.len(), requests.len());

        // Each cycle starts only after the previous one finished.
        let logs = scheduler.store.load_all();
        for pair in logs.windows(2) {
            let gap = pair[1].timestamp - pair[0].timestamp;
            assert!(gap >= chrono::Duration::milliseconds(400), "gap {:?}", gap);
        }
    }

    #[tokio::test]
    async fn test_zero_endpoints_logs_nothing() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, &[]);
        let scheduler = scheduler(&dir, config, Duration::from_secs(1));

        let report = scheduler.run_cycle().await.unwrap();
        assert_eq!(report.logged, 0);
        assert_eq!(report.total, 0);
        assert!(scheduler.store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_config_leaves_logs_untouched() {
        let dir = TempDir::new().unwrap();
        let scheduler = scheduler(&dir, dir.path().join("missing.json"), Duration::from_secs(1));

        let result = scheduler.run_cycle().await;
        assert!(matches!(result, Err(CycleError::Config(_))));
        assert!(scheduler.store.is_empty());
        assert!(!dir.path().join("logs.json").exists());
    }

    #[tokio::test]
    async fn test_batch_keeps_config_order_and_shared_timestamp() {
        let fast = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&fast)
            .await;
        let slow = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_millis(150)))
            .mount(&slow)
            .await;

        let dir = TempDir::new().unwrap();
        let config = write_config(
            &dir,
            &[
                (slow.uri().as_str(), Some("Slow")),
                ("not a url", None),
                (fast.uri().as_str(), Some("Fast")),
            ],
        );
        let scheduler = scheduler(&dir, config, Duration::from_secs(2));

        let report = scheduler.run_cycle().await.unwrap();
        // The invalid address is dropped when the config is loaded.
        assert_eq!(report.logged, 2);

        let logs = scheduler.store.load_all();
        assert_eq!(logs[0].name, "Slow");
        assert_eq!(logs[0].status, 204);
        assert_eq!(logs[1].name, "Fast");
        assert!(logs.iter().all(|r| r.timestamp == report.timestamp));
    }

    #[tokio::test]
    async fn test_timeout_then_recovery_scenario() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, &[(server.uri().as_str(), Some("A"))]);
        let scheduler = scheduler(&dir, config, Duration::from_millis(300));

        for _ in 0..3 {
            scheduler.run_cycle().await.unwrap();
        }

        let logs = scheduler.store.load_all();
        let outcomes: Vec<bool> = logs.iter().map(|r| r.success).collect();
        assert_eq!(outcomes, vec![false, true, true]);
        assert!(logs.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(logs[0].status, 0);

        let stats = compute_endpoint_stats(&logs, &Endpoint::new(server.uri().as_str(), Some("A")));
        assert_eq!(stats.total_pings, 3);
        assert_eq!(stats.success_pings, 2);
        assert_eq!(stats.error_pings, 1);
        assert_eq!(stats.success_rate, 67);
        assert_eq!(stats.last_status, LastStatus::Healthy);
    }

    #[tokio::test]
    async fn test_start_runs_immediately_and_stops() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, &[(server.uri().as_str(), None)]);
        let scheduler = scheduler(&dir, config, Duration::from_secs(2));

        let handle = scheduler.start().await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while scheduler.store.is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        scheduler.stop().await;
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
        assert_eq!(scheduler.store.len(), 1);
    }
}
