//! Background reverse-geocoding of clock-in/out coordinates.
//!
//! Jobs go into one bounded queue drained by a fixed set of workers. All
//! workers wait on the same [`RateLimiter`], so the external lookup service
//! sees at most one call per interval no matter how many workers run.
//! Enrichment is best-effort: a full queue drops the job, an empty lookup
//! result is skipped, and nothing here is ever reported to the clock caller.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::store::{AddressColumn, AttendanceStore};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeocodeJob {
    pub attendance_id: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub is_checkout: bool,
}

impl GeocodeJob {
    fn column(&self) -> AddressColumn {
        if self.is_checkout {
            AddressColumn::CheckOut
        } else {
            AddressColumn::CheckIn
        }
    }
}

/// Resolves coordinates to a human-readable address. An empty string means
/// "not found"; implementations never fail.
#[async_trait]
pub trait LocationFetcher: Send + Sync {
    async fn resolve_address(&self, latitude: f64, longitude: f64) -> String;
}

#[derive(Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
}

/// Nominatim `/reverse` client.
pub struct NominatimFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimFetcher {
    pub fn new(base_url: &str, user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(15))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LocationFetcher for NominatimFetcher {
    async fn resolve_address(&self, latitude: f64, longitude: f64) -> String {
        let url = format!("{}/reverse", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status());

        let body = match response {
            Ok(r) => r.json::<ReverseResponse>().await,
            Err(e) => {
                warn!(error = %e, latitude, longitude, "Reverse geocode request failed");
                return String::new();
            }
        };

        match body {
            Ok(body) => body.display_name.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, latitude, longitude, "Reverse geocode response unreadable");
                String::new()
            }
        }
    }
}

/// Fixed-interval permit source shared by every worker. The first permit is
/// immediate, each later one is granted `interval` after the previous.
pub struct RateLimiter {
    interval: Duration,
    next_permit: tokio::sync::Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_permit: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        // Holding the lock across the sleep queues the other workers behind us
        let mut next_permit = self.next_permit.lock().await;
        let now = Instant::now();
        let at = next_permit.map_or(now, |next| next.max(now));
        tokio::time::sleep_until(at).await;
        *next_permit = Some(at + self.interval);
    }
}

#[derive(Debug, Clone)]
pub struct GeocodeSettings {
    pub queue_capacity: usize,
    pub workers: usize,
    pub interval: Duration,
}

impl Default for GeocodeSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            workers: 3,
            interval: Duration::from_millis(1500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// Queue full; the job was discarded.
    Dropped,
    /// Pipeline is shutting down; the job was discarded.
    Closed,
}

pub struct GeocodePipeline {
    store: Arc<dyn AttendanceStore>,
    fetcher: Arc<dyn LocationFetcher>,
    worker_count: usize,
    sender: Mutex<Option<mpsc::Sender<GeocodeJob>>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<GeocodeJob>>>,
    limiter: Arc<RateLimiter>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl GeocodePipeline {
    /// Builds the queue without starting any worker. Call [`start`](Self::start).
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        fetcher: Arc<dyn LocationFetcher>,
        settings: GeocodeSettings,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));

        Self {
            store,
            fetcher,
            worker_count: settings.workers.max(1),
            sender: Mutex::new(Some(sender)),
            receiver: Arc::new(tokio::sync::Mutex::new(receiver)),
            limiter: Arc::new(RateLimiter::new(settings.interval)),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the worker tasks on the current Tokio runtime. No-op when already
    /// started or stopped.
    pub fn start(&self) {
        let accepting = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if !accepting || !handles.is_empty() {
            return;
        }

        for worker_id in 0..self.worker_count {
            handles.push(tokio::spawn(self.worker(worker_id).run()));
        }
    }

    fn worker(&self, id: usize) -> Worker {
        Worker {
            id,
            receiver: Arc::clone(&self.receiver),
            limiter: Arc::clone(&self.limiter),
            store: Arc::clone(&self.store),
            fetcher: Arc::clone(&self.fetcher),
        }
    }

    /// Never blocks. A full queue drops the job with a warning.
    pub fn enqueue(&self, job: GeocodeJob) -> EnqueueOutcome {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            debug!(attendance_id = job.attendance_id, "Geocode pipeline stopped, ignoring job");
            return EnqueueOutcome::Closed;
        };

        match sender.try_send(job) {
            Ok(()) => EnqueueOutcome::Accepted,
            Err(TrySendError::Full(job)) => {
                warn!(
                    attendance_id = job.attendance_id,
                    "Geocode queue is full, skipping job"
                );
                EnqueueOutcome::Dropped
            }
            Err(TrySendError::Closed(job)) => {
                debug!(attendance_id = job.attendance_id, "Geocode queue closed, ignoring job");
                EnqueueOutcome::Closed
            }
        }
    }

    /// Jobs accepted but not yet picked up by a worker.
    pub fn pending(&self) -> usize {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |s| s.max_capacity() - s.capacity())
    }

    /// Stops accepting jobs, then waits for the workers to drain the queue and exit.
    /// A pipeline that was never started drains its backlog on the calling task.
    pub async fn stop(&self) {
        info!("Stopping geocode workers...");
        // Dropping the only sender closes the channel once the backlog is consumed
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        if handles.is_empty() {
            self.worker(0).run().await;
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Geocode worker terminated abnormally");
            }
        }
        info!("All geocode workers stopped");
    }
}

struct Worker {
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<GeocodeJob>>>,
    limiter: Arc<RateLimiter>,
    store: Arc<dyn AttendanceStore>,
    fetcher: Arc<dyn LocationFetcher>,
}

impl Worker {
    async fn run(self) {
        info!(worker = self.id, "Geocode worker started");

        loop {
            let job = { self.receiver.lock().await.recv().await };
            let Some(job) = job else { break };

            self.limiter.acquire().await;
            self.process(job).await;
        }

        info!(worker = self.id, "Geocode worker exited");
    }

    async fn process(&self, job: GeocodeJob) {
        let address = self
            .fetcher
            .resolve_address(job.latitude, job.longitude)
            .await;

        if address.trim().is_empty() {
            warn!(attendance_id = job.attendance_id, "Empty address, skipping update");
            return;
        }

        match self
            .store
            .update_address(job.attendance_id, job.column(), &address)
            .await
        {
            Ok(0) => warn!(attendance_id = job.attendance_id, "Attendance row gone, address discarded"),
            Ok(_) => info!(attendance_id = job.attendance_id, "Address updated"),
            Err(e) => error!(error = %e, attendance_id = job.attendance_id, "Failed to update address"),
        }
    }
}
