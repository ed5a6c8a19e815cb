//! Run orchestration
//!
//! Fans the target list out over one or more browser sessions. Workers
//! share nothing except the lookup client; a target that fails is logged
//! and skipped, and an external cancel signal makes in-flight workers
//! abandon cleanly and release their sessions.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::captcha::provider::{HttpTokenProvider, TokenProvider};
use crate::collector::visit::TargetVisit;
use crate::core::{ColetorError, Config, PriceRecord, Result, Target};
use crate::driver::session::{BrowserSession, SessionFactory};
use crate::driver::webdriver::WebDriverFactory;
use crate::registry::client::{HttpRegistryApi, RegistryClient};

/// What one run produced
#[derive(Debug)]
pub struct RunSummary {
    /// All records collected, in input order for sequential runs
    pub records: Vec<PriceRecord>,
    /// How many targets the run attempted
    pub attempted: usize,
}

impl RunSummary {
    /// Number of records actually collected
    pub fn collected(&self) -> usize {
        self.records.len()
    }
}

/// Requests a running collection to stop after the current step
#[derive(Clone)]
pub struct CancelHandle(Arc<watch::Sender<bool>>);

impl CancelHandle {
    /// Signal cancellation; idempotent
    pub fn cancel(&self) {
        let _ = self.0.send(true);
    }
}

/// Coordinates collection across the full target list
pub struct Collector {
    config: Config,
    registry: Arc<RegistryClient>,
    provider: Arc<dyn TokenProvider>,
    sessions: Arc<dyn SessionFactory>,
    cancel: Arc<watch::Sender<bool>>,
}

impl Collector {
    /// Build a collector with the production adapters
    pub fn with_config(config: Config) -> Result<Self> {
        let api = HttpRegistryApi::new(&config.registry)?;
        let registry = Arc::new(RegistryClient::new(Box::new(api), &config.registry));
        let provider: Arc<dyn TokenProvider> = Arc::new(HttpTokenProvider::new(&config.captcha)?);
        let sessions: Arc<dyn SessionFactory> = Arc::new(WebDriverFactory::new(config.driver.clone()));
        Ok(Self::with_parts(config, sessions, provider, registry))
    }

    /// Build a collector with injected capabilities
    pub fn with_parts(
        config: Config,
        sessions: Arc<dyn SessionFactory>,
        provider: Arc<dyn TokenProvider>,
        registry: Arc<RegistryClient>,
    ) -> Self {
        let (cancel, _) = watch::channel(false);
        Self {
            config,
            registry,
            provider,
            sessions,
            cancel: Arc::new(cancel),
        }
    }

    /// Handle for cancelling this collector's runs from outside
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Attempt every target, aggregating the records that came through.
    ///
    /// With one worker a single session is reused across all targets and
    /// output order follows input order; with more, each worker owns a
    /// session and a disjoint slice, and aggregation order is whatever
    /// the pool produces.
    pub async fn run(&self, targets: Vec<Target>) -> Result<RunSummary> {
        let attempted = targets.len();
        info!(
            targets = attempted,
            workers = self.config.run.workers,
            "starting collection run"
        );

        let records = if self.config.run.workers <= 1 {
            let session = self.sessions.create().await?;
            self.worker().process(session, targets).await
        } else {
            self.run_pooled(targets).await
        };

        info!(
            collected = records.len(),
            attempted, "collection run finished"
        );
        Ok(RunSummary { records, attempted })
    }

    async fn run_pooled(&self, targets: Vec<Target>) -> Vec<PriceRecord> {
        let chunk_size = targets.len().div_ceil(self.config.run.workers).max(1);
        let mut pool: JoinSet<Vec<PriceRecord>> = JoinSet::new();

        for (index, slice) in targets.chunks(chunk_size).enumerate() {
            let slice = slice.to_vec();
            let sessions = self.sessions.clone();
            let worker = self.worker();
            pool.spawn(async move {
                let session = match sessions.create().await {
                    Ok(session) => session,
                    Err(e) => {
                        error!(worker = index, error = %e, "no session, abandoning slice");
                        return Vec::new();
                    }
                };
                worker.process(session, slice).await
            });
        }

        let mut records = Vec::new();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(mut slice_records) => records.append(&mut slice_records),
                Err(e) => error!(error = %e, "worker crashed"),
            }
        }
        records
    }

    fn worker(&self) -> Worker {
        Worker {
            config: self.config.clone(),
            registry: self.registry.clone(),
            provider: self.provider.clone(),
            cancel: self.cancel.subscribe(),
        }
    }
}

/// One execution unit: a session, a slice of targets, a cancel receiver
struct Worker {
    config: Config,
    registry: Arc<RegistryClient>,
    provider: Arc<dyn TokenProvider>,
    cancel: watch::Receiver<bool>,
}

impl Worker {
    async fn process(
        mut self,
        session: Arc<dyn BrowserSession>,
        targets: Vec<Target>,
    ) -> Vec<PriceRecord> {
        let visit = TargetVisit::new(
            session.clone(),
            self.registry.clone(),
            self.provider.clone(),
            self.config.clone(),
        );

        let mut records = Vec::new();
        let total = targets.len();
        for (index, target) in targets.iter().enumerate() {
            if *self.cancel.borrow() {
                info!("cancellation requested, stopping");
                break;
            }

            let result = tokio::select! {
                _ = self.cancel.changed() => {
                    info!(ean = %target.ean, "cancellation requested, abandoning in-flight target");
                    break;
                }
                result = visit.run(target) => result,
            };

            match result {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(ColetorError::Cancelled) => break,
                Err(e) => {
                    error!(
                        ean = %target.ean,
                        location = %target.location_name,
                        error = %e,
                        "target aborted"
                    );
                }
            }

            if index + 1 < total {
                self.pause().await;
            }
        }

        if let Err(e) = session.quit().await {
            warn!(error = %e, "session shutdown failed");
        }
        records
    }

    /// Fixed inter-target delay plus jitter, so attempts sharing a
    /// session do not hammer the portal at a mechanical cadence.
    async fn pause(&self) {
        let mut delay = self.config.run.target_delay_ms;
        if self.config.run.jitter_ms > 0 {
            delay += rand::rng().random_range(0..=self.config.run.jitter_ms);
        }
        sleep(Duration::from_millis(delay)).await;
    }
}
