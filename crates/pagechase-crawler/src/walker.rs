use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use crate::config::{AdmissionBackoff, Ceiling, CrawlerConfig, Mode};
use crate::error::{CrawlError, Stage};
use crate::gate::{AdmissionGate, AdmissionRequest};
use crate::strategy::{
    ArtifactStrategy, Fetcher, NextLocatorStrategy, NoArtifact, NoNextLocator, Page, Sink,
};

type Outcome = Result<(), CrawlError>;

/// Completion policy used when no callback is supplied: a failed walk panics.
pub fn default_on_done(outcome: Outcome) {
    if let Err(e) = outcome {
        panic!("Walk failed: {e}");
    }
}

/// Follows chains of pages, from one locator to the next.
///
/// Both walking modes share the same fetcher, strategies and sink, as well as
/// the item index used to name artifacts that have no name of their own.
#[derive(Clone)]
pub struct Walker {
    fetcher: Arc<dyn Fetcher>,
    next: Arc<dyn NextLocatorStrategy>,
    artifact: Arc<dyn ArtifactStrategy>,
    sink: Arc<dyn Sink>,
    backoff: AdmissionBackoff,
    item_index: Arc<AtomicU64>,
}

impl Walker {
    pub fn new<F, S>(fetcher: F, sink: S) -> Self
    where
        F: Fetcher + 'static,
        S: Sink + 'static,
    {
        Self {
            fetcher: Arc::new(fetcher),
            next: Arc::new(NoNextLocator),
            artifact: Arc::new(NoArtifact),
            sink: Arc::new(sink),
            backoff: AdmissionBackoff::default(),
            item_index: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_next_locator<N>(mut self, next: N) -> Self
    where
        N: NextLocatorStrategy + 'static,
    {
        self.next = Arc::new(next);
        self
    }

    pub fn with_artifact<A>(mut self, artifact: A) -> Self
    where
        A: ArtifactStrategy + 'static,
    {
        self.artifact = Arc::new(artifact);
        self
    }

    pub fn with_admission_backoff(mut self, backoff: AdmissionBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Runs in the mode selected by `config`.
    pub async fn walk(&self, start: impl Into<String>, config: &CrawlerConfig) -> Outcome {
        match config.mode {
            Mode::Sequential => self.run_indefinitely(start).await,
            Mode::Concurrent => self.run_concurrent(start, config.max_concurrent).await,
        }
    }

    /// Follows a single chain, persisting each page's artifact before asking
    /// for the next locator.
    pub async fn run_indefinitely(&self, start: impl Into<String>) -> Outcome {
        let mut locator = start.into();
        loop {
            let index = self.next_index();
            let page = self.fetch(&locator).await?;
            self.persist(&page, index).await?;
            match self.next_locator(&page).await? {
                Some(next) => locator = next,
                None => {
                    log::info!("Walk ended at {} (item {index})", page.locator);
                    return Ok(());
                }
            }
        }
    }

    /// Runs chain steps concurrently, at most `max_concurrent` at a time.
    ///
    /// A step submits its successor as soon as the next locator is known,
    /// then handles its own artifact. The walk completes when no step is
    /// running and no admission request is pending, or with the first error.
    pub async fn run_concurrent<C>(&self, start: impl Into<String>, max_concurrent: C) -> Outcome
    where
        C: TryInto<Ceiling>,
        CrawlError: From<C::Error>,
    {
        let ceiling = max_concurrent.try_into()?;
        let rx_outcome = self.start_concurrent(start.into(), ceiling);
        first_outcome(rx_outcome).await
    }

    /// Spawns a sequential walk and hands its outcome to `on_done`.
    pub fn spawn_indefinitely_with<F>(&self, start: impl Into<String>, on_done: F) -> JoinHandle<()>
    where
        F: FnOnce(Outcome) + Send + 'static,
    {
        let walker = self.clone();
        let start = start.into();
        tokio::spawn(async move { on_done(walker.run_indefinitely(start).await) })
    }

    pub fn spawn_indefinitely(&self, start: impl Into<String>) -> JoinHandle<()> {
        self.spawn_indefinitely_with(start, default_on_done)
    }

    /// Spawns a concurrent walk and hands its outcome to `on_done`.
    ///
    /// An invalid ceiling is reported to `on_done` before returning, in which
    /// case nothing is spawned.
    pub fn spawn_concurrent_with<C, F>(
        &self,
        start: impl Into<String>,
        max_concurrent: C,
        on_done: F,
    ) -> Option<JoinHandle<()>>
    where
        C: TryInto<Ceiling>,
        CrawlError: From<C::Error>,
        F: FnOnce(Outcome) + Send + 'static,
    {
        let ceiling = match max_concurrent.try_into() {
            Ok(ceiling) => ceiling,
            Err(e) => {
                on_done(Err(e.into()));
                return None;
            }
        };
        let rx_outcome = self.start_concurrent(start.into(), ceiling);
        Some(tokio::spawn(async move {
            on_done(first_outcome(rx_outcome).await)
        }))
    }

    pub fn spawn_concurrent<C>(
        &self,
        start: impl Into<String>,
        max_concurrent: C,
    ) -> Option<JoinHandle<()>>
    where
        C: TryInto<Ceiling>,
        CrawlError: From<C::Error>,
    {
        self.spawn_concurrent_with(start, max_concurrent, default_on_done)
    }

    fn start_concurrent(
        &self,
        start: String,
        ceiling: Ceiling,
    ) -> mpsc::UnboundedReceiver<Outcome> {
        let (tx_outcome, rx_outcome) = mpsc::unbounded_channel();
        let run = Arc::new(ConcurrentRun {
            walker: self.clone(),
            gate: AdmissionGate::new(ceiling),
            halted: AtomicBool::new(false),
            tx_outcome,
        });
        log::info!(
            "Walking from {start}, at most {} steps at once",
            run.gate.ceiling()
        );
        run.submit(start);
        rx_outcome
    }

    fn next_index(&self) -> u64 {
        self.item_index.fetch_add(1, Ordering::SeqCst)
    }

    // Chain step building blocks

    async fn fetch(&self, locator: &str) -> Result<Page, CrawlError> {
        log::debug!("Fetching {locator}");
        self.fetcher
            .fetch(locator)
            .await
            .map_err(|source| CrawlError::Transport {
                locator: locator.to_string(),
                source,
            })
    }

    async fn next_locator(&self, page: &Page) -> Result<Option<String>, CrawlError> {
        let next = self
            .next
            .next_locator(page)
            .await
            .map_err(|source| CrawlError::Extraction {
                stage: Stage::NextLocator,
                locator: page.locator.clone(),
                source,
            })?;
        Ok(next.filter(|locator| !locator.is_empty()))
    }

    async fn persist(&self, page: &Page, index: u64) -> Result<(), CrawlError> {
        let artifact = self
            .artifact
            .artifact(page)
            .await
            .map_err(|source| CrawlError::Extraction {
                stage: Stage::Artifact,
                locator: page.locator.clone(),
                source,
            })?;

        let artifact = match artifact {
            Some(artifact) => artifact,
            None => return Ok(()),
        };

        let name = artifact.file_name(index);
        if let Err(source) = self.sink.store(&name, &artifact.payload).await {
            return Err(CrawlError::Persistence { name, source });
        }
        log::debug!("Stored {name} from {}", page.locator);
        Ok(())
    }
}

async fn first_outcome(mut rx_outcome: mpsc::UnboundedReceiver<Outcome>) -> Outcome {
    rx_outcome.recv().await.unwrap_or(Err(CrawlError::Aborted))
}

/// State of one `run_concurrent` call, shared by all of its chain steps.
struct ConcurrentRun {
    walker: Walker,
    gate: AdmissionGate,
    /// Set by the first failing step, pending requests then give up.
    halted: AtomicBool,
    tx_outcome: mpsc::UnboundedSender<Outcome>,
}

impl ConcurrentRun {
    /// Registers a new chain with the gate and queues it on the runtime.
    ///
    /// The first admission attempt happens before returning, so the caller's
    /// own slot is never released before its successor is accounted for.
    fn submit(self: &Arc<Self>, locator: String) {
        let mut request = AdmissionRequest::new();
        let admitted = self.gate.try_admit(&mut request);
        let run = Arc::clone(self);
        tokio::spawn(async move {
            if admitted || run.wait_for_slot(&mut request, &locator).await {
                run.step(locator).await;
            }
        });
    }

    async fn wait_for_slot(&self, request: &mut AdmissionRequest, locator: &str) -> bool {
        loop {
            let delay = self.walker.backoff.delay(request.denials());
            log::debug!("No slot for {locator}, retrying in {delay:?}");
            time::sleep(delay).await;

            if self.halted.load(Ordering::SeqCst) {
                log::debug!("Dropping {locator}, walk already failed");
                self.gate.withdraw(request);
                return false;
            }
            if self.gate.try_admit(request) {
                return true;
            }
        }
    }

    async fn step(self: &Arc<Self>, locator: String) {
        let index = self.walker.next_index();
        match self.advance(&locator, index).await {
            Ok(()) => {
                if self.gate.release() && !self.halted.load(Ordering::SeqCst) {
                    log::info!("Walk drained after item {index}");
                    self.tx_outcome.send(Ok(())).ok();
                }
            }
            Err(e) => {
                log::warn!("Chain at {locator} failed ({}): {e}", e.as_label());
                self.halted.store(true, Ordering::SeqCst);
                // Reported before releasing so that a sibling draining the
                // gate can't win the race with a success.
                self.tx_outcome.send(Err(e)).ok();
                self.gate.release();
            }
        }
    }

    async fn advance(self: &Arc<Self>, locator: &str, index: u64) -> Outcome {
        let page = self.walker.fetch(locator).await?;
        if let Some(next) = self.walker.next_locator(&page).await? {
            if self.halted.load(Ordering::SeqCst) {
                log::debug!("Not following {next}, walk already failed");
            } else {
                self.submit(next);
            }
        }
        self.walker.persist(&page, index).await
    }
}
