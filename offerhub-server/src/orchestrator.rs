//! Stage workers and schedules.
//!
//! Each pipeline stage has one worker fed by its own request channel. A
//! worker runs requests one at a time, retries a failed run with
//! exponential backoff and, once `compute` succeeds, queues `export`.
//! Interval tickers feed scheduled runs into the same channels the admin
//! API uses for manual triggers.

use crate::config::runtime::{IntakeTarget, RetryPolicy, RuntimeConfig, Schedule};
use kanau::processor::Processor;
use offerhub_core::events::{
    StageReceivers, StageRequest, StageRequestReceiver, StageSenders, Trigger,
};
use offerhub_core::framework::Store;
use offerhub_core::ingest::{
    FeedAdapter, GoldenSneakersFeed, IngestError, ShopifyCatalogFeed, Supplier1Feed,
    SupplierCsvFeed,
};
use offerhub_core::processors::{
    ChannelOfferComputer, ComputeChannelOffers, ComputeError, DeliverFiles, DeliveryAgent,
    DeliveryError, ExportError, ExportMaterializer, LocalDirConnector, MaterializeExports,
    SftpConnector,
};
use offerhub_core::selection::OfferSelector;
use offerhub_sdk::objects::{
    Channel, ComputeSummary, DeliveryReport, ExportSummary, IngestSummary, StageName,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Highest exponent used for the backoff; keeps `2^n` well inside `u64`.
const MAX_BACKOFF_EXPONENT: u32 = 20;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("{adapter} ingestion failed: {source}")]
    Ingest {
        adapter: &'static str,
        #[source]
        source: IngestError,
    },

    #[error("supplier adapters failed: {}", .failed.join(", "))]
    Suppliers { failed: Vec<&'static str> },

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// What a successful stage run produced.
#[derive(Debug, Clone)]
pub enum StageOutcome {
    /// `None` when no catalog adapter is configured.
    Catalog(Option<IngestSummary>),
    Suppliers(Vec<IngestSummary>),
    Compute(ComputeSummary),
    Export {
        export: ExportSummary,
        /// `None` when no intake is configured.
        delivery: Option<DeliveryReport>,
    },
}

impl StageOutcome {
    fn log(&self) {
        match self {
            StageOutcome::Catalog(Some(summary)) => log_ingest(summary),
            StageOutcome::Catalog(None) => debug!("Catalog stage had nothing to run"),
            StageOutcome::Suppliers(summaries) => summaries.iter().for_each(log_ingest),
            StageOutcome::Compute(summary) => info!(
                run_id = %summary.run_id,
                channel = %summary.channel,
                evaluated = summary.evaluated,
                published = summary.published,
                incomplete = summary.validations.len(),
                "Compute stage completed"
            ),
            StageOutcome::Export { export, delivery } => info!(
                channel = %export.channel,
                price_rows = export.price_rows,
                master_rows = export.master_rows,
                validation_rows = export.validation_rows,
                host = delivery.as_ref().map(|d| d.host.as_str()),
                uploaded = delivery.as_ref().map(|d| d.uploaded),
                "Export stage completed"
            ),
        }
    }
}

fn log_ingest(summary: &IngestSummary) {
    info!(
        adapter = %summary.adapter,
        rows = summary.rows,
        upserted = summary.upserted,
        unmapped = summary.unmapped,
        "Ingestion completed"
    );
}

#[derive(Debug, Clone, Copy)]
/// Execute one run of `stage`.
pub struct RunStage {
    pub stage: StageName,
}

/// Everything the stages need, wired once at startup.
pub struct Pipeline {
    channel: Channel,
    catalog: Option<Arc<dyn FeedAdapter>>,
    suppliers: Vec<Arc<dyn FeedAdapter>>,
    computer: ChannelOfferComputer,
    materializer: ExportMaterializer,
    delivery: Option<DeliveryAgent>,
}

impl Pipeline {
    pub fn new(
        channel: Channel,
        computer: ChannelOfferComputer,
        materializer: ExportMaterializer,
    ) -> Self {
        Self {
            channel,
            catalog: None,
            suppliers: Vec::new(),
            computer,
            materializer,
            delivery: None,
        }
    }

    pub fn with_catalog(mut self, adapter: Arc<dyn FeedAdapter>) -> Self {
        self.catalog = Some(adapter);
        self
    }

    pub fn with_supplier(mut self, adapter: Arc<dyn FeedAdapter>) -> Self {
        self.suppliers.push(adapter);
        self
    }

    pub fn with_delivery(mut self, agent: DeliveryAgent) -> Self {
        self.delivery = Some(agent);
        self
    }

    /// Build the pipeline for `channel` from the runtime configuration.
    pub fn from_config(store: Store, channel: Channel, config: &RuntimeConfig) -> Self {
        let export_dir = config.export_dir.clone();
        let mut pipeline = Pipeline::new(
            channel,
            ChannelOfferComputer::new(store.clone(), OfferSelector::new(config.priority.clone())),
            ExportMaterializer::new(store.clone(), export_dir.clone()),
        );

        if let Some(shopify) = &config.shopify {
            pipeline = pipeline.with_catalog(Arc::new(ShopifyCatalogFeed::new(
                store.clone(),
                shopify.clone(),
            )));
        }
        if let Some(suppliers) = &config.suppliers {
            pipeline = pipeline.with_supplier(Arc::new(SupplierCsvFeed::new(
                store.clone(),
                suppliers.csv_path.clone(),
                suppliers.mapping_path.clone(),
                export_dir.clone(),
            )));
        }
        if let Some(mode) = &config.supplier1 {
            pipeline = pipeline.with_supplier(Arc::new(Supplier1Feed::new(
                store.clone(),
                mode.clone(),
                export_dir.clone(),
            )));
        }
        if let Some(goldensneakers) = &config.goldensneakers {
            pipeline = pipeline.with_supplier(Arc::new(GoldenSneakersFeed::new(
                store.clone(),
                goldensneakers.clone(),
                export_dir.clone(),
            )));
        }

        match &config.intake {
            IntakeTarget::Sftp { config: sftp, remote_dir } => {
                pipeline = pipeline.with_delivery(DeliveryAgent::new(
                    Arc::new(SftpConnector::new(sftp.clone())),
                    export_dir,
                    remote_dir.clone(),
                ));
            }
            IntakeTarget::LocalDir(dir) => {
                pipeline = pipeline.with_delivery(DeliveryAgent::new(
                    Arc::new(LocalDirConnector::new(dir.clone())),
                    export_dir,
                    "",
                ));
            }
            IntakeTarget::Disabled => {
                warn!("No intake configured, exports will not be delivered");
            }
        }

        pipeline
    }

    async fn run_suppliers(&self) -> Result<Vec<IngestSummary>, StageError> {
        let mut summaries = Vec::with_capacity(self.suppliers.len());
        let mut failed = Vec::new();
        // Every adapter runs even if an earlier one failed.
        for adapter in &self.suppliers {
            match adapter.ingest().await {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    error!(adapter = adapter.name(), error = %e, "Supplier ingestion failed");
                    failed.push(adapter.name());
                }
            }
        }
        if failed.is_empty() {
            Ok(summaries)
        } else {
            Err(StageError::Suppliers { failed })
        }
    }

    async fn run_export(&self) -> Result<StageOutcome, StageError> {
        let export = self
            .materializer
            .process(MaterializeExports {
                channel: self.channel,
            })
            .await?;
        let delivery = match &self.delivery {
            Some(agent) => Some(
                agent
                    .process(DeliverFiles {
                        files: export.files.clone(),
                    })
                    .await?,
            ),
            None => None,
        };
        Ok(StageOutcome::Export { export, delivery })
    }
}

impl Processor<RunStage> for Pipeline {
    type Output = StageOutcome;
    type Error = StageError;

    #[tracing::instrument(skip_all, err, fields(stage = %cmd.stage))]
    async fn process(&self, cmd: RunStage) -> Result<StageOutcome, StageError> {
        match cmd.stage {
            StageName::Catalog => match &self.catalog {
                Some(adapter) => adapter
                    .ingest()
                    .await
                    .map(|summary| StageOutcome::Catalog(Some(summary)))
                    .map_err(|source| StageError::Ingest {
                        adapter: adapter.name(),
                        source,
                    }),
                None => {
                    debug!("No catalog adapter configured");
                    Ok(StageOutcome::Catalog(None))
                }
            },
            StageName::Suppliers => self.run_suppliers().await.map(StageOutcome::Suppliers),
            StageName::Compute => {
                let summary = self
                    .computer
                    .process(ComputeChannelOffers {
                        channel: self.channel,
                    })
                    .await?;
                Ok(StageOutcome::Compute(summary))
            }
            StageName::Export => self.run_export().await,
        }
    }
}

/// Delay before retry number `attempt` (0-based): `2^attempt` seconds,
/// capped at `max_backoff`.
pub fn calculate_retry_delay(attempt: u32, max_backoff: Duration) -> Duration {
    let seconds = 2u64.pow(attempt.min(MAX_BACKOFF_EXPONENT));
    Duration::from_secs(seconds).min(max_backoff)
}

/// Runs the requests of one stage.
pub struct StageWorker {
    stage: StageName,
    pipeline: Arc<Pipeline>,
    requests: StageRequestReceiver,
    senders: StageSenders,
    retry: RetryPolicy,
    shutdown_rx: watch::Receiver<bool>,
}

impl StageWorker {
    pub fn new(
        stage: StageName,
        pipeline: Arc<Pipeline>,
        requests: StageRequestReceiver,
        senders: StageSenders,
        retry: RetryPolicy,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stage,
            pipeline,
            requests,
            senders,
            retry,
            shutdown_rx,
        }
    }

    pub async fn run(mut self) {
        info!(stage = %self.stage, "Stage worker started");

        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        info!(stage = %self.stage, "Stage worker received shutdown signal");
                        break;
                    }
                }

                Some(request) = self.requests.recv() => {
                    if !self.execute(request).await {
                        break;
                    }
                }

                else => {
                    info!(stage = %self.stage, "Stage request channel closed");
                    break;
                }
            }
        }

        info!(stage = %self.stage, "Stage worker shutdown complete");
    }

    /// Run one request with retries. Returns `false` if shutdown was
    /// requested while waiting to retry.
    async fn execute(&mut self, request: StageRequest) -> bool {
        let mut attempt = 0;
        loop {
            info!(stage = %self.stage, trigger = %request.trigger, attempt, "Running stage");
            match self.pipeline.process(RunStage { stage: self.stage }).await {
                Ok(outcome) => {
                    outcome.log();
                    self.after_success().await;
                    return true;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        error!(
                            stage = %self.stage,
                            attempts = attempt,
                            error = %e,
                            "Stage run failed, giving up"
                        );
                        return true;
                    }
                    let delay = calculate_retry_delay(attempt - 1, self.retry.max_backoff);
                    warn!(
                        stage = %self.stage,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %e,
                        "Stage run failed, retrying"
                    );
                    tokio::select! {
                        biased;

                        changed = self.shutdown_rx.changed() => {
                            if changed.is_err() || *self.shutdown_rx.borrow() {
                                return false;
                            }
                        }

                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn after_success(&self) {
        if self.stage != StageName::Compute {
            return;
        }
        if let Err(e) = self.senders.enqueue(StageName::Export, Trigger::Chained).await {
            warn!(error = %e, "Failed to queue export after compute");
        }
    }
}

/// Enqueue `stage` every `period` until shutdown. The first run happens one
/// period after startup.
pub fn spawn_ticker(
    stage: StageName,
    period: Duration,
    senders: StageSenders,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(%stage, period_secs = period.as_secs(), "Stage schedule started");

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = senders.enqueue(stage, Trigger::Schedule).await {
                        warn!(%stage, error = %e, "Stage worker gone, stopping schedule");
                        break;
                    }
                }
            }
        }

        debug!(%stage, "Stage schedule stopped");
    })
}

/// Spawn a worker for every stage and a ticker for every scheduled stage.
pub fn spawn_all(
    pipeline: Arc<Pipeline>,
    senders: StageSenders,
    receivers: StageReceivers,
    schedule: Schedule,
    retry: RetryPolicy,
    shutdown_rx: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    let StageReceivers {
        catalog,
        suppliers,
        compute,
        export,
    } = receivers;

    let mut handles = Vec::new();
    for (stage, requests) in [
        (StageName::Catalog, catalog),
        (StageName::Suppliers, suppliers),
        (StageName::Compute, compute),
        (StageName::Export, export),
    ] {
        let worker = StageWorker::new(
            stage,
            pipeline.clone(),
            requests,
            senders.clone(),
            retry,
            shutdown_rx.clone(),
        );
        handles.push(tokio::spawn(worker.run()));

        if let Some(period) = schedule.interval(stage) {
            handles.push(spawn_ticker(
                stage,
                period,
                senders.clone(),
                shutdown_rx.clone(),
            ));
        }
    }
    handles
}
