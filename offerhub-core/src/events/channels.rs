//! Event channel factories and handles.

use super::types::{StageRequest, Trigger};
use offerhub_sdk::objects::StageName;
use tokio::sync::mpsc;

/// Default buffer size for stage request channels.
///
/// Stage runs are coarse; a small buffer is enough to absorb bursts of
/// manual triggers while a run is in progress.
pub const DEFAULT_CHANNEL_BUFFER: usize = 32;

/// Sender handle for StageRequest events.
pub type StageRequestSender = mpsc::Sender<StageRequest>;
/// Receiver handle for StageRequest events.
pub type StageRequestReceiver = mpsc::Receiver<StageRequest>;

/// Create a new StageRequest channel. Each stage worker owns one receiver.
pub fn stage_request_channel() -> (StageRequestSender, StageRequestReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}

/// Receivers for every stage, handed to the workers.
pub struct StageReceivers {
    pub catalog: StageRequestReceiver,
    pub suppliers: StageRequestReceiver,
    pub compute: StageRequestReceiver,
    pub export: StageRequestReceiver,
}

/// Container for all stage request senders.
#[derive(Debug, Clone)]
pub struct StageSenders {
    pub catalog: StageRequestSender,
    pub suppliers: StageRequestSender,
    pub compute: StageRequestSender,
    pub export: StageRequestSender,
}

impl StageSenders {
    /// Create the senders and the matching receivers for every stage.
    pub fn channels() -> (StageSenders, StageReceivers) {
        let (catalog_tx, catalog_rx) = stage_request_channel();
        let (suppliers_tx, suppliers_rx) = stage_request_channel();
        let (compute_tx, compute_rx) = stage_request_channel();
        let (export_tx, export_rx) = stage_request_channel();
        (
            StageSenders {
                catalog: catalog_tx,
                suppliers: suppliers_tx,
                compute: compute_tx,
                export: export_tx,
            },
            StageReceivers {
                catalog: catalog_rx,
                suppliers: suppliers_rx,
                compute: compute_rx,
                export: export_rx,
            },
        )
    }

    pub fn sender(&self, stage: StageName) -> &StageRequestSender {
        match stage {
            StageName::Catalog => &self.catalog,
            StageName::Suppliers => &self.suppliers,
            StageName::Compute => &self.compute,
            StageName::Export => &self.export,
        }
    }

    /// Queue a run of `stage`. Fails only when the stage worker has stopped.
    pub async fn enqueue(
        &self,
        stage: StageName,
        trigger: Trigger,
    ) -> Result<(), mpsc::error::SendError<StageRequest>> {
        self.sender(stage)
            .send(StageRequest::new(stage, trigger))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requests_reach_their_stage_receiver() {
        let (senders, mut receivers) = StageSenders::channels();
        senders
            .enqueue(StageName::Compute, Trigger::Manual)
            .await
            .unwrap();
        senders
            .enqueue(StageName::Export, Trigger::Chained)
            .await
            .unwrap();

        assert_eq!(
            receivers.compute.recv().await,
            Some(StageRequest::new(StageName::Compute, Trigger::Manual))
        );
        assert_eq!(
            receivers.export.recv().await,
            Some(StageRequest::new(StageName::Export, Trigger::Chained))
        );
        assert!(receivers.catalog.try_recv().is_err());
    }

    #[tokio::test]
    async fn enqueue_fails_once_worker_is_gone() {
        let (senders, receivers) = StageSenders::channels();
        drop(receivers);
        assert!(senders.enqueue(StageName::Catalog, Trigger::Schedule).await.is_err());
    }
}
