//! Pipeline stage processors.
//!
//! - `ChannelOfferComputer`: handles `ComputeChannelOffers`, writes one channel
//!   offer per product variant
//! - `ExportMaterializer`: handles `MaterializeExports`, renders the feed and
//!   validation artifacts
//! - `DeliveryAgent`: handles `DeliverFiles`, pushes artifacts to the intake

pub mod compute;
pub mod delivery;
pub mod exporter;

pub use compute::{ChannelOfferComputer, ComputeChannelOffers, ComputeError};
pub use delivery::{
    DeliverFiles, DeliveryAgent, DeliveryError, IntakeConnector, IntakeSession,
    LocalDirConnector, RenameOutcome, SftpConfig, SftpConnector, replace_remote,
};
pub use exporter::{ExportError, ExportMaterializer, MaterializeExports, export_file_names};
