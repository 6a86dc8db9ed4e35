pub mod admin;
pub mod channel;
pub mod reports;

pub use admin::{ExportFileInfo, HealthResponse, StageName, StageQueued};
pub use channel::{Channel, MissingFields, RequiredField, UnknownName};
pub use reports::{
    ComputeSummary, DeliveryReport, ExportSummary, IngestSummary, ValidationEntry,
};
