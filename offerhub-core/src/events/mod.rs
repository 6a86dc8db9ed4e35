//! Stage requests and the channels that carry them.
//!
//! # Event Flow
//!
//! 1. Interval tickers and the admin API send `StageRequest` to a stage worker
//! 2. The `compute` worker sends a chained `export` request on success
//! 3. The `export` worker materializes and then delivers

pub mod channels;
pub mod types;

pub use channels::{
    DEFAULT_CHANNEL_BUFFER, StageReceivers, StageRequestReceiver, StageRequestSender,
    StageSenders, stage_request_channel,
};
pub use types::{StageRequest, Trigger};
