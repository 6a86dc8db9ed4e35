//! Event type definitions for the stage pipeline.
//!
//! Requests carry no data; each stage re-reads the store when it runs, so
//! duplicate or late requests are harmless.

use offerhub_sdk::objects::StageName;
use std::fmt;

/// What caused a stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Interval ticker for the stage.
    Schedule,
    /// Operator request through the admin API.
    Manual,
    /// Completion of the upstream stage.
    Chained,
}

impl Trigger {
    pub const fn as_str(self) -> &'static str {
        match self {
            Trigger::Schedule => "schedule",
            Trigger::Manual => "manual",
            Trigger::Chained => "chained",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to run one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRequest {
    pub stage: StageName,
    pub trigger: Trigger,
}

impl StageRequest {
    pub const fn new(stage: StageName, trigger: Trigger) -> Self {
        Self { stage, trigger }
    }
}
