#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod eligibility;
pub mod entities;
pub mod events;
pub mod framework;
pub mod ingest;
pub mod memory;
pub mod processors;
pub mod selection;
pub mod utils;
