//! HTTP API handlers.

pub mod admin;
