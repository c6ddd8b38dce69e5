//! Logging and metric utilities.

pub mod logging;
pub mod metrics;
