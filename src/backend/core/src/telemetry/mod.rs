//! Telemetry: structured logging and decision metrics.
//!
//! - **Logging**: `tracing` subscriber setup with JSON/pretty/compact output
//! - **Metrics**: counters and histograms through the `metrics` facade
//!
//! # Example
//!
//! ```rust,no_run
//! use canopy_core::telemetry::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default().with_level("info")).expect("logging");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{describe_metrics, DecisionTimer};
