//! Telemetry: structured logging and metrics.
//!
//! - **Logging**: JSON/pretty/compact `tracing` output with per-module levels
//! - **Metrics**: decision and cache counters through the `metrics` facade
//!
//! # Example
//!
//! ```rust,no_run
//! use packguard_core::telemetry::{init_logging, LoggingConfig};
//!
//! init_logging(&LoggingConfig::default()).expect("Failed to initialize logging");
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::{describe_metrics, CacheMetrics, DecisionMetrics, DecisionTimer};
