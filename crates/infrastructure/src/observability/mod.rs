//! Observability module
//!
//! Structured lifecycle logging and metrics for the scheduler.

pub mod metrics_collector;
pub mod structured_logger;

pub use metrics_collector::MetricsCollector;
pub use structured_logger::StructuredLogger;
