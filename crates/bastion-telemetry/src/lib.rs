//! Prometheus metrics and structured logging for bastion.
//!
//! Provides observability for every engine:
//! - Prometheus metrics for ledger, attestation, gates, oracle, signals and promotions
//! - Structured JSON logging with tracing

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LogFormat, LoggingConfig};
pub use metrics::Metrics;
