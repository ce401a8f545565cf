//! Context Coherence Oracle (CCO).
//!
//! Holds exactly one active market-context snapshot and classifies its
//! freshness as OPERATIONAL, DEGRADED or UNAVAILABLE. Execution-bearing
//! signal transitions consult the oracle before proceeding.

pub mod config;
pub mod error;
pub mod observer;
pub mod oracle;

pub use config::OracleConfig;
pub use error::{OracleError, OracleResult};
pub use observer::SnapshotObserver;
pub use oracle::{classify, CoherenceReport, ContextOracle, VersionedSnapshot};
