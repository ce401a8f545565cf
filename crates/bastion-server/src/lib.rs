//! Bastion governance server.
//!
//! Wires every engine together behind [`GovernanceService`]:
//! - ledger storage and chain verification
//! - attestation with locally held keys
//! - gate lifecycle, context oracle, signal machine and promotion pipeline
//! - escalation draining and snapshot ingestion

pub mod app;
pub mod config;
pub mod error;
pub mod ingest;
pub mod observer;
pub mod service;

pub use app::Application;
pub use config::{AppConfig, StorageBackend, StorageConfig};
pub use error::{AppError, AppResult};
pub use observer::{LedgerSnapshotObserver, CONTEXT_SCOPE};
pub use service::GovernanceService;
