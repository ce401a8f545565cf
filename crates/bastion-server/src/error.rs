//! Application error types.

use bastion_core::SignerIdentity;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No local key for signer {0}")]
    MissingKey(SignerIdentity),

    #[error("Ledger error: {0}")]
    Ledger(#[from] bastion_ledger::LedgerError),

    #[error("Attestation error: {0}")]
    Attest(#[from] bastion_attest::AttestError),

    #[error("Key error: {0}")]
    Key(#[from] bastion_attest::KeyError),

    #[error("Gate error: {0}")]
    Gate(#[from] bastion_gate::GateError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] bastion_oracle::OracleError),

    #[error("Signal error: {0}")]
    Signal(#[from] bastion_signal::SignalError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] bastion_pipeline::PipelineError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] bastion_telemetry::TelemetryError),

    #[error("Snapshot parse error: {0}")]
    SnapshotParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
