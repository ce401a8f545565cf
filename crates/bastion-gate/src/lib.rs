//! Constitutional gate lifecycle.
//!
//! Artifacts move `DRAFT → TECHNICAL_VALIDATION → GOVERNANCE_VALIDATION →
//! OPERATIONAL_TEST → CONSTITUTIONAL_LOCK → LIVE` one stage at a time.
//! Each forward step is a two-phase operation: a submission carrying the
//! stage's evidence is recorded and attested, then `advance` commits it
//! after re-checking the attestations. Rollbacks and parameter changes
//! follow the same submit/attest/commit shape.

pub mod config;
pub mod engine;
pub mod error;
pub mod record;

pub use config::{GateConfig, StageRequirement};
pub use engine::{GateEngine, GATE_SCOPE};
pub use error::{GateError, GateResult};
pub use record::{
    GateRecord, ModificationAuthority, PendingChange, PendingRollback, PendingSubmission,
};
