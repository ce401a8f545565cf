//! Core domain types for the bastion governance core.
//!
//! This crate provides the vocabulary shared by every engine:
//! - `Digest`: fixed-length Keccak-256 digest with hex encoding
//! - `Stage`, `ArtifactKind`, `EvidenceKind`: closed gate taxonomies
//! - `SignalStateKind`: readiness states for candidates
//! - `ContextSnapshot`: market-context view consumed by the oracle
//! - `Clock`: injectable time source
//! - `EscalationEvent`, `EscalationSink`: structured alert channel

#[macro_use]
mod macros;

pub mod clock;
pub mod context;
pub mod digest;
pub mod error;
pub mod escalation;
pub mod ids;
pub mod signal;
pub mod taxonomy;

pub use clock::{Clock, ManualClock, SystemClock};
pub use context::{CoherenceStatus, ContextSnapshot, LiquidityState, Regime, VolatilityState};
pub use digest::Digest;
pub use error::{CoreError, Result};
pub use escalation::{
    ChannelEscalationSink, EscalationEvent, EscalationKind, EscalationSink, LogEscalationSink,
    Severity,
};
pub use ids::{ArtifactId, CandidateId, SignerIdentity};
pub use signal::SignalStateKind;
pub use taxonomy::{
    ArtifactDescriptor, ArtifactKind, EdgeType, EvidenceKind, EvidenceRef, FeatureClass,
    SignalClass, SignerRole, Stage,
};
