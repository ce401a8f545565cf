//! Signal Readiness State Machine.
//!
//! Each candidate moves through DORMANT → PRIMED → EXECUTING → HOLDING →
//! COOLING → DORMANT along a fixed adjacency list. Entering PRIMED or
//! EXECUTING requires the context oracle's approval, and every attempt,
//! accepted or not, is written to the ledger.

pub mod config;
pub mod engine;
pub mod error;
pub mod state;

pub use config::SignalConfig;
pub use engine::{SignalEngine, SIGNAL_SCOPE, SYSTEM_ACTOR};
pub use error::{SignalError, SignalResult};
pub use state::{SignalState, TransitionRecord};
