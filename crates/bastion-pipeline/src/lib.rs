//! Promotion pipeline.
//!
//! Feeds qualified candidates into the signal machine under an hourly cap.
//! The pipeline starts in shadow mode, where decisions are only logged for
//! review, then ramps live traffic 10% → 50% → 100%. Drift and SLA monitors
//! pause it; promotions stay reversible for a bounded window.

pub mod config;
pub mod error;
pub mod monitor;
pub mod pipeline;
pub mod ramp;
pub mod rate_limit;

pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use monitor::{DriftMonitor, DriftReport, SlaReport, SlaTracker};
pub use pipeline::{
    PauseReason, PipelineStatus, PromotionOutcome, PromotionPipeline, PromotionRecord,
    PromotionRequest, PIPELINE_SCOPE,
};
pub use ramp::{in_ramp_slice, RampStage};
pub use rate_limit::{HourlyRateLimiter, PromotionTicket};
