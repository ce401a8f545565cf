//! Drift and SLA monitors. Plain state holders; the pipeline serializes
//! access and acts on their verdicts.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriftReport {
    /// `None` until the minimum sample count is reached.
    pub mean: Option<Decimal>,
    pub samples: usize,
    pub breached: bool,
}

/// Rolling mean of quality scores against a floor.
#[derive(Debug, Clone)]
pub struct DriftMonitor {
    window: usize,
    min_samples: usize,
    floor: Decimal,
    scores: VecDeque<Decimal>,
}

impl DriftMonitor {
    pub fn new(window: usize, min_samples: usize, floor: Decimal) -> Self {
        let window = window.max(1);
        Self {
            window,
            min_samples: min_samples.clamp(1, window),
            floor,
            scores: VecDeque::with_capacity(window),
        }
    }

    pub fn record(&mut self, score: Decimal) -> DriftReport {
        if self.scores.len() == self.window {
            self.scores.pop_front();
        }
        self.scores.push_back(score);
        self.report()
    }

    pub fn report(&self) -> DriftReport {
        let samples = self.scores.len();
        if samples < self.min_samples {
            return DriftReport {
                mean: None,
                samples,
                breached: false,
            };
        }
        let sum: Decimal = self.scores.iter().copied().sum();
        let mean = sum / Decimal::from(samples);
        DriftReport {
            mean: Some(mean),
            samples,
            breached: mean < self.floor,
        }
    }

    /// Mean as a gauge value.
    pub fn mean_f64(&self) -> Option<f64> {
        self.report().mean.and_then(|m| m.to_f64())
    }

    pub fn reset(&mut self) {
        self.scores.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlaReport {
    pub breached: bool,
    pub latency_ms: u64,
    pub ceiling_ms: u64,
    /// Breaches in a row, across stages, including this one.
    pub consecutive: u32,
    /// The breach limit was reached by this measurement.
    pub limit_reached: bool,
}

/// Per-stage latency ceilings with a consecutive-breach counter.
#[derive(Debug, Clone)]
pub struct SlaTracker {
    ceilings_ms: BTreeMap<String, u64>,
    limit: u32,
    consecutive: u32,
}

impl SlaTracker {
    pub fn new(ceilings_ms: BTreeMap<String, u64>, limit: u32) -> Self {
        Self {
            ceilings_ms,
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    pub fn has_stage(&self, stage: &str) -> bool {
        self.ceilings_ms.contains_key(stage)
    }

    pub fn record(&mut self, stage: &str, latency: Duration) -> PipelineResult<SlaReport> {
        let ceiling_ms = *self
            .ceilings_ms
            .get(stage)
            .ok_or_else(|| PipelineError::UnknownSlaStage(stage.to_string()))?;
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        let breached = latency_ms > ceiling_ms;
        if breached {
            self.consecutive += 1;
        } else {
            self.consecutive = 0;
        }
        Ok(SlaReport {
            breached,
            latency_ms,
            ceiling_ms,
            consecutive: self.consecutive,
            limit_reached: breached && self.consecutive == self.limit,
        })
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}
