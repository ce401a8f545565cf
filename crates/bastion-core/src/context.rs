//! Market-context view consumed by the Context Coherence Oracle.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

closed_enum!(
    /// Market regime label produced by the external classifier.
    Regime, "regime" {
        TrendingUp => "trending_up",
        TrendingDown => "trending_down",
        RangeBound => "range_bound",
        HighVolatility => "high_volatility",
        Crisis => "crisis",
    }
);

closed_enum!(
    /// Volatility classification.
    VolatilityState, "volatility state" {
        Low => "low",
        Normal => "normal",
        Elevated => "elevated",
        Extreme => "extreme",
    }
);

closed_enum!(
    /// Liquidity classification.
    LiquidityState, "liquidity state" {
        Deep => "deep",
        Normal => "normal",
        Thin => "thin",
        Dislocated => "dislocated",
    }
);

/// One complete market-context observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub regime: Regime,
    /// Classifier confidence in `[0, 1]`.
    pub regime_confidence: Decimal,
    pub volatility_state: VolatilityState,
    pub liquidity_state: LiquidityState,
    pub captured_at: DateTime<Utc>,
}

impl ContextSnapshot {
    /// Structural validation applied before a snapshot may become active.
    ///
    /// `max_future_skew` bounds how far `captured_at` may sit ahead of `now`.
    pub fn validate(&self, now: DateTime<Utc>, max_future_skew: Duration) -> Result<()> {
        if self.regime_confidence < Decimal::ZERO || self.regime_confidence > Decimal::ONE {
            return Err(CoreError::InvalidSnapshot(format!(
                "regime_confidence {} outside [0, 1]",
                self.regime_confidence
            )));
        }
        if self.captured_at > now + max_future_skew {
            return Err(CoreError::InvalidSnapshot(format!(
                "captured_at {} is ahead of now {}",
                self.captured_at, now
            )));
        }
        Ok(())
    }

    /// Age relative to `now`, clamped at zero.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        let age = now - self.captured_at;
        if age < Duration::zero() {
            Duration::zero()
        } else {
            age
        }
    }
}

/// Three-level failover status of the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoherenceStatus {
    Operational,
    Degraded,
    Unavailable,
}

impl CoherenceStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Operational => "OPERATIONAL",
            Self::Degraded => "DEGRADED",
            Self::Unavailable => "UNAVAILABLE",
        }
    }

    /// Numeric level for gauges (0 = operational).
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::Operational => 0,
            Self::Degraded => 1,
            Self::Unavailable => 2,
        }
    }
}

impl fmt::Display for CoherenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
