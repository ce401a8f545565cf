use std::fmt;

use bastion_core::{CandidateId, Digest};
use serde::{Deserialize, Serialize};

/// Live traffic share of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampStage {
    Shadow,
    Ramp10,
    Ramp50,
    Full,
}

impl RampStage {
    #[must_use]
    pub fn percent(self) -> u8 {
        match self {
            Self::Shadow => 0,
            Self::Ramp10 => 10,
            Self::Ramp50 => 50,
            Self::Full => 100,
        }
    }

    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Shadow => Some(Self::Ramp10),
            Self::Ramp10 => Some(Self::Ramp50),
            Self::Ramp50 => Some(Self::Full),
            Self::Full => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Shadow => "shadow",
            Self::Ramp10 => "ramp_10",
            Self::Ramp50 => "ramp_50",
            Self::Full => "full",
        }
    }
}

impl fmt::Display for RampStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `candidate_id` falls in the live share at `percent`.
///
/// The bucket is derived from the candidate id alone, so a candidate keeps
/// its place across restarts and stays live as the ramp widens.
#[must_use]
pub fn in_ramp_slice(candidate_id: &CandidateId, percent: u8) -> bool {
    let digest = Digest::keccak(candidate_id.as_str().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    let bucket = u64::from_be_bytes(head) % 100;
    bucket < u64::from(percent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_bounds() {
        let id = CandidateId::from("cand-x");
        assert!(!in_ramp_slice(&id, 0));
        assert!(in_ramp_slice(&id, 100));
    }

    #[test]
    fn test_slice_is_monotonic_and_roughly_proportional() {
        let ids: Vec<CandidateId> = (0..1_000)
            .map(|i| CandidateId::from(format!("cand-{i}")))
            .collect();
        let at = |pct: u8| ids.iter().filter(|id| in_ramp_slice(id, pct)).count();

        for id in &ids {
            if in_ramp_slice(id, 10) {
                assert!(in_ramp_slice(id, 50));
            }
        }
        let ten = at(10);
        let fifty = at(50);
        assert!((50..=150).contains(&ten), "10% slice had {ten}");
        assert!((400..=600).contains(&fifty), "50% slice had {fifty}");
    }

    #[test]
    fn test_ramp_order() {
        assert_eq!(RampStage::Shadow.next(), Some(RampStage::Ramp10));
        assert_eq!(RampStage::Ramp50.next().map(RampStage::percent), Some(100));
        assert_eq!(RampStage::Full.next(), None);
    }
}
