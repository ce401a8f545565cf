//! Signal readiness states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Readiness state of a signal candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignalStateKind {
    Dormant,
    Primed,
    Executing,
    Holding,
    Cooling,
}

impl SignalStateKind {
    pub const ALL: [SignalStateKind; 5] = [
        Self::Dormant,
        Self::Primed,
        Self::Executing,
        Self::Holding,
        Self::Cooling,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dormant => "DORMANT",
            Self::Primed => "PRIMED",
            Self::Executing => "EXECUTING",
            Self::Holding => "HOLDING",
            Self::Cooling => "COOLING",
        }
    }

    /// The fixed adjacency list. Nothing outside it is ever legal.
    #[must_use]
    pub fn can_transition_to(self, to: SignalStateKind) -> bool {
        use SignalStateKind::*;
        matches!(
            (self, to),
            (Dormant, Primed)
                | (Primed, Executing)
                | (Primed, Dormant)
                | (Executing, Holding)
                | (Executing, Dormant)
                | (Holding, Cooling)
                | (Cooling, Dormant)
        )
    }
}

impl fmt::Display for SignalStateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacency_has_exactly_seven_edges() {
        let legal = SignalStateKind::ALL
            .iter()
            .flat_map(|from| SignalStateKind::ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .count();
        assert_eq!(legal, 7);
    }

    #[test]
    fn test_no_self_loops() {
        for s in SignalStateKind::ALL {
            assert!(!s.can_transition_to(s), "{s} must not loop");
        }
    }
}
