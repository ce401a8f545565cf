//! Closed taxonomies for gated artifacts.
//!
//! Every enumerated value here is a closed set. Unknown values are rejected
//! at the boundary (string parsing or deserialization) with an explicit
//! error; there is no permissive fallback variant. Extending a taxonomy is a
//! code change that itself goes through a full gate cycle.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::{ArtifactId, SignerIdentity};

closed_enum!(
    /// Gate stages in strict order.
    Stage, "stage" {
        Draft => "DRAFT",
        TechnicalValidation => "TECHNICAL_VALIDATION",
        GovernanceValidation => "GOVERNANCE_VALIDATION",
        OperationalTest => "OPERATIONAL_TEST",
        ConstitutionalLock => "CONSTITUTIONAL_LOCK",
        Live => "LIVE",
    }
);

impl Stage {
    /// Position in the stage order (DRAFT = 0).
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// The only stage a forward submission may target.
    #[must_use]
    pub fn next(self) -> Option<Stage> {
        Self::ALL.get(self.index() + 1).copied()
    }

    /// Stages at or beyond the constitutional lock are immutable.
    #[must_use]
    pub fn is_locked(self) -> bool {
        self >= Stage::ConstitutionalLock
    }
}

closed_enum!(
    /// Feature artifact sub-types.
    FeatureClass, "feature class" {
        Price => "price",
        Volume => "volume",
        Volatility => "volatility",
        Microstructure => "microstructure",
        Sentiment => "sentiment",
        Macro => "macro",
    }
);

closed_enum!(
    /// Causal-graph edge sub-types.
    EdgeType, "edge type" {
        Causes => "causes",
        Inhibits => "inhibits",
        Mediates => "mediates",
        Confounds => "confounds",
    }
);

closed_enum!(
    /// Trading-signal sub-types.
    SignalClass, "signal class" {
        MeanReversion => "mean_reversion",
        Momentum => "momentum",
        Breakout => "breakout",
        Arbitrage => "arbitrage",
    }
);

closed_enum!(
    /// Kinds of evidence a stage may require. Content stays opaque.
    EvidenceKind, "evidence kind" {
        TestReport => "test_report",
        Backtest => "backtest",
        CausalValidation => "causal_validation",
        GovernanceReview => "governance_review",
        ShadowRun => "shadow_run",
        RiskSignoff => "risk_signoff",
        IncidentReview => "incident_review",
    }
);

closed_enum!(
    /// Roles that may attest ledger entries.
    SignerRole, "signer role" {
        Owner => "owner",
        Governance => "governance",
        Technical => "technical",
        Risk => "risk",
        Operations => "operations",
    }
);

/// Artifact kind with its sub-type, as a tagged union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "subtype", rename_all = "snake_case")]
pub enum ArtifactKind {
    Feature(FeatureClass),
    CausalEdge(EdgeType),
    Signal(SignalClass),
}

impl ArtifactKind {
    /// Parse a `(kind, subtype)` pair received from an upstream generator.
    pub fn parse(kind: &str, subtype: &str) -> Result<Self> {
        match kind {
            "feature" => Ok(Self::Feature(subtype.parse()?)),
            "causal_edge" => Ok(Self::CausalEdge(subtype.parse()?)),
            "signal" => Ok(Self::Signal(subtype.parse()?)),
            other => Err(CoreError::UnknownVariant {
                taxonomy: "artifact kind",
                value: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Feature(_) => "feature",
            Self::CausalEdge(_) => "causal_edge",
            Self::Signal(_) => "signal",
        }
    }

    #[must_use]
    pub fn subtype_str(&self) -> &'static str {
        match self {
            Self::Feature(c) => c.as_str(),
            Self::CausalEdge(e) => e.as_str(),
            Self::Signal(s) => s.as_str(),
        }
    }

    /// Every kind/sub-type combination the taxonomy knows.
    #[must_use]
    pub fn all() -> Vec<ArtifactKind> {
        FeatureClass::ALL
            .iter()
            .map(|c| Self::Feature(*c))
            .chain(EdgeType::ALL.iter().map(|e| Self::CausalEdge(*e)))
            .chain(SignalClass::ALL.iter().map(|s| Self::Signal(*s)))
            .collect()
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind_str(), self.subtype_str())
    }
}

/// Reference to a piece of evidence held by an external system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub kind: EvidenceKind,
    /// Opaque locator (URI, report id, ...).
    pub reference: String,
}

impl EvidenceRef {
    pub fn new(kind: EvidenceKind, reference: impl Into<String>) -> Self {
        Self {
            kind,
            reference: reference.into(),
        }
    }
}

/// What an upstream generator declares when registering an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactDescriptor {
    pub artifact_id: ArtifactId,
    pub kind: ArtifactKind,
    pub owner: SignerIdentity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::Draft.next(), Some(Stage::TechnicalValidation));
        assert_eq!(Stage::ConstitutionalLock.next(), Some(Stage::Live));
        assert_eq!(Stage::Live.next(), None);
        assert!(Stage::Draft < Stage::Live);
        assert!(Stage::ConstitutionalLock.is_locked());
        assert!(!Stage::OperationalTest.is_locked());
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!(
            "OPERATIONAL_TEST".parse::<Stage>().unwrap(),
            Stage::OperationalTest
        );
        assert!(matches!(
            "STAGING".parse::<Stage>(),
            Err(CoreError::UnknownVariant { taxonomy: "stage", .. })
        ));
    }

    #[test]
    fn test_artifact_kind_parse() {
        assert_eq!(
            ArtifactKind::parse("causal_edge", "mediates").unwrap(),
            ArtifactKind::CausalEdge(EdgeType::Mediates)
        );
        assert!(ArtifactKind::parse("feature", "astrology").is_err());
        assert!(ArtifactKind::parse("hypothesis", "momentum").is_err());
    }

    #[test]
    fn test_artifact_kind_serde_tagged() {
        let kind = ArtifactKind::Signal(SignalClass::Momentum);
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, r#"{"kind":"signal","subtype":"momentum"}"#);

        let back: ArtifactKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, kind);
    }

    #[test]
    fn test_unknown_subtype_rejected_at_deserialization() {
        let json = r#"{"kind":"feature","subtype":"astrology"}"#;
        let result: std::result::Result<ArtifactKind, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_taxonomy_size() {
        assert_eq!(ArtifactKind::all().len(), 6 + 4 + 4);
    }
}
