//! Stage requirements and pathway policy.

use bastion_core::{ArtifactKind, EvidenceKind, SignerRole, Stage};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a submission must carry to enter `stage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequirement {
    pub stage: Stage,
    #[serde(default)]
    pub evidence: Vec<EvidenceKind>,
    pub roles: Vec<SignerRole>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_stage_requirements")]
    pub stages: Vec<StageRequirement>,

    /// Roles that must attest a rollback.
    #[serde(default = "default_rollback_roles")]
    pub rollback_roles: Vec<SignerRole>,

    /// Roles that must attest a parameter change on an unlocked artifact.
    #[serde(default = "default_dual_signoff_roles")]
    pub dual_signoff_roles: Vec<SignerRole>,

    /// Roles that must attest a recalibration of a locked artifact.
    #[serde(default = "default_recalibration_roles")]
    pub recalibration_roles: Vec<SignerRole>,

    /// Largest relative change the recalibration pathway accepts (0.10 = 10%).
    #[serde(default = "default_max_recalibration_delta")]
    pub max_recalibration_delta: Decimal,

    /// Artifact kinds that may be registered. Empty means every kind.
    #[serde(default)]
    pub enabled_kinds: Vec<ArtifactKind>,
}

fn default_stage_requirements() -> Vec<StageRequirement> {
    use EvidenceKind as E;
    use SignerRole as R;
    vec![
        StageRequirement {
            stage: Stage::TechnicalValidation,
            evidence: vec![E::TestReport],
            roles: vec![R::Owner, R::Technical],
        },
        StageRequirement {
            stage: Stage::GovernanceValidation,
            evidence: vec![E::GovernanceReview],
            roles: vec![R::Owner, R::Governance],
        },
        StageRequirement {
            stage: Stage::OperationalTest,
            evidence: vec![E::ShadowRun],
            roles: vec![R::Operations, R::Risk],
        },
        StageRequirement {
            stage: Stage::ConstitutionalLock,
            evidence: vec![E::RiskSignoff],
            roles: vec![R::Owner, R::Governance, R::Risk],
        },
        StageRequirement {
            stage: Stage::Live,
            evidence: vec![],
            roles: vec![R::Governance, R::Operations],
        },
    ]
}

fn default_rollback_roles() -> Vec<SignerRole> {
    vec![SignerRole::Owner, SignerRole::Governance]
}

fn default_dual_signoff_roles() -> Vec<SignerRole> {
    vec![SignerRole::Owner, SignerRole::Governance]
}

fn default_recalibration_roles() -> Vec<SignerRole> {
    vec![SignerRole::Governance, SignerRole::Risk]
}

fn default_max_recalibration_delta() -> Decimal {
    Decimal::new(10, 2)
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            stages: default_stage_requirements(),
            rollback_roles: default_rollback_roles(),
            dual_signoff_roles: default_dual_signoff_roles(),
            recalibration_roles: default_recalibration_roles(),
            max_recalibration_delta: default_max_recalibration_delta(),
            enabled_kinds: Vec::new(),
        }
    }
}

impl GateConfig {
    /// Requirement for entering `stage`. Stages without an entry need
    /// no evidence and only the owner.
    #[must_use]
    pub fn requirement(&self, stage: Stage) -> StageRequirement {
        self.stages
            .iter()
            .find(|r| r.stage == stage)
            .cloned()
            .unwrap_or_else(|| StageRequirement {
                stage,
                evidence: Vec::new(),
                roles: vec![SignerRole::Owner],
            })
    }

    #[must_use]
    pub fn is_kind_enabled(&self, kind: &ArtifactKind) -> bool {
        self.enabled_kinds.is_empty() || self.enabled_kinds.contains(kind)
    }
}
