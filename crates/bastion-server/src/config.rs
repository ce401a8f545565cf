//! Application configuration.
//!
//! One TOML section per component; every field has a default, so an empty
//! file is a valid configuration. `BASTION_<SECTION>__<FIELD>` environment
//! variables override the file.

use std::path::PathBuf;

use bastion_attest::AttestationConfig;
use bastion_gate::GateConfig;
use bastion_ledger::LedgerConfig;
use bastion_oracle::OracleConfig;
use bastion_pipeline::PipelineConfig;
use bastion_signal::SignalConfig;
use bastion_telemetry::LoggingConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// In-process only; lost on restart.
    Memory,
    /// One JSON Lines file per chain epoch.
    #[default]
    Jsonl,
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("data/ledger")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_storage_dir")]
    pub dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            dir: default_storage_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub telemetry: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub attestation: AttestationConfig,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Parse a TOML file, without environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` (optional) layered with `BASTION_*` environment overrides.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::new(path, config::FileFormat::Toml).required(true),
            );
        }
        let config: Self = builder
            .add_source(
                config::Environment::with_prefix("BASTION")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| AppError::Config(format!("Failed to load config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks serde defaults cannot express.
    pub fn validate(&self) -> AppResult<()> {
        let oracle = &self.oracle;
        if oracle.fresh_secs <= 0 || oracle.stale_secs <= oracle.fresh_secs {
            return Err(AppError::Config(format!(
                "oracle thresholds must satisfy 0 < fresh_secs ({}) < stale_secs ({})",
                oracle.fresh_secs, oracle.stale_secs
            )));
        }
        if !(Decimal::ZERO..=Decimal::ONE)
            .contains(&oracle.degraded_confidence_floor)
        {
            return Err(AppError::Config(format!(
                "oracle.degraded_confidence_floor {} outside [0, 1]",
                oracle.degraded_confidence_floor
            )));
        }
        if self.gate.max_recalibration_delta.is_sign_negative() {
            return Err(AppError::Config(
                "gate.max_recalibration_delta must not be negative".to_string(),
            ));
        }
        if self.pipeline.hourly_cap == 0 {
            return Err(AppError::Config(
                "pipeline.hourly_cap must be positive".to_string(),
            ));
        }
        if self.pipeline.rollback_window_secs < 0 || self.pipeline.shadow_window_secs < 0 {
            return Err(AppError::Config(
                "pipeline windows must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{SignerRole, Stage};
    use rust_decimal_macros::dec;
    use std::io::Write;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.oracle.fresh_secs, 15);
        assert_eq!(config.oracle.stale_secs, 300);
        assert_eq!(config.oracle.degraded_confidence_floor, dec!(0.70));
        assert_eq!(config.gate.max_recalibration_delta, dec!(0.10));
        assert_eq!(config.pipeline.hourly_cap, 50);
        assert_eq!(config.ledger.max_append_retries, 8);
        assert_eq!(config.storage.backend, StorageBackend::Jsonl);
    }

    #[test]
    fn test_sections_parse() {
        let toml = r#"
[storage]
backend = "memory"

[oracle]
fresh_secs = 10
degraded_confidence_floor = "0.8"

[pipeline]
hourly_cap = 5
required_stage = "OPERATIONAL_TEST"

[[attestation.signers]]
identity = "alice"
role = "owner"
address = "0x0000000000000000000000000000000000000001"
"#;
        let config = AppConfig::from_toml(toml).unwrap();
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.oracle.fresh_secs, 10);
        assert_eq!(config.oracle.stale_secs, 300);
        assert_eq!(config.oracle.degraded_confidence_floor, dec!(0.8));
        assert_eq!(config.pipeline.required_stage, Stage::OperationalTest);
        assert_eq!(config.attestation.signers[0].role, SignerRole::Owner);
    }

    #[test]
    fn test_shipped_default_file_parses() {
        let config = AppConfig::from_toml(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.pipeline.sla_ceilings_ms.len(), 2);
        assert_eq!(config.oracle.degraded_confidence_floor, dec!(0.70));
    }

    #[test]
    fn test_unknown_taxonomy_value_rejected() {
        let toml = r#"
[[attestation.signers]]
identity = "mallory"
role = "janitor"
address = "0x0000000000000000000000000000000000000001"
"#;
        assert!(matches!(
            AppConfig::from_toml(toml),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_validate_thresholds() {
        let inverted = "[oracle]\nfresh_secs = 400\n";
        assert!(AppConfig::from_toml(inverted).is_err());
        let floor = "[oracle]\ndegraded_confidence_floor = \"1.5\"\n";
        assert!(AppConfig::from_toml(floor).is_err());
        let cap = "[pipeline]\nhourly_cap = 0\n";
        assert!(AppConfig::from_toml(cap).is_err());
    }

    #[test]
    fn test_load_layers_environment() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[signal]\ncooling_min_cycles = 2\n\n[oracle]\nfresh_secs = 20").unwrap();

        std::env::set_var("BASTION_SIGNAL__COOLING_MIN_CYCLES", "7");
        let loaded = AppConfig::load(file.path().to_str());
        std::env::remove_var("BASTION_SIGNAL__COOLING_MIN_CYCLES");

        let config = loaded.unwrap();
        assert_eq!(config.signal.cooling_min_cycles, 7);
        assert_eq!(config.oracle.fresh_secs, 20);
        assert_eq!(config.oracle.stale_secs, 300);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(matches!(
            AppConfig::load(Some("/nonexistent/bastion.toml")),
            Err(AppError::Config(_))
        ));
    }
}
