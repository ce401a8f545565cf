use std::sync::Arc;

use bastion_core::SignerIdentity;
use bastion_ledger::{EntryPayload, Ledger};
use bastion_oracle::{OracleError, OracleResult, SnapshotObserver, VersionedSnapshot};
use tracing::debug;

/// Scope of the chain holding every activated snapshot.
pub const CONTEXT_SCOPE: &str = "context";

const ORACLE_ACTOR: &str = "system:oracle";

/// Persists each snapshot before the oracle activates it.
pub struct LedgerSnapshotObserver {
    ledger: Arc<Ledger>,
}

impl LedgerSnapshotObserver {
    pub fn new(ledger: Arc<Ledger>) -> Self {
        Self { ledger }
    }
}

impl SnapshotObserver for LedgerSnapshotObserver {
    fn on_refresh(&self, snapshot: &VersionedSnapshot) -> OracleResult<()> {
        let entry = self
            .ledger
            .append(
                CONTEXT_SCOPE,
                EntryPayload::ContextRefreshed {
                    version: snapshot.version,
                    snapshot: snapshot.snapshot.clone(),
                },
                SignerIdentity::from(ORACLE_ACTOR),
            )
            .map_err(|e| OracleError::Observer(e.to_string()))?;
        debug!(version = snapshot.version, entry = %entry.id(), "Snapshot recorded");
        Ok(())
    }
}
