use bastion_core::{SignerIdentity, SignerRole};
use bastion_ledger::{EntryId, LedgerError};
use thiserror::Error;

use crate::keys::KeyError;

#[derive(Debug, Error)]
pub enum AttestError {
    #[error("Unauthorized signer {identity}: {reason}")]
    UnauthorizedSigner {
        identity: SignerIdentity,
        reason: String,
    },

    #[error("{identity} already signed {entry_id}")]
    AlreadySigned {
        entry_id: EntryId,
        identity: SignerIdentity,
    },

    #[error("Role {role} already attested {entry_id}")]
    RoleAlreadyAttested { entry_id: EntryId, role: SignerRole },

    #[error("No pending attestation request for {0}")]
    NoPendingRequest(EntryId),

    #[error("Attestation already requested for {0}")]
    AlreadyRequested(EntryId),

    #[error("Attestation request for {0} names no roles")]
    EmptyRoleSet(EntryId),

    #[error("Entry not found: {0}")]
    EntryNotFound(EntryId),

    #[error("Signing {entry_id} timed out after {timeout_ms}ms")]
    Timeout { entry_id: EntryId, timeout_ms: u64 },

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Invalid signer address: {0}")]
    InvalidAddress(String),

    #[error("Signer {0} registered twice")]
    DuplicateSigner(SignerIdentity),

    #[error("Signing failed: {0}")]
    Signing(#[from] alloy::signers::Error),

    #[error("Key error: {0}")]
    Key(#[from] KeyError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type AttestResult<T> = Result<T, AttestError>;
