use crate::error::OracleResult;
use crate::oracle::VersionedSnapshot;

/// Notified before a refreshed snapshot becomes active.
///
/// An error aborts the refresh; the previous snapshot stays active.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotObserver: Send + Sync {
    fn on_refresh(&self, snapshot: &VersionedSnapshot) -> OracleResult<()>;
}
