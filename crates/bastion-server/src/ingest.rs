//! JSON Lines snapshot reader.
//!
//! Each non-blank line is one `ContextSnapshot`. Malformed lines are logged
//! and skipped so one bad record does not stop the feed.

use std::path::PathBuf;

use bastion_core::ContextSnapshot;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::AppResult;

/// Where snapshots are read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotSource {
    Stdin,
    File(PathBuf),
}

impl SnapshotSource {
    /// `-` selects stdin.
    #[must_use]
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            Self::Stdin
        } else {
            Self::File(PathBuf::from(arg))
        }
    }
}

/// Parse one line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> AppResult<Option<ContextSnapshot>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(trimmed)?))
}

/// Forward every parsed snapshot from `reader` to `tx`. Returns the number
/// forwarded.
pub async fn forward_lines<R>(reader: R, tx: &mpsc::Sender<ContextSnapshot>) -> AppResult<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0u64;
    let mut forwarded = 0u64;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        match parse_line(&line) {
            Ok(Some(snapshot)) => {
                if tx.send(snapshot).await.is_err() {
                    break;
                }
                forwarded += 1;
            }
            Ok(None) => {}
            Err(e) => warn!(line = line_no, error = %e, "Skipping malformed snapshot line"),
        }
    }
    Ok(forwarded)
}

/// Spawn a reader task for `source`.
pub fn spawn_reader(
    source: SnapshotSource,
    tx: mpsc::Sender<ContextSnapshot>,
) -> JoinHandle<AppResult<u64>> {
    tokio::spawn(async move {
        let forwarded = match &source {
            SnapshotSource::Stdin => {
                forward_lines(BufReader::new(tokio::io::stdin()), &tx).await?
            }
            SnapshotSource::File(path) => {
                let file = tokio::fs::File::open(path).await?;
                forward_lines(BufReader::new(file), &tx).await?
            }
        };
        info!(?source, forwarded, "Snapshot source exhausted");
        Ok(forwarded)
    })
}
