//! JSON Lines ledger store.
//!
//! One append-only file per chain epoch, `{dir}/{scope}.{epoch}.jsonl`:
//! - Each line is one complete entry
//! - Files are opened in append mode and never truncated
//! - Unparseable lines are skipped on replay; the resulting gap is reported
//!   by chain verification

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::entry::{ChainId, EntryId, LedgerEntry};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{check_next_sequence, LedgerStore, MemoryStore};

const EXTENSION: &str = "jsonl";

/// Durable store backed by JSON Lines files, with an in-memory index.
pub struct JsonLinesStore {
    dir: PathBuf,
    cache: MemoryStore,
    /// Open writers; also serializes the check-then-write path.
    writers: Mutex<HashMap<ChainId, BufWriter<File>>>,
}

impl JsonLinesStore {
    /// Open (or create) a store directory and replay every chain file in it.
    pub fn open(dir: impl AsRef<Path>) -> LedgerResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let cache = MemoryStore::new();
        let mut files: Vec<(ChainId, PathBuf)> = Vec::new();
        for dirent in fs::read_dir(&dir)? {
            let path = dirent?.path();
            match parse_file_name(&path) {
                Some(chain) => files.push((chain, path)),
                None => debug!(path = %path.display(), "Skipping non-ledger file"),
            }
        }
        files.sort();

        let mut replayed = 0usize;
        for (chain, path) in &files {
            replayed += replay_file(chain, path, &cache)?;
        }

        info!(
            dir = %dir.display(),
            chains = files.len(),
            entries = replayed,
            "Opened JSON Lines ledger store"
        );

        Ok(Self {
            dir,
            cache,
            writers: Mutex::new(HashMap::new()),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn file_path(&self, chain: &ChainId) -> PathBuf {
        self.dir
            .join(format!("{}.{}.{}", chain.scope, chain.epoch, EXTENSION))
    }

    fn open_writer(&self, chain: &ChainId) -> LedgerResult<BufWriter<File>> {
        let path = self.file_path(chain);
        debug!(path = %path.display(), "Opening ledger file (append mode)");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(BufWriter::new(file))
    }
}

fn parse_file_name(path: &Path) -> Option<ChainId> {
    if path.extension()?.to_str()? != EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (scope, epoch) = stem.rsplit_once('.')?;
    ChainId::new(scope, epoch.parse().ok()?).ok()
}

fn replay_file(chain: &ChainId, path: &Path, cache: &MemoryStore) -> LedgerResult<usize> {
    let reader = BufReader::new(File::open(path)?);
    let mut count = 0usize;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LedgerEntry>(&line) {
            Ok(entry) if entry.chain_id() == chain => {
                cache.load_replayed(entry);
                count += 1;
            }
            Ok(entry) => warn!(
                path = %path.display(),
                line = line_no + 1,
                found = %entry.chain_id(),
                "Entry belongs to another chain, skipped"
            ),
            Err(e) => warn!(
                path = %path.display(),
                line = line_no + 1,
                error = %e,
                "Unparseable ledger line, skipped"
            ),
        }
    }
    Ok(count)
}

impl LedgerStore for JsonLinesStore {
    fn insert(&self, entry: LedgerEntry) -> LedgerResult<()> {
        let mut writers = self.writers.lock();

        let last = self.cache.last(entry.chain_id())?.map(|e| e.sequence());
        check_next_sequence(last, &entry)?;

        let line =
            serde_json::to_string(&entry).map_err(|e| LedgerError::Serialization(e.to_string()))?;

        if !writers.contains_key(entry.chain_id()) {
            let writer = self.open_writer(entry.chain_id())?;
            writers.insert(entry.chain_id().clone(), writer);
        }
        let writer = writers
            .get_mut(entry.chain_id())
            .ok_or_else(|| LedgerError::Storage(format!("no writer for {}", entry.chain_id())))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;

        self.cache.insert(entry)
    }

    fn get(&self, id: &EntryId) -> LedgerResult<Option<LedgerEntry>> {
        self.cache.get(id)
    }

    fn range(&self, chain: &ChainId, range: RangeInclusive<u64>) -> LedgerResult<Vec<LedgerEntry>> {
        self.cache.range(chain, range)
    }

    fn last(&self, chain: &ChainId) -> LedgerResult<Option<LedgerEntry>> {
        self.cache.last(chain)
    }

    fn chains(&self) -> LedgerResult<Vec<ChainId>> {
        self.cache.chains()
    }
}

impl Drop for JsonLinesStore {
    fn drop(&mut self) {
        for (chain, writer) in self.writers.get_mut().iter_mut() {
            if let Err(e) = writer.flush() {
                warn!(chain = %chain, error = %e, "Failed to flush ledger file on close");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::EntryPayload;
    use bastion_core::{Digest, SignerIdentity};
    use chrono::Utc;
    use tempfile::TempDir;

    fn entry(chain: &ChainId, sequence: u64, prev: Digest) -> LedgerEntry {
        LedgerEntry::seal(
            chain.clone(),
            sequence,
            prev,
            EntryPayload::Custom {
                kind: "note".to_string(),
                body: serde_json::json!({ "seq": sequence }),
            },
            SignerIdentity::from("alice"),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(
            parse_file_name(Path::new("/tmp/gate.3.jsonl")),
            Some(ChainId::new("gate", 3).unwrap())
        );
        assert_eq!(parse_file_name(Path::new("/tmp/gate.jsonl")), None);
        assert_eq!(parse_file_name(Path::new("/tmp/gate.1.json")), None);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let tmp = TempDir::new().unwrap();
        let chain = ChainId::initial("gate").unwrap();
        let first = entry(&chain, 1, Digest::GENESIS);
        let second = entry(&chain, 2, *first.hash_self());
        {
            let store = JsonLinesStore::open(tmp.path()).unwrap();
            store.insert(first.clone()).unwrap();
            store.insert(second.clone()).unwrap();
        }

        let store = JsonLinesStore::open(tmp.path()).unwrap();
        assert_eq!(store.chains().unwrap(), vec![chain.clone()]);
        assert_eq!(store.get(&first.id()).unwrap(), Some(first));
        assert_eq!(store.last(&chain).unwrap(), Some(second));

        let content = fs::read_to_string(store.file_path(&chain)).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_duplicate_sequence_not_written() {
        let tmp = TempDir::new().unwrap();
        let chain = ChainId::initial("gate").unwrap();
        let store = JsonLinesStore::open(tmp.path()).unwrap();
        store.insert(entry(&chain, 1, Digest::GENESIS)).unwrap();
        assert!(store.insert(entry(&chain, 1, Digest::GENESIS)).is_err());

        let content = fs::read_to_string(store.file_path(&chain)).unwrap();
        assert_eq!(content.lines().count(), 1);
    }

    #[test]
    fn test_corrupt_line_skipped_on_replay() {
        let tmp = TempDir::new().unwrap();
        let chain = ChainId::initial("gate").unwrap();
        let first = entry(&chain, 1, Digest::GENESIS);
        let second = entry(&chain, 2, *first.hash_self());
        {
            let store = JsonLinesStore::open(tmp.path()).unwrap();
            store.insert(first).unwrap();
            store.insert(second.clone()).unwrap();
        }
        let path = tmp.path().join("gate.0.jsonl");
        let content = fs::read_to_string(&path).unwrap();
        let mut lines: Vec<&str> = content.lines().collect();
        lines[0] = "{not json";
        fs::write(&path, lines.join("\n")).unwrap();

        let store = JsonLinesStore::open(tmp.path()).unwrap();
        let entries = store.range(&chain, 1..=10).unwrap();
        assert_eq!(entries, vec![second]);
    }
}
