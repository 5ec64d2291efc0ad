//! Durable per-install-directory transfer ledger.
//!
//! The ledger maps relative file paths to bytes already written locally,
//! allowing a restarted download to continue where it stopped. Its absence
//! means "nothing in progress", not "never downloaded": it is deleted once
//! every entry is complete.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Ledger file name, colocated with the downloaded content.
pub const LEDGER_FILE: &str = ".depot-progress.json";

/// Progress record for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Declared size from the catalog when the entry was created.
    pub size: u64,
    /// Bytes actually written to the local file. The local file's length
    /// must always match this value, even across crashes: bytes are
    /// written first and recorded after, never the other way around.
    pub downloaded: u64,
}

impl LedgerEntry {
    /// True when the recorded bytes cover the declared size.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.downloaded >= self.size
    }
}

/// Mapping of relative path to progress, persisted as JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl TransferLedger {
    fn file_path(install_dir: &Path) -> PathBuf {
        install_dir.join(LEDGER_FILE)
    }

    /// Loads the ledger for an install directory.
    ///
    /// A missing or unparseable file yields an empty ledger: a corrupt
    /// ledger means "start over", never a fatal error.
    #[must_use]
    pub fn load(install_dir: &Path) -> Self {
        std::fs::read_to_string(Self::file_path(install_dir))
            .ok()
            .and_then(|contents| serde_json::from_str(&contents).ok())
            .unwrap_or_default()
    }

    /// Persists the ledger atomically (write tmp + rename), so a crash
    /// mid-save leaves either the old or the new content on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be written or renamed.
    pub fn save(&self, install_dir: &Path) -> std::io::Result<()> {
        let path = Self::file_path(install_dir);
        let tmp_path = path.with_extension("json.tmp");

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &path)
    }

    /// Removes the ledger file for an install directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete(install_dir: &Path) -> std::io::Result<()> {
        std::fs::remove_file(Self::file_path(install_dir))
    }

    /// Looks up the record for a relative path.
    #[must_use]
    pub fn entry(&self, path: &str) -> Option<LedgerEntry> {
        self.entries.get(path).copied()
    }

    /// Inserts a zeroed record for `path` unless one is already tracked.
    pub fn track(&mut self, path: &str, size: u64) {
        self.entries
            .entry(path.to_string())
            .or_insert(LedgerEntry { size, downloaded: 0 });
    }

    /// Inserts a record marked fully downloaded, for files found complete
    /// on disk before any ledger existed.
    pub fn track_complete(&mut self, path: &str, size: u64) {
        self.entries
            .entry(path.to_string())
            .or_insert(LedgerEntry { size, downloaded: size });
    }

    /// Advances a record's byte counter after a successful local write.
    pub fn record(&mut self, path: &str, bytes: u64) {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.downloaded += bytes;
        }
    }

    /// Sum of bytes written across all entries.
    #[must_use]
    pub fn total_downloaded(&self) -> u64 {
        self.entries.values().map(|e| e.downloaded).sum()
    }

    /// Sum of declared sizes across all entries.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.size).sum()
    }

    /// True when every tracked entry is complete.
    #[must_use]
    pub fn all_complete(&self) -> bool {
        self.entries.values().all(LedgerEntry::is_complete)
    }

    /// True when nothing is tracked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
