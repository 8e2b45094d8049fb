//! Key-addressed JSON cache with two independent kinds.
//!
//! Layout: `{root}/{kind}/{TICKER}/{blake3(key)}.json`
//!
//! - Each file holds a [`CacheEntry`]: the full key, the payload, and a fetch
//!   timestamp kept for observability only. There is no expiry.
//! - Writes go to a uniquely named temp file and are renamed into place, so a
//!   reader sees either the old entry or the new one and the last writer wins.
//! - A file that fails to parse, or whose stored key does not match the key it
//!   was looked up by, is renamed to `{file}.quarantined` and reported as
//!   [`CacheError::CorruptEntry`]. Callers treat that as a miss.
//! - Lookups and writes share a read gate; invalidation takes the write side,
//!   so a clear is never observed half-done.

use crate::moves::MoveKey;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Namespace partition of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Prices,
    Annotations,
}

impl CacheKind {
    pub const ALL: [CacheKind; 2] = [CacheKind::Prices, CacheKind::Annotations];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Prices => "prices",
            Self::Annotations => "annotations",
        }
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic cache key, rendered as `{kind}:{ticker}:{discriminator}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: CacheKind,
    ticker: String,
    discriminator: String,
}

impl CacheKey {
    /// Key for a price series over `[start, end]`.
    pub fn prices(ticker: &str, start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            kind: CacheKind::Prices,
            ticker: ticker.to_string(),
            discriminator: format!("{start}|{end}"),
        }
    }

    /// Key for the annotation of one move.
    pub fn annotation(ticker: &str, move_key: &MoveKey) -> Self {
        Self {
            kind: CacheKind::Annotations,
            ticker: ticker.to_string(),
            discriminator: move_key.to_string(),
        }
    }

    pub fn kind(&self) -> CacheKind {
        self.kind
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    fn file_stem(&self) -> String {
        blake3::hash(self.to_string().as_bytes()).to_hex().to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.ticker, self.discriminator)
    }
}

/// A stored cache record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub payload: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("corrupt cache entry {key}: {reason}")]
    CorruptEntry { key: String, reason: String },

    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cache serialization error: {0}")]
    Serialization(String),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Entry counts and on-disk size for one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub entries: usize,
    pub tickers: usize,
    pub bytes: u64,
    pub quarantined: usize,
}

/// Snapshot of the whole cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub prices: KindStats,
    pub annotations: KindStats,
}

impl CacheStats {
    pub fn kind(&self, kind: CacheKind) -> &KindStats {
        match kind {
            CacheKind::Prices => &self.prices,
            CacheKind::Annotations => &self.annotations,
        }
    }

    pub fn total_entries(&self) -> usize {
        self.prices.entries + self.annotations.entries
    }
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// The cache store. Share it by reference or `Arc`; it has no global state.
#[derive(Debug)]
pub struct CacheStore {
    root: PathBuf,
    gate: RwLock<()>,
}

impl CacheStore {
    /// Open a store rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            gate: RwLock::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn kind_dir(&self, kind: CacheKind) -> PathBuf {
        self.root.join(kind.as_str())
    }

    fn ticker_dir(&self, kind: CacheKind, ticker: &str) -> PathBuf {
        self.kind_dir(kind).join(sanitize_ticker(ticker))
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.ticker_dir(key.kind, &key.ticker)
            .join(format!("{}.json", key.file_stem()))
    }

    fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up and decode a payload.
    ///
    /// `Ok(None)` means absent. A payload that cannot be decoded as `T` is
    /// quarantined like any other corrupt entry.
    pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>, CacheError> {
        let _gate = self.read_gate();
        let path = self.entry_path(key);

        let Some(entry) = self.read_entry(&path, key)? else {
            tracing::debug!(key = %key, "cache miss");
            return Ok(None);
        };

        match serde_json::from_value(entry.payload) {
            Ok(value) => {
                tracing::debug!(key = %key, fetched_at = %entry.fetched_at, "cache hit");
                Ok(Some(value))
            }
            Err(e) => Err(self.quarantine(&path, key, format!("payload: {e}"))),
        }
    }

    /// Look up the raw entry, payload undecoded.
    pub fn get_entry(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let _gate = self.read_gate();
        self.read_entry(&self.entry_path(key), key)
    }

    fn read_entry(&self, path: &Path, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => return Err(self.quarantine(path, key, e.to_string())),
        };

        let expected = key.to_string();
        if entry.key != expected {
            let reason = format!("stored key {:?} does not match", entry.key);
            return Err(self.quarantine(path, key, reason));
        }

        Ok(Some(entry))
    }

    fn quarantine(&self, path: &Path, key: &CacheKey, reason: String) -> CacheError {
        let target = path.with_extension("json.quarantined");
        tracing::warn!(
            path = %path.display(),
            reason = %reason,
            "quarantining corrupt cache entry"
        );
        if let Err(e) = fs::rename(path, &target) {
            tracing::warn!(path = %path.display(), error = %e, "quarantine rename failed");
        }
        CacheError::CorruptEntry {
            key: key.to_string(),
            reason,
        }
    }

    /// Store a payload, replacing any previous entry for the key.
    pub fn put<T: Serialize>(&self, key: &CacheKey, payload: &T) -> Result<(), CacheError> {
        let _gate = self.read_gate();

        let entry = CacheEntry {
            key: key.to_string(),
            payload: serde_json::to_value(payload)
                .map_err(|e| CacheError::Serialization(e.to_string()))?,
            fetched_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&entry)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;

        let path = self.entry_path(key);
        let dir = self.ticker_dir(key.kind, &key.ticker);
        fs::create_dir_all(&dir).map_err(|e| CacheError::io(&dir, e))?;

        let tmp_path = dir.join(format!(
            ".{}.{}.{}.tmp",
            key.file_stem(),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&tmp_path, &json).map_err(|e| CacheError::io(&tmp_path, e))?;

        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            CacheError::io(&path, e)
        })?;

        tracing::debug!(key = %key, bytes = json.len(), "cache write");
        Ok(())
    }

    /// Remove one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let _gate = self.write_gate();
        let path = self.entry_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    /// Remove every entry of both kinds for one ticker.
    pub fn invalidate_ticker(&self, ticker: &str) -> Result<usize, CacheError> {
        let _gate = self.write_gate();
        let mut removed = 0;
        for kind in CacheKind::ALL {
            removed += remove_tree(&self.ticker_dir(kind, ticker), 0)?;
        }
        tracing::info!(ticker, removed, "cleared cached entries for ticker");
        Ok(removed)
    }

    /// Remove every entry of one kind.
    pub fn invalidate_kind(&self, kind: CacheKind) -> Result<usize, CacheError> {
        let _gate = self.write_gate();
        let removed = remove_tree(&self.kind_dir(kind), 1)?;
        tracing::info!(kind = %kind, removed, "cleared cache kind");
        Ok(removed)
    }

    /// Remove every entry of both kinds.
    pub fn invalidate_all(&self) -> Result<usize, CacheError> {
        let _gate = self.write_gate();
        let mut removed = 0;
        for kind in CacheKind::ALL {
            removed += remove_tree(&self.kind_dir(kind), 1)?;
        }
        tracing::info!(removed, "cleared cache");
        Ok(removed)
    }

    /// Per-kind counts and sizes.
    pub fn status(&self) -> Result<CacheStats, CacheError> {
        let _gate = self.read_gate();
        Ok(CacheStats {
            prices: self.kind_stats(CacheKind::Prices)?,
            annotations: self.kind_stats(CacheKind::Annotations)?,
        })
    }

    fn kind_stats(&self, kind: CacheKind) -> Result<KindStats, CacheError> {
        let mut stats = KindStats::default();
        for ticker_dir in list_dir(&self.kind_dir(kind))? {
            if !ticker_dir.is_dir() {
                continue;
            }
            let before = stats.entries;
            for file in list_dir(&ticker_dir)? {
                match file_class(&file) {
                    FileClass::Entry => {
                        stats.entries += 1;
                        stats.bytes += fs::metadata(&file).map(|m| m.len()).unwrap_or(0);
                    }
                    FileClass::Quarantined => stats.quarantined += 1,
                    FileClass::Other => {}
                }
            }
            if stats.entries > before {
                stats.tickers += 1;
            }
        }
        Ok(stats)
    }
}

enum FileClass {
    Entry,
    Quarantined,
    Other,
}

fn file_class(path: &Path) -> FileClass {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") if path.is_file() => FileClass::Entry,
        Some("quarantined") => FileClass::Quarantined,
        _ => FileClass::Other,
    }
}

/// Directory listing; a missing directory is empty.
fn list_dir(dir: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(CacheError::io(dir, e)),
    };
    entries
        .map(|entry| entry.map(|e| e.path()).map_err(|e| CacheError::io(dir, e)))
        .collect()
}

/// Count entries under `dir` (descending `depth` levels of ticker dirs), then
/// remove the whole tree.
fn remove_tree(dir: &Path, depth: usize) -> Result<usize, CacheError> {
    let mut count = 0;
    for path in list_dir(dir)? {
        if depth > 0 && path.is_dir() {
            count += list_dir(&path)?
                .iter()
                .filter(|p| matches!(file_class(p), FileClass::Entry))
                .count();
        } else if matches!(file_class(&path), FileClass::Entry) {
            count += 1;
        }
    }
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(count),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(count),
        Err(e) => Err(CacheError::io(dir, e)),
    }
}

/// Map a ticker to a single safe path component.
///
/// Tickers that need rewriting get a short hash of the raw ticker appended
/// after a `.`, which never survives rewriting, so `BRK.B` and `BRK_B` keep
/// separate directories.
fn sanitize_ticker(ticker: &str) -> String {
    let cleaned: String = ticker
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '^' | '=') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if !cleaned.is_empty() && cleaned == ticker {
        return cleaned;
    }

    let hash = blake3::hash(ticker.as_bytes()).to_hex();
    let base = if cleaned.is_empty() { "_" } else { cleaned.as_str() };
    format!("{base}.{}", &hash.as_str()[..8])
}
