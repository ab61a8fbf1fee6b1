//! RosterForge Cache - persistent strict-adherence ratio cache
//!
//! Maps pattern hashes to the ratio the autotune sweep found optimal, so a
//! structurally identical problem skips the sweep entirely. The store is one
//! JSON file shared across processes: writers take an exclusive advisory
//! lock for the read-modify-write, readers verify an embedded checksum and
//! re-read on mismatch. The cache is value-typed and passed explicitly into
//! the solve; it is never a process singleton.

pub mod hash;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs4::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use hash::pattern_hash;

/// Cache format version; bumped on incompatible layout changes.
const CACHE_VERSION: u32 = 1;

/// How often a reader retries after a checksum mismatch before giving up.
const CHECKSUM_RETRIES: usize = 3;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache file is corrupt: {0}")]
    Corrupt(String),

    #[error("unsupported cache version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

/// One cached autotune outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub optimal_ratio: f64,
    pub employees_used: u32,
    /// ISO-8601 timestamp of the last upsert.
    pub last_updated: String,
    pub usage_count: u64,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    /// Checksum over the serialized `entries` map.
    checksum: String,
    entries: BTreeMap<String, CacheEntry>,
}

impl CacheFile {
    fn empty() -> Self {
        CacheFile {
            version: CACHE_VERSION,
            checksum: hash::content_checksum(b"{}"),
            entries: BTreeMap::new(),
        }
    }

    fn compute_checksum(entries: &BTreeMap<String, CacheEntry>) -> String {
        let bytes = serde_json::to_vec(entries).unwrap_or_default();
        hash::content_checksum(&bytes)
    }

    fn is_consistent(&self) -> bool {
        self.checksum == Self::compute_checksum(&self.entries)
    }
}

/// Aggregate cache statistics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub entries: usize,
    pub total_usage: u64,
    pub version: u32,
}

/// File-backed ratio cache.
#[derive(Debug, Clone)]
pub struct RatioCache {
    path: PathBuf,
}

impl RatioCache {
    /// Opens (without creating) a cache at `path`. The file is created lazily
    /// on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        RatioCache { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Looks up an entry without bumping its usage count.
    pub fn lookup(&self, pattern_hash: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.read_file()?.entries.get(pattern_hash).cloned())
    }

    /// Upserts the winning ratio for a pattern and bumps its usage count.
    pub fn record(
        &self,
        pattern_hash: &str,
        optimal_ratio: f64,
        employees_used: u32,
        metadata: serde_json::Value,
    ) -> Result<(), CacheError> {
        self.mutate(|entries| {
            let usage = entries
                .get(pattern_hash)
                .map(|e| e.usage_count + 1)
                .unwrap_or(1);
            entries.insert(
                pattern_hash.to_string(),
                CacheEntry {
                    optimal_ratio,
                    employees_used,
                    last_updated: chrono::Utc::now().to_rfc3339(),
                    usage_count: usage,
                    metadata,
                },
            );
        })
    }

    /// Bumps the usage counter of an entry after a cache hit.
    pub fn touch(&self, pattern_hash: &str) -> Result<(), CacheError> {
        self.mutate(|entries| {
            if let Some(e) = entries.get_mut(pattern_hash) {
                e.usage_count += 1;
                e.last_updated = chrono::Utc::now().to_rfc3339();
            }
        })
    }

    /// Removes one entry. Returns whether it existed.
    pub fn invalidate(&self, pattern_hash: &str) -> Result<bool, CacheError> {
        let mut existed = false;
        self.mutate(|entries| {
            existed = entries.remove(pattern_hash).is_some();
        })?;
        Ok(existed)
    }

    /// Drops every entry.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.mutate(|entries| entries.clear())
    }

    /// Lists all entries sorted by hash.
    pub fn list(&self) -> Result<Vec<(String, CacheEntry)>, CacheError> {
        Ok(self.read_file()?.entries.into_iter().collect())
    }

    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let file = self.read_file()?;
        Ok(CacheStats {
            entries: file.entries.len(),
            total_usage: file.entries.values().map(|e| e.usage_count).sum(),
            version: file.version,
        })
    }

    /// Serializes the whole cache to a JSON string (the exchange format for
    /// the export/import CLI commands).
    pub fn export(&self) -> Result<String, CacheError> {
        let file = self.read_file()?;
        serde_json::to_string_pretty(&file).map_err(|e| CacheError::Corrupt(e.to_string()))
    }

    /// Merges entries from an exported document; newer `lastUpdated` wins.
    pub fn import(&self, exported: &str) -> Result<usize, CacheError> {
        let incoming: CacheFile =
            serde_json::from_str(exported).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        if incoming.version != CACHE_VERSION {
            return Err(CacheError::Version {
                found: incoming.version,
                expected: CACHE_VERSION,
            });
        }
        let mut merged = 0;
        self.mutate(|entries| {
            for (key, entry) in incoming.entries {
                let keep = match entries.get(&key) {
                    Some(existing) => entry.last_updated > existing.last_updated,
                    None => true,
                };
                if keep {
                    entries.insert(key, entry);
                    merged += 1;
                }
            }
        })?;
        Ok(merged)
    }

    /// Lock-free read tolerating concurrent writers: on checksum mismatch the
    /// read is retried, and after the retry budget the file is treated as
    /// empty rather than failing the solve.
    fn read_file(&self) -> Result<CacheFile, CacheError> {
        if !self.path.exists() {
            return Ok(CacheFile::empty());
        }
        for _ in 0..CHECKSUM_RETRIES {
            let contents = std::fs::read_to_string(&self.path)?;
            if contents.trim().is_empty() {
                return Ok(CacheFile::empty());
            }
            let parsed: Result<CacheFile, _> = serde_json::from_str(&contents);
            match parsed {
                Ok(file) if file.version != CACHE_VERSION => {
                    return Err(CacheError::Version {
                        found: file.version,
                        expected: CACHE_VERSION,
                    })
                }
                Ok(file) if file.is_consistent() => return Ok(file),
                Ok(_) | Err(_) => {
                    std::thread::yield_now();
                    continue;
                }
            }
        }
        tracing::warn!(path = %self.path.display(), "ratio cache failed checksum after retries; treating as empty");
        Ok(CacheFile::empty())
    }

    /// Exclusive-locked read-modify-write.
    fn mutate(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, CacheEntry>),
    ) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        file.lock_exclusive()?;
        let result = self.mutate_locked(&mut file, f);
        let _ = FileExt::unlock(&file);
        result
    }

    fn mutate_locked(
        &self,
        file: &mut File,
        f: impl FnOnce(&mut BTreeMap<String, CacheEntry>),
    ) -> Result<(), CacheError> {
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let mut cache = if contents.trim().is_empty() {
            CacheFile::empty()
        } else {
            serde_json::from_str(&contents).unwrap_or_else(|_| CacheFile::empty())
        };

        f(&mut cache.entries);
        cache.version = CACHE_VERSION;
        cache.checksum = CacheFile::compute_checksum(&cache.entries);

        let serialized =
            serde_json::to_string_pretty(&cache).map_err(|e| CacheError::Corrupt(e.to_string()))?;
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        file.write_all(serialized.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache() -> (TempDir, RatioCache) {
        let dir = TempDir::new().unwrap();
        let cache = RatioCache::open(dir.path().join("ratios.json"));
        (dir, cache)
    }

    #[test]
    fn lookup_on_missing_file_is_empty() {
        let (_dir, cache) = cache();
        assert!(cache.lookup("deadbeef").unwrap().is_none());
        assert_eq!(cache.stats().unwrap().entries, 0);
    }

    #[test]
    fn record_then_lookup() {
        let (_dir, cache) = cache();
        cache
            .record("abc123", 0.7, 20, serde_json::Value::Null)
            .unwrap();
        let entry = cache.lookup("abc123").unwrap().unwrap();
        assert_eq!(entry.optimal_ratio, 0.7);
        assert_eq!(entry.employees_used, 20);
        assert_eq!(entry.usage_count, 1);
    }

    #[test]
    fn record_twice_bumps_usage() {
        let (_dir, cache) = cache();
        cache.record("k", 0.6, 10, serde_json::Value::Null).unwrap();
        cache.record("k", 0.65, 9, serde_json::Value::Null).unwrap();
        let entry = cache.lookup("k").unwrap().unwrap();
        assert_eq!(entry.usage_count, 2);
        assert_eq!(entry.optimal_ratio, 0.65);
    }

    #[test]
    fn touch_bumps_usage_only() {
        let (_dir, cache) = cache();
        cache.record("k", 0.6, 10, serde_json::Value::Null).unwrap();
        cache.touch("k").unwrap();
        let entry = cache.lookup("k").unwrap().unwrap();
        assert_eq!(entry.usage_count, 2);
        assert_eq!(entry.optimal_ratio, 0.6);
    }

    #[test]
    fn invalidate_and_clear() {
        let (_dir, cache) = cache();
        cache.record("a", 0.5, 5, serde_json::Value::Null).unwrap();
        cache.record("b", 0.8, 8, serde_json::Value::Null).unwrap();
        assert!(cache.invalidate("a").unwrap());
        assert!(!cache.invalidate("a").unwrap());
        cache.clear().unwrap();
        assert_eq!(cache.stats().unwrap().entries, 0);
    }

    #[test]
    fn export_import_round_trip() {
        let (_dir, cache) = cache();
        cache.record("a", 0.5, 5, serde_json::Value::Null).unwrap();
        let exported = cache.export().unwrap();

        let dir2 = TempDir::new().unwrap();
        let other = RatioCache::open(dir2.path().join("ratios.json"));
        let merged = other.import(&exported).unwrap();
        assert_eq!(merged, 1);
        assert_eq!(other.lookup("a").unwrap().unwrap().employees_used, 5);
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let (_dir, cache) = cache();
        std::fs::write(cache.path(), "not json at all").unwrap();
        assert!(cache.lookup("x").unwrap().is_none());
        // A write repairs the file.
        cache.record("x", 0.7, 1, serde_json::Value::Null).unwrap();
        assert!(cache.lookup("x").unwrap().is_some());
    }

    #[test]
    fn checksum_detects_tampering() {
        let (_dir, cache) = cache();
        cache.record("a", 0.5, 5, serde_json::Value::Null).unwrap();
        let mut raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(cache.path()).unwrap()).unwrap();
        raw["entries"]["a"]["employeesUsed"] = serde_json::json!(99);
        std::fs::write(cache.path(), raw.to_string()).unwrap();
        // Checksum mismatch: reader falls back to empty rather than serving
        // a torn write.
        assert!(cache.lookup("a").unwrap().is_none());
    }
}
