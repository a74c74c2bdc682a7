//! Per-file parse cache keyed by `(path, size, mtime)`.
//!
//! mtime plus size is deliberately the whole key: no content hashing.
//! The cache lives in one JSON file next to the index cache and follows
//! the same integrity rules: corrupt file resets to empty, invalid
//! entries are dropped, writes are atomic and happen once per run.

use crate::parser::ParseResult;
use crate::warning::{Warning, WarningKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

const SCHEMA_VERSION: u32 = 1;

/// Identity of a file's content as far as the cache is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileFingerprint {
    pub path: String,
    pub size: u64,
    pub mtime_ns: u64,
}

impl FileFingerprint {
    /// Fingerprint from lstat metadata; symlinks are never parsed so the
    /// link itself is never fingerprinted.
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::symlink_metadata(path)?;
        let mtime_ns = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Ok(Self {
            path: path.to_string_lossy().into_owned(),
            size: meta.len(),
            mtime_ns,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheSlot {
    size: u64,
    mtime_ns: u64,
    #[serde(flatten)]
    result: ParseResult,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: HashMap<String, Value>,
}

pub struct ParseCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheSlot>>,
    dirty: AtomicBool,
    load_warning: Option<Warning>,
}

impl ParseCache {
    /// Load from disk; a missing file is an empty cache, a corrupt file
    /// resets to empty with a warning.
    pub fn load(path: PathBuf) -> Self {
        let mut load_warning = None;
        let entries = match std::fs::read(&path) {
            Err(_) => HashMap::new(),
            Ok(bytes) => match serde_json::from_slice::<CacheFile>(&bytes) {
                Ok(file) if file.version == SCHEMA_VERSION => file
                    .entries
                    .into_iter()
                    .filter_map(|(key, raw)| {
                        // Invalid slots are dropped, not fatal.
                        serde_json::from_value::<CacheSlot>(raw)
                            .ok()
                            .map(|slot| (key, slot))
                    })
                    .collect(),
                Ok(file) => {
                    log::warn!(
                        "Parse cache {} has schema version {}, resetting",
                        path.display(),
                        file.version
                    );
                    load_warning = Some(Warning::new(
                        WarningKind::CacheCorruption,
                        path.display().to_string(),
                        "unsupported schema version, cache reset".to_string(),
                    ));
                    HashMap::new()
                }
                Err(err) => {
                    log::warn!("Parse cache {} corrupted: {err}", path.display());
                    load_warning = Some(Warning::new(
                        WarningKind::CacheCorruption,
                        path.display().to_string(),
                        format!("cache reset: {err}"),
                    ));
                    HashMap::new()
                }
            },
        };
        Self {
            path,
            entries: Mutex::new(entries),
            dirty: AtomicBool::new(false),
            load_warning,
        }
    }

    pub fn load_warning(&self) -> Option<Warning> {
        self.load_warning.clone()
    }

    pub fn get(&self, fingerprint: &FileFingerprint) -> Option<ParseResult> {
        let entries = self.entries.lock().expect("parse cache mutex poisoned");
        let slot = entries.get(&fingerprint.path)?;
        if slot.size != fingerprint.size || slot.mtime_ns != fingerprint.mtime_ns {
            return None;
        }
        Some(slot.result.clone())
    }

    pub fn put(&self, fingerprint: FileFingerprint, result: &ParseResult) {
        let mut entries = self.entries.lock().expect("parse cache mutex poisoned");
        entries.insert(
            fingerprint.path,
            CacheSlot {
                size: fingerprint.size,
                mtime_ns: fingerprint.mtime_ns,
                result: result.clone(),
            },
        );
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Atomic persist: temp file in the same directory, then rename.
    pub fn save(&self) -> std::io::Result<()> {
        if !self.dirty.load(Ordering::Relaxed) {
            return Ok(());
        }
        let entries = self.entries.lock().expect("parse cache mutex poisoned");
        let file = CacheFile {
            version: SCHEMA_VERSION,
            entries: entries
                .iter()
                .map(|(key, slot)| {
                    (
                        key.clone(),
                        serde_json::to_value(slot).unwrap_or(Value::Null),
                    )
                })
                .collect(),
        };
        drop(entries);

        write_private_atomic(&self.path, &serde_json::to_vec(&file)?)
    }
}

/// Write `bytes` to `path` with owner-only permissions via a temp file
/// and rename in the same directory.
pub(crate) fn write_private_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
    }
    match std::fs::rename(&tmp, path) {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = std::fs::remove_file(&tmp);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn sample_result() -> ParseResult {
        ParseResult {
            runtime: BTreeSet::from(["requests".to_string()]),
            typing: BTreeSet::from(["numpy".to_string()]),
            dynamic: BTreeSet::new(),
            dsn: BTreeSet::new(),
        }
    }

    fn fingerprint(path: &str, size: u64, mtime_ns: u64) -> FileFingerprint {
        FileFingerprint {
            path: path.to_string(),
            size,
            mtime_ns,
        }
    }

    #[test]
    fn round_trip_persists_entries() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("parse.json");

        let cache = ParseCache::load(cache_path.clone());
        cache.put(fingerprint("a.py", 10, 111), &sample_result());
        cache.save().unwrap();

        let reloaded = ParseCache::load(cache_path);
        assert!(reloaded.load_warning().is_none());
        assert_eq!(
            reloaded.get(&fingerprint("a.py", 10, 111)),
            Some(sample_result())
        );
    }

    #[test]
    fn fingerprint_mismatch_misses() {
        let temp = TempDir::new().unwrap();
        let cache = ParseCache::load(temp.path().join("parse.json"));
        cache.put(fingerprint("a.py", 10, 111), &sample_result());

        assert!(cache.get(&fingerprint("a.py", 11, 111)).is_none());
        assert!(cache.get(&fingerprint("a.py", 10, 222)).is_none());
        assert!(cache.get(&fingerprint("b.py", 10, 111)).is_none());
    }

    #[test]
    fn corrupt_file_resets_with_warning() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("parse.json");
        std::fs::write(&cache_path, b"{ not json").unwrap();

        let cache = ParseCache::load(cache_path);
        assert!(cache.load_warning().is_some());
        assert!(cache.get(&fingerprint("a.py", 1, 1)).is_none());
    }

    #[test]
    fn invalid_entries_are_dropped_silently() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("parse.json");
        std::fs::write(
            &cache_path,
            br#"{"version":1,"entries":{"bad.py":{"size":"nope"},"good.py":{"size":1,"mtime_ns":2,"runtime":["x"],"typing":[],"dynamic":[],"dsn":[]}}}"#,
        )
        .unwrap();

        let cache = ParseCache::load(cache_path);
        assert!(cache.load_warning().is_none());
        assert!(cache.get(&fingerprint("good.py", 1, 2)).is_some());
        assert!(cache.get(&fingerprint("bad.py", 1, 2)).is_none());
    }

    #[test]
    fn unwritten_cache_is_not_saved() {
        let temp = TempDir::new().unwrap();
        let cache_path = temp.path().join("parse.json");
        let cache = ParseCache::load(cache_path.clone());
        cache.save().unwrap();
        assert!(!cache_path.exists());
    }
}
