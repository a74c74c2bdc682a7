//! Package index client.
//!
//! One JSON endpoint (`{base}/pypi/{name}/json`) answers everything this
//! crate needs: existence, latest version, declared extras. Lookups are
//! cached twice — an in-process map holding slim metadata for the run,
//! and a persistent existence cache shared across runs.

use crate::error::{InferError, Result};
use crate::options::Options;
use crate::parse_cache::write_private_atomic;
use crate::validate;
use crate::warning::{Warning, WarningKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const SCHEMA_VERSION: u32 = 1;
const MAX_RESPONSE_BYTES: u64 = 5 * 1024 * 1024;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_REDIRECTS: usize = 3;
const RETRIES: u32 = 2;
const RETRY_BACKOFF: Duration = Duration::from_millis(250);
/// Confirmed-existing entries stay fresh for a week.
const EXISTS_TTL_SECS: u64 = 7 * 24 * 3600;
/// Confirmed-absent entries are retried after an hour.
const ABSENT_TTL_SECS: u64 = 3600;

const USER_AGENT: &str = concat!("pyinfer/", env!("CARGO_PKG_VERSION"));

/// What one lookup established about a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Exists,
    Absent,
    /// The index could not be asked (offline, or transient failures
    /// survived every retry). Treated as absent by `exists`.
    Unknown,
}

/// The handful of metadata fields this crate keeps per distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlimMetadata {
    pub name: String,
    pub version: String,
    pub requires_dist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    exists: bool,
    fetched_at: u64,
    ttl: u64,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: HashMap<String, Value>,
}

enum Fetched {
    Found(SlimMetadata),
    NotFound,
    Unknown,
}

pub struct IndexClient {
    http: Option<reqwest::Client>,
    base_url: String,
    cache_path: PathBuf,
    disk: Mutex<HashMap<String, CacheEntry>>,
    memory: Mutex<HashMap<String, Option<SlimMetadata>>>,
    dirty: AtomicBool,
    load_warning: Option<Warning>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl IndexClient {
    pub fn new(options: &Options) -> Result<Self> {
        let http = if options.offline {
            None
        } else {
            let client = reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(REQUEST_TIMEOUT)
                .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
                .build()
                .map_err(|e| InferError::Other(format!("failed to build HTTP client: {e}")))?;
            Some(client)
        };

        let cache_path = options.effective_cache_dir().join("cache.json");
        let (entries, load_warning) = load_cache_file(&cache_path);

        Ok(Self {
            http,
            base_url: options.index_base_url.trim_end_matches('/').to_string(),
            cache_path,
            disk: Mutex::new(entries),
            memory: Mutex::new(HashMap::new()),
            dirty: AtomicBool::new(false),
            load_warning,
        })
    }

    pub fn load_warning(&self) -> Option<Warning> {
        self.load_warning.clone()
    }

    pub async fn exists(&self, name: &str) -> bool {
        self.existence(name).await == Existence::Exists
    }

    /// Existence with the unknown state preserved, so callers can tell
    /// "the index said no" apart from "the index could not be asked".
    pub async fn existence(&self, name: &str) -> Existence {
        if let Err(reason) = validate::url_safe(name) {
            log::debug!("Refusing index lookup for {name:?}: {reason}");
            return Existence::Unknown;
        }
        let key = name.to_lowercase();

        {
            let memory = self.memory.lock().expect("index memory mutex poisoned");
            if let Some(cached) = memory.get(&key) {
                return if cached.is_some() {
                    Existence::Exists
                } else {
                    Existence::Absent
                };
            }
        }
        if let Some(exists) = self.disk_lookup(&key) {
            return if exists {
                Existence::Exists
            } else {
                Existence::Absent
            };
        }

        match self.fetch(&key).await {
            Fetched::Found(meta) => {
                self.record(&key, Some(meta));
                Existence::Exists
            }
            Fetched::NotFound => {
                self.record(&key, None);
                Existence::Absent
            }
            Fetched::Unknown => Existence::Unknown,
        }
    }

    /// Slim metadata for an existing distribution, from memory or the
    /// network. The persistent cache stores existence only, so a cached
    /// "exists" may still cost one GET per process.
    pub async fn metadata(&self, name: &str) -> Option<SlimMetadata> {
        if validate::url_safe(name).is_err() {
            return None;
        }
        let key = name.to_lowercase();

        {
            let memory = self.memory.lock().expect("index memory mutex poisoned");
            if let Some(cached) = memory.get(&key) {
                return cached.clone();
            }
        }
        if self.disk_lookup(&key) == Some(false) {
            return None;
        }

        match self.fetch(&key).await {
            Fetched::Found(meta) => {
                self.record(&key, Some(meta.clone()));
                Some(meta)
            }
            Fetched::NotFound => {
                self.record(&key, None);
                None
            }
            Fetched::Unknown => None,
        }
    }

    pub async fn latest_version(&self, name: &str) -> Option<String> {
        self.metadata(name).await.map(|meta| meta.version)
    }

    /// Extras declared by a distribution, recovered from environment
    /// markers in its dependency list.
    pub async fn extras(&self, name: &str) -> Vec<String> {
        let Some(meta) = self.metadata(name).await else {
            return Vec::new();
        };
        let mut extras: Vec<String> = meta
            .requires_dist
            .iter()
            .filter_map(|spec| parse_extra_marker(spec))
            .collect();
        extras.sort();
        extras.dedup();
        extras
    }

    fn disk_lookup(&self, key: &str) -> Option<bool> {
        let disk = self.disk.lock().expect("index disk mutex poisoned");
        let entry = disk.get(key)?;
        let age = now_secs().saturating_sub(entry.fetched_at);
        if age > entry.ttl {
            return None;
        }
        Some(entry.exists)
    }

    fn record(&self, key: &str, meta: Option<SlimMetadata>) {
        let exists = meta.is_some();
        {
            let mut memory = self.memory.lock().expect("index memory mutex poisoned");
            memory.insert(key.to_string(), meta);
        }
        {
            let mut disk = self.disk.lock().expect("index disk mutex poisoned");
            disk.insert(
                key.to_string(),
                CacheEntry {
                    exists,
                    fetched_at: now_secs(),
                    ttl: if exists {
                        EXISTS_TTL_SECS
                    } else {
                        ABSENT_TTL_SECS
                    },
                },
            );
        }
        self.dirty.store(true, Ordering::Relaxed);
    }

    async fn fetch(&self, key: &str) -> Fetched {
        let Some(client) = &self.http else {
            return Fetched::Unknown;
        };
        let url = format!("{}/pypi/{}/json", self.base_url, key);

        for attempt in 0..=RETRIES {
            if attempt > 0 {
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
            let response = match client.get(&url).send().await {
                Ok(response) => response,
                Err(err) => {
                    log::debug!("GET {url} failed (attempt {attempt}): {err}");
                    continue;
                }
            };

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Fetched::NotFound;
            }
            if status != reqwest::StatusCode::OK {
                log::debug!("GET {url} returned {status} (attempt {attempt})");
                continue;
            }

            if response
                .content_length()
                .is_some_and(|len| len > MAX_RESPONSE_BYTES)
            {
                log::warn!("Index response for {key} exceeds {MAX_RESPONSE_BYTES} bytes");
                return Fetched::NotFound;
            }
            let body = match response.bytes().await {
                Ok(body) => body,
                Err(err) => {
                    log::debug!("Reading body for {url} failed: {err}");
                    continue;
                }
            };
            if body.len() as u64 > MAX_RESPONSE_BYTES {
                log::warn!("Index response for {key} exceeds {MAX_RESPONSE_BYTES} bytes");
                return Fetched::NotFound;
            }

            // A body the index serves but we cannot parse counts as absent.
            return match slim_metadata(&body) {
                Some(meta) => Fetched::Found(meta),
                None => Fetched::NotFound,
            };
        }

        log::warn!("Index lookup for {key} failed after {RETRIES} retries");
        Fetched::Unknown
    }

    /// Atomic persist of the existence cache, owner-only permissions.
    /// Called once when the pipeline drains; skipped on cancel.
    pub fn persist(&self) -> Result<()> {
        if !self.dirty.load(Ordering::Relaxed) {
            return Ok(());
        }
        let disk = self.disk.lock().expect("index disk mutex poisoned");
        let file = CacheFile {
            version: SCHEMA_VERSION,
            entries: disk
                .iter()
                .map(|(key, entry)| {
                    (
                        key.clone(),
                        serde_json::to_value(entry).unwrap_or(Value::Null),
                    )
                })
                .collect(),
        };
        drop(disk);

        let bytes = serde_json::to_vec(&file)
            .map_err(|e| InferError::CacheError(format!("serialize index cache: {e}")))?;
        write_private_atomic(&self.cache_path, &bytes)?;
        Ok(())
    }

    /// Pre-seed the persistent cache; used by tests and offline tooling.
    pub fn seed(&self, name: &str, exists: bool) {
        let mut disk = self.disk.lock().expect("index disk mutex poisoned");
        disk.insert(
            name.to_lowercase(),
            CacheEntry {
                exists,
                fetched_at: now_secs(),
                ttl: EXISTS_TTL_SECS,
            },
        );
        self.dirty.store(true, Ordering::Relaxed);
    }
}

fn load_cache_file(path: &Path) -> (HashMap<String, CacheEntry>, Option<Warning>) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(_) => return (HashMap::new(), None),
    };
    match serde_json::from_slice::<CacheFile>(&bytes) {
        Ok(file) if file.version == SCHEMA_VERSION => {
            let entries = file
                .entries
                .into_iter()
                .filter_map(|(key, raw)| {
                    serde_json::from_value::<CacheEntry>(raw)
                        .ok()
                        .map(|entry| (key, entry))
                })
                .collect();
            (entries, None)
        }
        Ok(file) => {
            log::warn!(
                "Index cache {} has schema version {}, resetting",
                path.display(),
                file.version
            );
            let warning = Warning::new(
                WarningKind::CacheCorruption,
                path.display().to_string(),
                "unsupported schema version, cache reset".to_string(),
            );
            (HashMap::new(), Some(warning))
        }
        Err(err) => {
            log::warn!("Index cache {} corrupted: {err}", path.display());
            let warning = Warning::new(
                WarningKind::CacheCorruption,
                path.display().to_string(),
                format!("cache reset: {err}"),
            );
            (HashMap::new(), Some(warning))
        }
    }
}

/// Strip a full index response down to the fields the pipeline uses.
fn slim_metadata(body: &[u8]) -> Option<SlimMetadata> {
    let doc: Value = serde_json::from_slice(body).ok()?;
    let info = doc.get("info")?;
    let name = info.get("name")?.as_str()?.to_string();
    let version = info
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let requires_dist = info
        .get("requires_dist")
        .and_then(Value::as_array)
        .map(|specs| {
            specs
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(SlimMetadata {
        name,
        version,
        requires_dist,
    })
}

/// Extract the extra name from a `; extra == "x"` environment marker.
fn parse_extra_marker(spec: &str) -> Option<String> {
    let (_, marker) = spec.split_once("extra ==")?;
    let extra = marker
        .trim()
        .trim_matches(|c| c == '\'' || c == '"')
        .split_whitespace()
        .next()?
        .trim_matches(|c| c == '\'' || c == '"');
    (!extra.is_empty()).then(|| extra.to_string())
}
