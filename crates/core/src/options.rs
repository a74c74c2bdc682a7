use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

const MAX_PARSE_WORKERS: usize = 32;
const MIN_LOOKUP_WORKERS: usize = 50;
const MAX_LOOKUP_WORKERS: usize = 128;

/// Knobs for one inference run.
#[derive(Debug, Clone)]
pub struct Options {
    /// Log heuristic drops and skipped files at debug level.
    pub verbose: bool,
    /// Skip all network lookups; names that would need the index go to
    /// the unresolved channel instead.
    pub offline: bool,
    /// Cache directory override. Defaults to `{user_cache_dir}/pyinfer`.
    pub cache_dir: Option<PathBuf>,
    /// Remote lookup pool size. `0` picks a default from the CPU count,
    /// clamped to 50–128.
    pub lookup_workers: usize,
    /// Parse pool size. `0` picks `min(cpu, 32)`.
    pub parse_workers: usize,
    /// Recognized source extensions, without the leading dot.
    pub extensions: HashSet<String>,
    /// Additional directory names to skip during scanning.
    pub extra_ignore_dirs: HashSet<String>,
    /// Drop imports found in `except ImportError` handler arms instead of
    /// counting both arms of an import fallback.
    pub exclude_fallback_imports: bool,
    /// Package index base URL. Only changed by tests.
    pub index_base_url: String,
    /// Cooperative cancellation flag; set to true to abort lookups and
    /// skip cache persistence.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            verbose: false,
            offline: false,
            cache_dir: None,
            lookup_workers: 0,
            parse_workers: 0,
            extensions: ["py", "ipynb"].iter().map(|s| s.to_string()).collect(),
            extra_ignore_dirs: HashSet::new(),
            exclude_fallback_imports: false,
            index_base_url: "https://pypi.org".to_string(),
            cancel: None,
        }
    }
}

impl Options {
    pub fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(std::sync::atomic::Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Effective parse pool size: CPU-bound, capped at 32.
    pub fn effective_parse_workers(&self) -> usize {
        if self.parse_workers > 0 {
            return self.parse_workers.clamp(1, MAX_PARSE_WORKERS);
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        cpus.min(MAX_PARSE_WORKERS)
    }

    /// Effective lookup pool size: I/O-bound, 50–128.
    pub fn effective_lookup_workers(&self) -> usize {
        if self.lookup_workers > 0 {
            return self.lookup_workers.clamp(1, MAX_LOOKUP_WORKERS);
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        (cpus * 12).clamp(MIN_LOOKUP_WORKERS, MAX_LOOKUP_WORKERS)
    }

    /// Cache directory for this run, creating nothing.
    pub fn effective_cache_dir(&self) -> PathBuf {
        if let Some(dir) = &self.cache_dir {
            return dir.clone();
        }
        user_cache_dir().join("pyinfer")
    }
}

/// Platform user cache directory: `$XDG_CACHE_HOME`, else `$HOME/.cache`,
/// else a relative fallback for environments with no home at all.
fn user_cache_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        if !xdg.trim().is_empty() {
            return PathBuf::from(xdg);
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        if !home.trim().is_empty() {
            return PathBuf::from(home).join(".cache");
        }
    }
    if let Ok(local) = std::env::var("LOCALAPPDATA") {
        if !local.trim().is_empty() {
            return PathBuf::from(local);
        }
    }
    PathBuf::from(".cache")
}
