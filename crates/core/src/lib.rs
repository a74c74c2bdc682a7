//! # pyinfer-core
//!
//! Dependency inference for Python projects.
//!
//! ## Pipeline
//!
//! ```text
//! Project directory
//!     │
//!     ├──> Scanner (ignore-aware walk)
//!     │      └─> Eligible source files
//!     │
//!     ├──> Parser (syntax-tree visitor, parse cache)
//!     │      └─> Classified module names
//!     │
//!     └──> Resolver (filter cascade + index client)
//!            └─> Canonical distribution names
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use pyinfer_core::{infer, Options};
//!
//! #[tokio::main]
//! async fn main() -> pyinfer_core::Result<()> {
//!     let inference = infer("/path/to/project".as_ref(), &Options::default()).await?;
//!     for dep in &inference.dependencies {
//!         println!("{dep}");
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod notebook;
mod options;
mod parse_cache;
mod parser;
mod pypi;
mod resolver;
mod scanner;
mod tables;
mod types;
mod validate;
mod warning;

pub use error::{InferError, Result};
pub use options::Options;
pub use parse_cache::{FileFingerprint, ParseCache};
pub use parser::{extract_imports, parse_many, Extraction, ParseOutput, ParseResult};
pub use pypi::{Existence, IndexClient, SlimMetadata};
pub use resolver::{local_module_names, resolve, resolve_with_client, Resolution};
pub use scanner::{scan, IGNORED_DIR_NAMES, MAX_FILE_SIZE};
pub use tables::{
    dsn_default_driver, in_bundled_index, is_stdlib, is_suspicious, lookup_mapping,
    BUNDLED_INDEX, COMMON_MAPPINGS, DSN_DEFAULT_DRIVERS, FRAMEWORK_EXTRAS, STDLIB_MODULES,
    SUSPICIOUS_NAMES,
};
pub use types::{is_valid_module_name, normalize_distribution, top_level, Dependency};
pub use validate::{shell_safe, url_safe};
pub use warning::{Warning, WarningKind};

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything one inference run produced.
#[derive(Debug, Default)]
pub struct Inference {
    /// Production dependencies, sorted and deduplicated.
    pub dependencies: Vec<Dependency>,
    /// Dependencies imported only from test/docs/example code.
    pub dev_dependencies: Vec<Dependency>,
    pub unresolved: Vec<String>,
    pub warnings: Vec<Warning>,
    /// Wall-clock duration per pipeline phase.
    pub timings: HashMap<String, Duration>,
}

/// Is this file development-only (tests, docs, examples, tooling)?
/// Its imports still resolve, but into the dev list.
pub fn is_dev_file(path: &Path, root: &Path) -> bool {
    let relative = match path.strip_prefix(root) {
        Ok(relative) => relative,
        Err(_) => return false,
    };
    for component in relative.components() {
        let part = component.as_os_str().to_string_lossy().to_lowercase();
        if matches!(part.as_str(), "tests" | "test" | "docs" | "examples" | "scripts") {
            return true;
        }
    }
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    name == "conftest.py" || name.starts_with("test_") || name.ends_with("_test.py")
}

/// Run the whole pipeline: scan, parse, resolve. Blocks (asynchronously)
/// until every worker has drained; partial results are never observable.
pub async fn infer(root: &Path, options: &Options) -> Result<Inference> {
    let mut warnings = Vec::new();
    let mut timings = HashMap::new();

    let phase = Instant::now();
    let (files, scan_warnings) = scanner::scan_with_warnings(root, options)?;
    warnings.extend(scan_warnings);
    timings.insert("scan".to_string(), phase.elapsed());

    let phase = Instant::now();
    let cache_dir = options.effective_cache_dir();
    let parse_cache = Arc::new(ParseCache::load(cache_dir.join("parse.json")));
    if let Some(warning) = parse_cache.load_warning() {
        warnings.push(warning);
    }
    let parsed = parser::parse_many_with_cache(&files, parse_cache.clone(), options).await?;
    warnings.extend(parsed.warnings);
    timings.insert("parse".to_string(), phase.elapsed());

    let mut prod_modules = BTreeSet::new();
    let mut dev_modules = BTreeSet::new();
    for (path, result) in &parsed.results {
        let target = if is_dev_file(path, root) {
            &mut dev_modules
        } else {
            &mut prod_modules
        };
        target.extend(result.candidates());
    }
    // A module used by production code is not additionally a dev dep.
    dev_modules.retain(|name| !prod_modules.contains(name));

    let phase = Instant::now();
    let client = Arc::new(IndexClient::new(options)?);
    if let Some(warning) = client.load_warning() {
        warnings.push(warning);
    }
    let prod = resolver::resolve_with_client(&prod_modules, root, &client, options).await?;
    let dev = resolver::resolve_with_client(&dev_modules, root, &client, options).await?;
    timings.insert("resolve".to_string(), phase.elapsed());

    if options.cancelled() {
        return Err(InferError::Cancelled);
    }
    if let Err(err) = parse_cache.save() {
        log::warn!("Failed to persist parse cache: {err}");
    }
    if let Err(err) = client.persist() {
        log::warn!("Failed to persist index cache: {err}");
    }

    warnings.extend(prod.warnings);
    warnings.extend(dev.warnings);

    let prod_keys: BTreeSet<String> = prod.resolved.iter().map(Dependency::sort_key).collect();
    let dev_dependencies = dev
        .resolved
        .into_iter()
        .filter(|dep| !prod_keys.contains(&dep.sort_key()))
        .collect();

    let mut unresolved: BTreeSet<String> = prod.unresolved.into_iter().collect();
    unresolved.extend(dev.unresolved);

    Ok(Inference {
        dependencies: prod.resolved,
        dev_dependencies,
        unresolved: unresolved.into_iter().collect(),
        warnings,
        timings,
    })
}

/// Synchronous wrapper for callers without a runtime.
pub fn infer_blocking(root: &Path, options: &Options) -> Result<Inference> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(infer(root, options))
}
