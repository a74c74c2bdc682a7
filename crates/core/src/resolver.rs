//! Module-name resolution: the lookup cascade that turns imported names
//! into canonical distribution names.
//!
//! Each candidate passes the filters in a fixed order and the first
//! match decides: local module, stdlib, suspicious generic name, static
//! mapping, bundled index, then the remote index. Only the last step
//! touches the network, behind a bounded worker pool.

use crate::error::{InferError, Result};
use crate::options::Options;
use crate::pypi::{Existence, IndexClient};
use crate::tables;
use crate::types::{is_valid_module_name, normalize_distribution, top_level, Dependency};
use crate::validate;
use crate::warning::{Warning, WarningKind};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Outcome of one resolution pass.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Deduplicated, lexicographically sorted dependencies.
    pub resolved: Vec<Dependency>,
    /// Names no filter matched and no index variant confirmed.
    pub unresolved: Vec<String>,
    pub warnings: Vec<Warning>,
}

enum Lookup {
    Resolved(String),
    NotFound,
    /// At least one variant could not be checked at all.
    Indeterminate,
}

/// One-shot resolution entry point; builds and persists its own index
/// client.
pub async fn resolve(
    modules: &BTreeSet<String>,
    project_root: &Path,
    options: &Options,
) -> Result<Resolution> {
    let client = Arc::new(IndexClient::new(options)?);
    let mut resolution = resolve_with_client(modules, project_root, &client, options).await?;
    if let Some(warning) = client.load_warning() {
        resolution.warnings.push(warning);
    }
    if !options.cancelled() {
        if let Err(err) = client.persist() {
            log::warn!("Failed to persist index cache: {err}");
        }
    }
    Ok(resolution)
}

/// Resolve a candidate set with a caller-provided index client. The
/// client's cache is not persisted here; the pipeline does that once.
pub async fn resolve_with_client(
    modules: &BTreeSet<String>,
    project_root: &Path,
    client: &Arc<IndexClient>,
    options: &Options,
) -> Result<Resolution> {
    let local = local_module_names(project_root, options);
    let mut warnings = Vec::new();
    let mut resolved = Vec::new();
    let mut remote_queue = Vec::new();

    for module in modules {
        if !is_valid_module_name(module) {
            warnings.push(Warning::new(
                WarningKind::UnsafeInput,
                module.clone(),
                "rejected: not a valid module name".to_string(),
            ));
            continue;
        }
        let name = top_level(module);

        if local.contains(name) {
            log::debug!("Dropping {name}: local module");
            continue;
        }
        if tables::is_stdlib(name) {
            continue;
        }
        if tables::is_suspicious(name) {
            log::debug!("Dropping {name}: generic name, assumed local");
            continue;
        }
        if let Some(mapped) = tables::lookup_mapping(name) {
            push_validated(Dependency::parse(mapped), &mut resolved, &mut warnings);
            continue;
        }
        let normalized = normalize_distribution(name);
        if tables::in_bundled_index(&normalized) {
            resolved.push(Dependency::new(normalized));
            continue;
        }
        remote_queue.push(name.to_string());
    }

    let mut unresolved = BTreeSet::new();
    if !remote_queue.is_empty() {
        if options.offline {
            for name in remote_queue {
                warnings.push(Warning::new(
                    WarningKind::Unresolved,
                    name.clone(),
                    "offline mode, index not consulted".to_string(),
                ));
                unresolved.insert(name);
            }
        } else {
            lookup_remote(
                remote_queue,
                client,
                options,
                &mut resolved,
                &mut unresolved,
                &mut warnings,
            )
            .await?;
        }
    }

    // Companion distributions implied by frameworks present in the set.
    let mut merged = merge(resolved);
    for (trigger, extras) in tables::FRAMEWORK_EXTRAS {
        if !merged.contains_key(*trigger) {
            continue;
        }
        for extra in *extras {
            let dep = Dependency::parse(extra);
            match merged.entry(dep.sort_key()) {
                Entry::Occupied(mut slot) => slot.get_mut().merge(dep),
                Entry::Vacant(slot) => {
                    slot.insert(dep);
                }
            }
        }
    }

    Ok(Resolution {
        resolved: merged.into_values().collect(),
        unresolved: unresolved.into_iter().collect(),
        warnings,
    })
}

/// Names shadowed by the project itself: source files and init-marked
/// package directories directly under the root.
pub fn local_module_names(project_root: &Path, options: &Options) -> HashSet<String> {
    let mut names = HashSet::new();
    let Ok(entries) = std::fs::read_dir(project_root) else {
        return names;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_file() {
            let recognized = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| options.extensions.contains(&ext.to_lowercase()))
                .unwrap_or(false);
            if recognized {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.insert(stem.to_string());
                }
            }
        } else if file_type.is_dir() && path.join("__init__.py").is_file() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                names.insert(name.to_string());
            }
        }
    }
    names
}

fn push_validated(dep: Dependency, resolved: &mut Vec<Dependency>, warnings: &mut Vec<Warning>) {
    // Defense in depth: table-sourced names go through the same gate.
    match validate::url_safe(&dep.name) {
        Ok(()) => resolved.push(dep),
        Err(reason) => warnings.push(Warning::new(
            WarningKind::UnsafeInput,
            dep.name.clone(),
            format!("rejected: {reason}"),
        )),
    }
}

/// Variant spellings probed against the index, in order: the name
/// itself, the `_`/`-` swaps, then the `python-`/`py-` prefixes.
fn spelling_variants(name: &str) -> Vec<String> {
    let lower = name.to_lowercase();
    let hyphenated = lower.replace('_', "-");
    let underscored = lower.replace('-', "_");
    let candidates = [
        lower,
        hyphenated.clone(),
        underscored,
        format!("python-{hyphenated}"),
        format!("py-{hyphenated}"),
    ];
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

async fn lookup_one(client: Arc<IndexClient>, variants: Vec<String>) -> Lookup {
    let mut saw_unknown = false;
    for variant in variants {
        if validate::url_safe(&variant).is_err() {
            continue;
        }
        match client.existence(&variant).await {
            Existence::Exists => return Lookup::Resolved(variant),
            Existence::Absent => {}
            Existence::Unknown => saw_unknown = true,
        }
    }
    if saw_unknown {
        Lookup::Indeterminate
    } else {
        Lookup::NotFound
    }
}

async fn lookup_remote(
    queue: Vec<String>,
    client: &Arc<IndexClient>,
    options: &Options,
    resolved: &mut Vec<Dependency>,
    unresolved: &mut BTreeSet<String>,
    warnings: &mut Vec<Warning>,
) -> Result<()> {
    let semaphore = Arc::new(Semaphore::new(options.effective_lookup_workers()));
    let mut tasks: JoinSet<(String, Lookup)> = JoinSet::new();

    for name in queue {
        if options.cancelled() {
            tasks.abort_all();
            return Err(InferError::Cancelled);
        }
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| InferError::Other("lookup semaphore closed".to_string()))?;
        let client = client.clone();
        let variants = spelling_variants(&name);
        tasks.spawn(async move {
            let _permit = permit;
            let outcome = lookup_one(client, variants).await;
            (name, outcome)
        });
    }

    // Results become visible only after every worker has finished.
    while let Some(joined) = tasks.join_next().await {
        let (name, outcome) = joined.map_err(|e| InferError::Other(e.to_string()))?;
        match outcome {
            Lookup::Resolved(variant) => {
                log::debug!("Index confirmed {name} as {variant}");
                resolved.push(Dependency::new(variant));
            }
            Lookup::NotFound => {
                warnings.push(Warning::new(
                    WarningKind::Unresolved,
                    name.clone(),
                    "no distribution found on the index".to_string(),
                ));
                unresolved.insert(name);
            }
            Lookup::Indeterminate => {
                warnings.push(Warning::new(
                    WarningKind::Transient,
                    name.clone(),
                    "index could not be reached, resolution unknown".to_string(),
                ));
                unresolved.insert(name);
            }
        }
    }

    if options.cancelled() {
        return Err(InferError::Cancelled);
    }
    Ok(())
}

/// Case-insensitive dedup keeping the first casing seen, extras merged.
fn merge(deps: Vec<Dependency>) -> BTreeMap<String, Dependency> {
    let mut merged = BTreeMap::new();
    for dep in deps {
        match merged.entry(dep.sort_key()) {
            Entry::Occupied(mut slot) => {
                let existing: &mut Dependency = slot.get_mut();
                existing.merge(dep);
            }
            Entry::Vacant(slot) => {
                slot.insert(dep);
            }
        }
    }
    merged
}
