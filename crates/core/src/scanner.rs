//! Directory traversal producing the set of parse-eligible source files.

use crate::error::{InferError, Result};
use crate::options::Options;
use crate::warning::{Warning, WarningKind};
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Files larger than this are never opened for parsing.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Directory names that are always skipped, wherever they appear.
pub const IGNORED_DIR_NAMES: &[&str] = &[
    // Virtual environments
    "venv", ".venv", "env", ".env", "virtualenv",
    // Version control
    ".git", ".hg", ".svn",
    // IDE / editor state
    ".idea", ".vscode", ".vs",
    // Language caches
    "__pycache__", ".mypy_cache", ".ruff_cache", ".pytest_cache",
    // Build artifacts
    "dist", "build", ".eggs",
    // Test runners
    ".tox", ".nox",
    // Foreign ecosystems commonly vendored into mixed projects
    "node_modules",
    // Tool state
    ".terraform", ".serverless",
];

/// Should this directory be pruned from the walk? Name-based rules first,
/// then content probes for custom-named virtual environments.
fn is_ignored_dir(path: &Path, options: &Options) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };

    if IGNORED_DIR_NAMES.contains(&name) || options.extra_ignore_dirs.contains(name) {
        return true;
    }
    if name.ends_with(".egg-info") {
        return true;
    }

    // Virtual environments under arbitrary names.
    path.join("pyvenv.cfg").exists()
        || path.join("bin").join("activate").exists()
        || path.join("Scripts").join("activate").exists()
}

fn has_recognized_extension(path: &Path, options: &Options) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| options.extensions.contains(&ext.to_lowercase()))
        .unwrap_or(false)
}

/// Walk `root` and collect every eligible source file. Order is
/// unspecified; callers must sort before rendering anything.
pub fn scan(root: &Path, options: &Options) -> Result<Vec<PathBuf>> {
    let (files, _warnings) = scan_with_warnings(root, options)?;
    Ok(files)
}

pub(crate) fn scan_with_warnings(
    root: &Path,
    options: &Options,
) -> Result<(Vec<PathBuf>, Vec<Warning>)> {
    if !root.is_dir() {
        return Err(InferError::InvalidRoot(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut files = Vec::new();
    let mut warnings = Vec::new();

    let filter_options = options.clone();
    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry
                .file_type()
                .map(|ft| ft.is_dir())
                .unwrap_or(false);
            !(is_dir && is_ignored_dir(entry.path(), &filter_options))
        })
        .build();

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(err) => {
                log::warn!("Failed to read entry: {err}");
                warnings.push(Warning::new(
                    WarningKind::Permission,
                    root.display().to_string(),
                    format!("unreadable entry skipped: {err}"),
                ));
                continue;
            }
        };

        // lstat semantics: symlinks are never files here.
        let is_file = entry.file_type().map(|ft| ft.is_file()).unwrap_or(false);
        if !is_file || !has_recognized_extension(entry.path(), options) {
            continue;
        }

        match std::fs::symlink_metadata(entry.path()) {
            Ok(meta) => {
                if meta.len() > MAX_FILE_SIZE {
                    log::debug!(
                        "Skipping {} ({} bytes over the {} byte cap)",
                        entry.path().display(),
                        meta.len(),
                        MAX_FILE_SIZE
                    );
                    continue;
                }
            }
            Err(err) => {
                warnings.push(Warning::new(
                    WarningKind::Permission,
                    entry.path().display().to_string(),
                    format!("cannot stat: {err}"),
                ));
                continue;
            }
        }

        files.push(entry.path().to_path_buf());
    }

    log::debug!("Scanner found {} source files", files.len());
    Ok((files, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"import os\n").unwrap();
    }

    #[test]
    fn finds_python_and_notebook_files() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("a.py"));
        touch(&temp.path().join("pkg/b.py"));
        fs::write(temp.path().join("nb.ipynb"), b"{}").unwrap();
        fs::write(temp.path().join("README.md"), b"hi").unwrap();

        let files = scan(temp.path(), &Options::default()).unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn prunes_ignored_directories() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("src/ok.py"));
        touch(&temp.path().join("node_modules/x.py"));
        touch(&temp.path().join(".git/y.py"));
        touch(&temp.path().join("pkg.egg-info/z.py"));
        touch(&temp.path().join("__pycache__/c.py"));

        let files = scan(temp.path(), &Options::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/ok.py"));
    }

    #[test]
    fn detects_custom_named_virtualenvs() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("my-custom-venv/lib/site.py"));
        fs::write(temp.path().join("my-custom-venv/pyvenv.cfg"), b"").unwrap();

        touch(&temp.path().join("runtime/bin/tool.py"));
        fs::write(temp.path().join("runtime/bin/activate"), b"").unwrap();

        touch(&temp.path().join("src/main.py"));

        let files = scan(temp.path(), &Options::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/main.py"));
    }

    #[cfg(unix)]
    #[test]
    fn never_follows_symlinks() {
        let temp = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        touch(&outside.path().join("secret.py"));
        touch(&temp.path().join("ok.py"));

        std::os::unix::fs::symlink(outside.path(), temp.path().join("linked")).unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.py"),
            temp.path().join("direct.py"),
        )
        .unwrap();

        let files = scan(temp.path(), &Options::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("ok.py"));
    }

    #[test]
    fn skips_oversized_files() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("small.py"));
        let big = vec![b' '; (MAX_FILE_SIZE + 1) as usize];
        fs::write(temp.path().join("big.py"), big).unwrap();

        let files = scan(temp.path(), &Options::default()).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("small.py"));
    }

    #[test]
    fn missing_root_is_fatal() {
        let err = scan(Path::new("/no/such/dir"), &Options::default());
        assert!(matches!(err, Err(InferError::InvalidRoot(_))));
    }

    #[test]
    fn extra_ignore_dirs_are_honored() {
        let temp = TempDir::new().unwrap();
        touch(&temp.path().join("generated/a.py"));
        touch(&temp.path().join("src/b.py"));

        let options = Options {
            extra_ignore_dirs: ["generated".to_string()].into_iter().collect(),
            ..Options::default()
        };
        let files = scan(temp.path(), &options).unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/b.py"));
    }
}
