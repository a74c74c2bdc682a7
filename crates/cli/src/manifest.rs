use anyhow::{Context, Result};
use pyinfer_core::Dependency;
use std::path::{Path, PathBuf};

/// Write (or overwrite) the project manifest with the inferred
/// dependency lists. Returns the manifest path.
pub fn write_pyproject(
    root: &Path,
    dependencies: &[Dependency],
    dev_dependencies: &[Dependency],
) -> Result<PathBuf> {
    let manifest_path = root.join("pyproject.toml");
    let project_name = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "project".to_string());

    let mut lines = vec![
        "[project]".to_string(),
        format!("name = \"{project_name}\""),
        "version = \"0.1.0\"".to_string(),
        "description = \"\"".to_string(),
        "readme = \"README.md\"".to_string(),
        "requires-python = \">=3.9\"".to_string(),
        "dependencies = [".to_string(),
    ];
    for dep in dependencies {
        lines.push(format!("    \"{dep}\","));
    }
    lines.push("]".to_string());

    lines.push(String::new());
    lines.push("[dependency-groups]".to_string());
    lines.push("dev = [".to_string());
    for dep in dev_dependencies {
        lines.push(format!("    \"{dep}\","));
    }
    lines.push("]".to_string());
    lines.push(String::new());

    std::fs::write(&manifest_path, lines.join("\n"))
        .with_context(|| format!("Failed to write {}", manifest_path.display()))?;
    Ok(manifest_path)
}
