//! End-to-end pipeline scenarios, run offline against temp projects.
//! The bundled tables make every expected resolution answerable without
//! touching the network.

use pyinfer_core::{infer, Options, WarningKind};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn offline_options(temp: &TempDir) -> Options {
    Options {
        offline: true,
        cache_dir: Some(temp.path().join(".cache")),
        ..Options::default()
    }
}

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

async fn infer_deps(temp: &TempDir) -> Vec<String> {
    let inference = infer(temp.path(), &offline_options(temp)).await.unwrap();
    inference
        .dependencies
        .iter()
        .map(|dep| dep.to_string())
        .collect()
}

#[tokio::test]
async fn runtime_import_resolves_stdlib_and_relative_ignored() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "main.py",
        "import requests\nimport os\nfrom .local import x\n",
    );
    assert_eq!(infer_deps(&temp).await, vec!["requests"]);
}

#[tokio::test]
async fn mapped_import_resolves_to_distribution_name() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "vision.py", "import cv2\n");
    assert_eq!(infer_deps(&temp).await, vec!["opencv-python"]);
}

#[tokio::test]
async fn import_fallback_keeps_primary_and_filters_stdlib_arm() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "speed.py",
        "try:\n    import ujson\nexcept ImportError:\n    import json\n",
    );
    assert_eq!(infer_deps(&temp).await, vec!["ujson"]);
}

#[tokio::test]
async fn type_checking_imports_never_become_dependencies() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "hints.py",
        "from typing import TYPE_CHECKING\nif TYPE_CHECKING:\n    import numpy\n",
    );
    assert_eq!(infer_deps(&temp).await, Vec::<String>::new());
}

#[tokio::test]
async fn dynamic_import_at_module_scope_counts_as_runtime() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "plugins.py",
        "from importlib import import_module\nbackend = import_module(\"redis\")\n",
    );
    assert_eq!(infer_deps(&temp).await, vec!["redis"]);
}

#[tokio::test]
async fn dsn_literal_implies_driver() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "settings.py",
        "import os\nDATABASE_URL = \"postgresql+asyncpg://u:p@h/db\"\n",
    );
    assert_eq!(infer_deps(&temp).await, vec!["asyncpg"]);
}

#[tokio::test]
async fn framework_import_pulls_companion_server() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "api.py", "import fastapi\n");
    assert_eq!(infer_deps(&temp).await, vec!["fastapi", "uvicorn"]);
}

#[tokio::test]
async fn local_package_shadows_index_names() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "utils/__init__.py", "");
    write(temp.path(), "app_main.py", "import utils\n");
    assert_eq!(infer_deps(&temp).await, Vec::<String>::new());
}

#[tokio::test]
async fn oversized_files_are_never_parsed() {
    let temp = TempDir::new().unwrap();
    let mut big = String::from("import torch\n");
    big.push_str(&" ".repeat(11 * 1024 * 1024));
    write(temp.path(), "giant.py", &big);
    assert_eq!(infer_deps(&temp).await, Vec::<String>::new());
}

#[tokio::test]
async fn malicious_dynamic_import_is_rejected_with_warning() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "evil.py",
        "from importlib import import_module\nimport_module(\"../../etc/passwd\")\n",
    );
    let inference = infer(temp.path(), &offline_options(&temp)).await.unwrap();
    assert!(inference.dependencies.is_empty());
    assert!(inference
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::UnsafeInput && w.subject.contains("etc/passwd")));
}

#[tokio::test]
async fn notebooks_contribute_code_cell_imports() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "analysis.ipynb",
        r##"{"cells":[{"cell_type":"markdown","source":["# import nothing"]},{"cell_type":"code","source":["import pandas as pd\n","df = pd.DataFrame()\n"]}]}"##,
    );
    let deps = infer_deps(&temp).await;
    assert!(deps.contains(&"pandas".to_string()));
    // pandas implies its spreadsheet companion via the extras table.
    assert!(deps.contains(&"openpyxl".to_string()));
}

#[tokio::test]
async fn dev_imports_split_from_production() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "app_entry.py", "import flask\n");
    write(temp.path(), "tests/test_app.py", "import pytest\nimport flask\n");

    let inference = infer(temp.path(), &offline_options(&temp)).await.unwrap();
    let deps: Vec<String> = inference.dependencies.iter().map(|d| d.to_string()).collect();
    let dev: Vec<String> = inference
        .dev_dependencies
        .iter()
        .map(|d| d.to_string())
        .collect();

    assert_eq!(deps, vec!["flask", "gunicorn"]);
    assert_eq!(dev, vec!["pytest"]);
}

#[tokio::test]
async fn repeated_runs_are_byte_identical() {
    let temp = TempDir::new().unwrap();
    write(
        temp.path(),
        "main.py",
        "import requests\nimport numpy\nimport cv2\nimport fastapi\n",
    );
    write(temp.path(), "tests/test_main.py", "import pytest\n");

    let options = offline_options(&temp);
    let first = infer(temp.path(), &options).await.unwrap();
    let second = infer(temp.path(), &options).await.unwrap();

    assert_eq!(
        first.dependencies.iter().map(ToString::to_string).collect::<Vec<_>>(),
        second.dependencies.iter().map(ToString::to_string).collect::<Vec<_>>(),
    );
    assert_eq!(first.unresolved, second.unresolved);
    // The second run is served from the parse cache; the results must
    // not depend on that.
    assert!(temp.path().join(".cache/parse.json").exists());
}

#[tokio::test]
async fn unresolvable_name_lands_in_unresolved_channel() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "main.py", "import zzz_private_internal\n");

    let inference = infer(temp.path(), &offline_options(&temp)).await.unwrap();
    assert!(inference.dependencies.is_empty());
    assert_eq!(inference.unresolved, vec!["zzz_private_internal"]);
}

#[tokio::test]
async fn corrupt_parse_cache_resets_and_warns() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "main.py", "import requests\n");
    let cache_dir = temp.path().join(".cache");
    fs::create_dir_all(&cache_dir).unwrap();
    fs::write(cache_dir.join("parse.json"), b"garbage").unwrap();

    let inference = infer(temp.path(), &offline_options(&temp)).await.unwrap();
    assert_eq!(
        inference.dependencies.iter().map(ToString::to_string).collect::<Vec<_>>(),
        vec!["requests"]
    );
    assert!(inference
        .warnings
        .iter()
        .any(|w| w.kind == WarningKind::CacheCorruption));
}

#[tokio::test]
async fn timings_cover_every_phase() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "main.py", "import requests\n");
    let inference = infer(temp.path(), &offline_options(&temp)).await.unwrap();
    for phase in ["scan", "parse", "resolve"] {
        assert!(inference.timings.contains_key(phase), "missing {phase}");
    }
}

#[tokio::test]
async fn missing_root_is_a_fatal_error() {
    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("nope");
    let options = offline_options(&temp);
    assert!(infer(&missing, &options).await.is_err());
}
