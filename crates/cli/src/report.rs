use pyinfer_core::Inference;
use std::path::Path;

/// Plain-text inference report: dependency groups to stdout, problems to
/// stderr.
pub fn print_inference(root: &Path, inference: &Inference) {
    let project = root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string());

    println!("Project: {project}");
    println!();

    if inference.dependencies.is_empty() {
        println!("No production dependencies");
    } else {
        println!("Production ({}):", inference.dependencies.len());
        for dep in &inference.dependencies {
            println!("  - {dep}");
        }
    }
    println!();

    if !inference.dev_dependencies.is_empty() {
        println!("Development ({}):", inference.dev_dependencies.len());
        for dep in &inference.dev_dependencies {
            println!("  - {dep}");
        }
        println!();
    }

    if !inference.unresolved.is_empty() {
        eprintln!("Unresolved imports ({}):", inference.unresolved.len());
        for name in &inference.unresolved {
            eprintln!("  ? {name}");
        }
    }
    for warning in &inference.warnings {
        log::warn!("{warning}");
    }

    for phase in ["scan", "parse", "resolve"] {
        if let Some(duration) = inference.timings.get(phase) {
            log::debug!("{phase} took {duration:?}");
        }
    }
}
