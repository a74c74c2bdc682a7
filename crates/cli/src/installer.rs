use anyhow::{Context, Result};
use pyinfer_core::shell_safe;
use tokio::process::Command;

/// Install the given dependency specs with `uv` when available, falling
/// back to `pip`. Every spec is validated before it can become an argv
/// element; nothing ever goes through a shell.
pub async fn install_packages(specs: &[String]) -> Result<bool> {
    if specs.is_empty() {
        log::info!("No packages to install");
        return Ok(true);
    }

    let mut safe = Vec::new();
    let mut rejected = Vec::new();
    for spec in specs {
        match shell_safe(spec) {
            Ok(()) => safe.push(spec.clone()),
            Err(reason) => rejected.push((spec.clone(), reason)),
        }
    }
    for (spec, reason) in &rejected {
        eprintln!("✖ Rejected unsafe package spec {spec:?}: {reason}");
    }
    if safe.is_empty() {
        log::warn!("No valid packages left after validation");
        return Ok(false);
    }

    let mut command = if uv_available().await {
        log::info!("Installing {} packages with uv", safe.len());
        let mut cmd = Command::new("uv");
        cmd.arg("pip").arg("install");
        if std::env::var_os("VIRTUAL_ENV").is_none() {
            log::warn!("No virtual environment detected, using --system");
            cmd.arg("--system");
        }
        cmd
    } else {
        log::info!("uv not found, falling back to pip");
        let mut cmd = Command::new(python_executable());
        cmd.arg("-m").arg("pip").arg("install");
        cmd
    };
    command.args(&safe);

    let status = command
        .status()
        .await
        .context("Failed to launch the installer")?;
    if !status.success() {
        log::error!("Installer exited with {status}");
    }
    Ok(status.success())
}

async fn uv_available() -> bool {
    Command::new("uv")
        .arg("--version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

fn python_executable() -> String {
    std::env::var("PYINFER_PYTHON").unwrap_or_else(|_| "python3".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsafe_specs_never_reach_the_installer() {
        // Only rejected specs: install_packages returns before spawning.
        let specs = vec!["pkg; rm -rf /".to_string(), "a|b".to_string()];
        let ok = install_packages(&specs).await.unwrap();
        assert!(!ok);
    }

    #[tokio::test]
    async fn empty_spec_list_is_a_no_op() {
        assert!(install_packages(&[]).await.unwrap());
    }
}
