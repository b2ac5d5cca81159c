//! Copy the Python packages out of the installation tree.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::config::BundleConfig;
use crate::copy::copy_dir_filtered;
use crate::paths::{find_package_dir, find_site_packages};
use crate::platform::Platform;

/// Copy the primary package into `staging_dir/<package>`.
pub fn stage_primary_package(
    install_dir: &Path,
    staging_dir: &Path,
    config: &BundleConfig,
    platform: Platform,
) -> Result<PathBuf> {
    let src = find_package_dir(install_dir, &config.package)?;
    let dst = staging_dir.join(&config.package);

    copy_dir_filtered(&src, &dst, &["__pycache__"])
        .with_context(|| format!("Failed to stage {} package", config.package))?;

    let (n_py, n_mod) = count_modules(&dst, platform)?;
    info!(
        "Staged {} package: {n_py} .py, {n_mod} {} files",
        config.package,
        platform.module_ext()
    );
    Ok(dst)
}

/// Copy the companion package and its top-level module into `staging_dir`.
///
/// Test suites are left behind. An `__init__.py` is created if the install
/// shipped the package as a namespace directory.
pub fn stage_companion_package(
    install_dir: &Path,
    staging_dir: &Path,
    config: &BundleConfig,
    platform: Platform,
) -> Result<PathBuf> {
    let site_packages = find_site_packages(install_dir, &config.companion_package)?;
    let src = site_packages.join(&config.companion_package);
    let dst = staging_dir.join(&config.companion_package);

    copy_dir_filtered(&src, &dst, &["__pycache__", "test"])
        .with_context(|| format!("Failed to stage {} package", config.companion_package))?;

    let module_src = site_packages.join(&config.companion_module);
    if module_src.exists() {
        fs::copy(&module_src, staging_dir.join(&config.companion_module))
            .with_context(|| format!("Failed to copy {}", module_src.display()))?;
    }

    let init = dst.join("__init__.py");
    if !init.exists() {
        fs::write(&init, "").with_context(|| format!("Failed to create {}", init.display()))?;
    }

    let (n_py, n_mod) = count_modules(&dst, platform)?;
    info!(
        "Staged {}: {n_py} .py, {n_mod} {} files",
        config.companion_package,
        platform.module_ext()
    );
    Ok(dst)
}

/// Count `.py` files recursively and extension modules at the top level.
fn count_modules(dir: &Path, platform: Platform) -> Result<(usize, usize)> {
    let mut n_py = 0;
    let mut n_mod = 0;
    let mut pending = vec![(dir.to_path_buf(), true)];

    while let Some((current, top_level)) = pending.pop() {
        let entries = fs::read_dir(&current)
            .with_context(|| format!("Failed to read {}", current.display()))?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push((path, false));
                continue;
            }
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            if name.ends_with(".py") {
                n_py += 1;
            } else if top_level && name.ends_with(platform.module_ext()) {
                n_mod += 1;
            }
        }
    }

    Ok((n_py, n_mod))
}
