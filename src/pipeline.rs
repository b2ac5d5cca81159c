//! End-to-end bundle build.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::config::BundleConfig;
use crate::error::LayoutError;
use crate::format;
use crate::layout::BundleLayout;
use crate::package::{stage_companion_package, stage_primary_package};
use crate::paths::find_lib_dir;
use crate::platform::Platform;
use crate::relocate::{relocate_bundle, RelocationReport};
use crate::resolve::{resolve_closure, UnresolvedDependency};
use crate::stage::stage_libraries;
use crate::tools::ToolRunner;
use crate::verify::{verify_bundle, VerificationReport};
use crate::wheel::{build_wheel, write_manifest};

/// Inputs of one build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub install_dir: PathBuf,
    pub output_dir: PathBuf,
    pub version: String,
    pub platform: Platform,
    pub config: BundleConfig,
    /// Interpreter used to build and retag the wheel.
    pub python: String,
    /// Stop after verification, leaving the staged tree in `output_dir/staging`.
    pub skip_wheel: bool,
}

/// Result of one build.
#[derive(Debug)]
pub struct BuildOutcome {
    pub wheel: Option<PathBuf>,
    /// Kept staging tree (only with `skip_wheel`).
    pub staging: Option<PathBuf>,
    pub unresolved: Vec<UnresolvedDependency>,
    pub relocation: RelocationReport,
    pub verification: VerificationReport,
}

impl BuildOutcome {
    /// Everything resolved, rewritten and verified.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.unresolved.is_empty()
            && self.relocation.failures.is_empty()
            && self.verification.is_ok()
    }
}

/// Stage, relocate, verify and (optionally) package a bundle.
///
/// Layout and staging errors abort; inspection, resolution and rewrite
/// problems are collected into the outcome.
pub fn run(options: &BuildOptions, tools: &dyn ToolRunner) -> Result<BuildOutcome> {
    let install_dir = &options.install_dir;
    if !install_dir.is_dir() {
        return Err(LayoutError::InstallDirMissing(install_dir.clone()).into());
    }
    fs::create_dir_all(&options.output_dir)
        .with_context(|| format!("Failed to create {}", options.output_dir.display()))?;
    let lib_dir = find_lib_dir(install_dir, options.platform)?;

    info!(
        "Building {} wheel v{} ({})",
        options.config.distribution, options.version, options.platform
    );
    info!("  Install dir: {}", install_dir.display());
    info!("  Output dir:  {}", options.output_dir.display());

    let temp;
    let staging = if options.skip_wheel {
        let dir = options.output_dir.join("staging");
        if dir.exists() {
            info!("  Clearing previous staging tree {}", dir.display());
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to remove {}", dir.display()))?;
        }
        fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        dir
    } else {
        temp = tempfile::Builder::new()
            .prefix("native-bundle-")
            .tempdir()
            .context("Failed to create staging directory")?;
        temp.path().join("staging")
    };

    let mut outcome = build_in(options, tools, &lib_dir, &staging)?;
    if options.skip_wheel {
        outcome.staging = Some(staging);
    }
    Ok(outcome)
}

fn build_in(
    options: &BuildOptions,
    tools: &dyn ToolRunner,
    lib_dir: &Path,
    staging: &Path,
) -> Result<BuildOutcome> {
    let platform = options.platform;
    let config = &options.config;
    let format = format::for_platform(platform, tools);
    let layout = BundleLayout::new(staging, config, platform);

    info!("[1/6] Staging {} package...", config.package);
    stage_primary_package(&options.install_dir, staging, config, platform)?;

    info!("[2/6] Staging {} package...", config.companion_package);
    stage_companion_package(&options.install_dir, staging, config, platform)?;

    info!("[3/6] Collecting and staging native libraries...");
    let entries = layout
        .entry_binaries()
        .with_context(|| format!("Failed to list modules in {}", staging.display()))?;
    info!(
        "  Scanning {} {} files for native lib dependencies...",
        entries.len(),
        platform.module_ext()
    );
    let resolution = resolve_closure(format.as_ref(), &entries, lib_dir);
    info!("  Found {} required native libs", resolution.closure.len());
    stage_libraries(&resolution.closure, &layout.lib_dir)?;

    info!("[4/6] Fixing library paths...");
    let relocation = relocate_bundle(format.as_ref(), &layout);

    info!("[5/6] Verifying references...");
    let verification = verify_bundle(format.as_ref(), &layout, lib_dir);

    let wheel = if options.skip_wheel {
        info!("[6/6] Skipping wheel build");
        write_manifest(staging, config, platform, &options.version)?;
        None
    } else {
        info!("[6/6] Creating setup files and building wheel...");
        write_manifest(staging, config, platform, &options.version)?;
        Some(build_wheel(
            tools,
            &options.python,
            staging,
            &options.output_dir,
            config,
            platform,
        )?)
    };

    Ok(BuildOutcome {
        wheel,
        staging: None,
        unresolved: resolution.unresolved,
        relocation,
        verification,
    })
}
