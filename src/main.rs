use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::Parser;
use native_bundle::pipeline::{self, BuildOptions};
use native_bundle::{BundleConfig, Platform, SystemTools};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Build a self-contained wheel from pre-built install artifacts.
///
/// Native libraries needed by the packaged extension modules are collected,
/// copied into the package, and every binary is relinked to find them
/// relative to its own location.
#[derive(Parser, Debug)]
#[command(name = "native-bundle", about, long_about = None, disable_version_flag = true)]
struct Cli {
    /// Installation tree produced by the native build.
    #[arg(long, default_value = "build/Install")]
    install_dir: PathBuf,

    /// Directory that receives the wheel.
    #[arg(long, default_value = "dist")]
    output_dir: PathBuf,

    /// Version written to the package metadata.
    #[arg(long = "version", default_value = "1.6.0")]
    pkg_version: String,

    /// Target platform (macos, linux, windows). Defaults to the host.
    #[arg(long)]
    platform: Option<Platform>,

    /// JSON bundle configuration overriding package and distribution names.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Python interpreter used to build and retag the wheel.
    #[arg(long, default_value = "python3")]
    python: String,

    /// Stage, relocate and verify into <output-dir>/staging without building a wheel.
    #[arg(long)]
    skip_wheel: bool,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            error!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<bool> {
    let Some(platform) = cli.platform.or_else(Platform::host) else {
        bail!("unsupported host OS {}; pass --platform", env::consts::OS);
    };
    let config = match &cli.config {
        Some(path) => BundleConfig::load(path)?,
        None => BundleConfig::default(),
    };

    let options = BuildOptions {
        install_dir: std::path::absolute(&cli.install_dir)?,
        output_dir: std::path::absolute(&cli.output_dir)?,
        version: cli.pkg_version,
        platform,
        config,
        python: cli.python,
        skip_wheel: cli.skip_wheel,
    };

    let outcome = pipeline::run(&options, &SystemTools)?;

    if let Some(wheel) = &outcome.wheel {
        let size_mb = std::fs::metadata(wheel).map(|m| m.len() as f64 / (1024.0 * 1024.0))?;
        info!("Wheel created: {}", wheel.display());
        info!("Size: {size_mb:.1} MB");
    }
    if let Some(staging) = &outcome.staging {
        info!("Staged bundle left in {}", staging.display());
    }

    if !outcome.is_ok() {
        warn!("Some references could not be verified:");
        for unresolved in &outcome.unresolved {
            warn!("  {unresolved}");
        }
        for failure in &outcome.relocation.failures {
            warn!("  {failure}");
        }
        for violation in &outcome.verification.violations {
            warn!("  {violation}");
        }
        return Ok(false);
    }
    Ok(true)
}
