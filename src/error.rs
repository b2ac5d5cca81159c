//! Error taxonomy for the closure and relocation engine.
//!
//! Only [`StagingError`] and [`LayoutError`] abort a run. Everything else is
//! collected, logged as a warning and surfaced again by the verifier.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::platform::Platform;

/// An external introspection or rewrite tool could not be run at all.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{program} command not found - install it or add it to PATH")]
    NotFound { program: String },
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
}

/// A binary could not be inspected. Treated as "no dependencies found".
#[derive(Debug, Error)]
pub enum InspectionError {
    #[error("File does not exist: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("cannot inspect {}: {source}", binary.display())]
    Tool {
        binary: PathBuf,
        #[source]
        source: ToolError,
    },
    #[error("{tool} failed on {}: {stderr}", binary.display())]
    Failed {
        binary: PathBuf,
        tool: &'static str,
        stderr: String,
    },
}

/// A binary's search-path metadata could not be rewritten.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("cannot rewrite {}: {source}", binary.display())]
    Tool {
        binary: PathBuf,
        #[source]
        source: ToolError,
    },
    #[error("`{command}` failed on {}: {stderr}", binary.display())]
    Failed {
        binary: PathBuf,
        command: String,
        stderr: String,
    },
    #[error("cannot read search paths of {}: {source}", binary.display())]
    Inspection {
        binary: PathBuf,
        #[source]
        source: InspectionError,
    },
    #[error("{adapter} rewriter cannot relocate a {layout} bundle")]
    PlatformMismatch {
        adapter: Platform,
        /// Platform the bundle layout was built for.
        layout: Platform,
    },
    #[error("failed to patch loader init {}: {source}", path.display())]
    InitPatch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Copying into the bundle failed. Always fatal.
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to replace stale {}: {source}", path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to create alias {} -> {}: {source}", link.display(), target.display())]
    Alias {
        link: PathBuf,
        target: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The installation tree does not have the expected shape. Always fatal.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("Install directory not found: {}", .0.display())]
    InstallDirMissing(PathBuf),
    #[error("Cannot find {package} package in {}", install_dir.display())]
    PackageNotFound {
        package: String,
        install_dir: PathBuf,
    },
    #[error("Cannot find lib directory in {}", .0.display())]
    LibDirNotFound(PathBuf),
}
