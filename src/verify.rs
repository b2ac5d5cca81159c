//! Post-relocation audit of a bundle.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::format::BinaryFormat;
use crate::layout::BundleLayout;

/// One reason the bundle would not load from an arbitrary location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// A search path still names the build-time library directory.
    BuildPathRecord { binary: PathBuf, record: String },
    /// A search path that is neither location relative nor the build dir.
    AbsoluteRecord { binary: PathBuf, record: String },
    /// Owned dependencies but no search path into the bundle library directory.
    MissingSearchPath { binary: PathBuf, expected: String },
    /// An owned dependency with no file in the bundle library directory.
    MissingDependency { binary: PathBuf, dependency: String },
    /// The binary could not be re-inspected, so nothing about it is known.
    Uninspectable { binary: PathBuf, reason: String },
}

impl Violation {
    /// The binary the violation is about.
    #[must_use]
    pub fn binary(&self) -> &Path {
        match self {
            Self::BuildPathRecord { binary, .. }
            | Self::AbsoluteRecord { binary, .. }
            | Self::MissingSearchPath { binary, .. }
            | Self::MissingDependency { binary, .. }
            | Self::Uninspectable { binary, .. } => binary,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = file_name(self.binary());
        match self {
            Self::BuildPathRecord { record, .. } => {
                write!(f, "{name} still has old rpath: {record}")
            }
            Self::AbsoluteRecord { record, .. } => {
                write!(f, "{name} has non-relocatable rpath: {record}")
            }
            Self::MissingSearchPath { expected, .. } => {
                write!(f, "{name} is missing rpath {expected}")
            }
            Self::MissingDependency { dependency, .. } => {
                write!(f, "{name} needs {dependency}, missing from the bundle")
            }
            Self::Uninspectable { reason, .. } => {
                write!(f, "{name} could not be verified: {reason}")
            }
        }
    }
}

fn file_name(path: &Path) -> String {
    match path.file_name() {
        Some(name) => name.to_string_lossy().into_owned(),
        None => path.display().to_string(),
    }
}

/// Result of verifying a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Binaries re-inspected.
    pub checked: usize,
    pub violations: Vec<Violation>,
    /// The platform has no binary-level search paths to verify.
    pub skipped: bool,
}

impl VerificationReport {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Re-inspect every binary in `layout` and collect all violations.
///
/// `build_lib_dir` is the install tree's library directory: it decides which
/// dependencies are owned and must not appear in any search path.
pub fn verify_bundle(
    format: &dyn BinaryFormat,
    layout: &BundleLayout,
    build_lib_dir: &Path,
) -> VerificationReport {
    let mut report = VerificationReport::default();

    let platform = format.platform();
    let bundle = layout.platform;
    if platform != bundle {
        report.violations.push(Violation::Uninspectable {
            binary: layout.root.clone(),
            reason: format!("{platform} inspector cannot verify a {bundle} bundle"),
        });
        return report;
    }

    let Some(origin) = platform.origin_token() else {
        info!(%platform, "skipping rpath verification (uses DLL directories)");
        report.skipped = true;
        return report;
    };

    let binaries = match layout.binaries() {
        Ok(binaries) => binaries,
        Err(err) => {
            report.violations.push(Violation::Uninspectable {
                binary: layout.root.clone(),
                reason: err.to_string(),
            });
            return report;
        }
    };

    let build_dir = build_lib_dir.to_string_lossy();
    let build_dir = build_dir.trim_end_matches('/');

    for binary in binaries {
        report.checked += 1;
        let inspection = match format.inspect(&binary.path, build_lib_dir) {
            Ok(inspection) => inspection,
            Err(err) => {
                report.violations.push(Violation::Uninspectable {
                    binary: binary.path,
                    reason: err.to_string(),
                });
                continue;
            }
        };

        if let Some(token) = layout.search_path_token(&binary.path) {
            if !inspection.dependencies.is_empty() && !inspection.search_paths.contains(&token) {
                report.violations.push(Violation::MissingSearchPath {
                    binary: binary.path.clone(),
                    expected: token,
                });
            }
        }

        for record in inspection.search_paths {
            if !build_dir.is_empty() && record.starts_with(build_dir) {
                report.violations.push(Violation::BuildPathRecord {
                    binary: binary.path.clone(),
                    record,
                });
            } else if !record.starts_with(origin) {
                report.violations.push(Violation::AbsoluteRecord {
                    binary: binary.path.clone(),
                    record,
                });
            }
        }

        for dependency in inspection.dependencies {
            if !layout.lib_dir.join(&dependency).exists() {
                report.violations.push(Violation::MissingDependency {
                    binary: binary.path.clone(),
                    dependency,
                });
            }
        }
    }

    if report.is_ok() {
        info!(checked = report.checked, "all references verified OK");
    } else {
        warn!("Unresolved references found:");
        for violation in &report.violations {
            warn!("  {violation}");
        }
    }
    report
}
