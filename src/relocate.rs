//! Point every bundled binary's search paths into the bundle.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::error::RewriteError;
use crate::format::BinaryFormat;
use crate::layout::BundleLayout;

/// What relocation did. Failures are soft; the verifier reports their effect.
#[derive(Debug, Default)]
pub struct RelocationReport {
    pub rewritten: Vec<PathBuf>,
    pub failures: Vec<RewriteError>,
    /// Loader init patched instead of binaries (PE).
    pub patched_init: Option<PathBuf>,
}

/// Rewrite entry modules and staged libraries of `layout`.
///
/// Entry modules get a token pointing at the library subdirectory relative to
/// their own directory; staged libraries get the bare origin token.
pub fn relocate_bundle(format: &dyn BinaryFormat, layout: &BundleLayout) -> RelocationReport {
    let mut report = RelocationReport::default();

    let platform = format.platform();
    if platform != layout.platform {
        let err = RewriteError::PlatformMismatch {
            adapter: platform,
            layout: layout.platform,
        };
        warn!("{err}");
        report.failures.push(err);
        return report;
    }

    match format.relocate_package(layout) {
        Ok(patched) => report.patched_init = patched,
        Err(err) => {
            warn!("{err}");
            report.failures.push(err);
        }
    }

    if !platform.has_search_paths() {
        info!(%platform, "DLL lookup handled by loader init; binaries left as-is");
        return report;
    }

    let binaries = match layout.binaries() {
        Ok(binaries) => binaries,
        Err(err) => {
            warn!(
                "cannot list bundle binaries in {}: {err}",
                layout.root.display()
            );
            return report;
        }
    };

    for binary in binaries {
        let Some(token) = layout.search_path_token(&binary.path) else {
            continue;
        };
        match format.rewrite_search_path(&binary.path, &token) {
            Ok(()) => report.rewritten.push(binary.path),
            Err(err) => {
                warn!("{err}");
                report.failures.push(err);
            }
        }
    }

    info!(
        rewritten = report.rewritten.len(),
        failed = report.failures.len(),
        "search paths fixed"
    );
    report
}
