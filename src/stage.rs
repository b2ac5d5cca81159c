//! Copy a resolved closure into the bundle's library directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::copy::{create_alias, replace_file, same_content};
use crate::error::StagingError;
use crate::resolve::ClosureSet;

/// What staging did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    /// Real files copied, one per distinct real path.
    pub copied: Vec<PathBuf>,
    /// Extra names that alias an already copied file.
    pub aliases: Vec<PathBuf>,
    /// Destinations that held different content from an earlier run.
    pub stale: Vec<PathBuf>,
}

/// Stage every library of `closure` into `bundle_lib_dir` under its
/// dependency name.
///
/// Names that resolve to the same real file are copied once; the others
/// become aliases of the first (sorted) name. Re-running with the same
/// closure leaves the directory unchanged.
pub fn stage_libraries(
    closure: &ClosureSet,
    bundle_lib_dir: &Path,
) -> Result<StageReport, StagingError> {
    fs::create_dir_all(bundle_lib_dir).map_err(|source| StagingError::CreateDir {
        path: bundle_lib_dir.to_path_buf(),
        source,
    })?;

    let mut report = StageReport::default();

    for (real_path, libraries) in closure.by_real_path() {
        let Some((primary, aliases)) = libraries.split_first() else {
            continue;
        };

        let dest = bundle_lib_dir.join(&primary.name);
        if is_stale(real_path, &dest) {
            warn!(
                "replacing stale {} (content differs from {})",
                dest.display(),
                real_path.display()
            );
            report.stale.push(dest.clone());
        }

        replace_file(real_path, &dest).map_err(|source| StagingError::Copy {
            from: real_path.to_path_buf(),
            to: dest.clone(),
            source,
        })?;
        debug!(name = %primary.name, from = %real_path.display(), "staged");
        report.copied.push(dest);

        for alias in aliases {
            let link = bundle_lib_dir.join(&alias.name);
            create_alias(&primary.name, &link).map_err(|source| StagingError::Alias {
                link: link.clone(),
                target: PathBuf::from(&primary.name),
                source,
            })?;
            report.aliases.push(link);
        }
    }

    info!(
        copied = report.copied.len(),
        aliases = report.aliases.len(),
        dir = %bundle_lib_dir.display(),
        "staged native libraries"
    );
    Ok(report)
}

/// Does `dest` hold something other than the content of `src`?
fn is_stale(src: &Path, dest: &Path) -> bool {
    if dest.is_symlink() {
        return true;
    }
    if !dest.exists() {
        return false;
    }
    !same_content(src, dest).unwrap_or(false)
}
