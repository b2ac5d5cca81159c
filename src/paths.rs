//! Library and package path searching within an installation tree.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::LayoutError;
use crate::platform::Platform;

/// Find a library by name in the project's library directory.
///
/// Dangling symlinks are returned too so the resolver can report them instead
/// of silently treating the library as foreign.
///
/// Returns `None` if there is no directory entry with that name.
#[must_use = "found library path should be used"]
pub fn find_library(lib_dir: &Path, lib_name: &str) -> Option<PathBuf> {
    if lib_name.is_empty() {
        return None;
    }
    let candidate = lib_dir.join(lib_name);
    (candidate.exists() || candidate.is_symlink()).then_some(candidate)
}

/// Find the `site-packages` directory that contains `package`.
///
/// Searches `lib/` and `Lib/` for a direct `site-packages` (Windows conda
/// layout) first, then `python*/site-packages` in sorted order.
pub fn find_site_packages(install_dir: &Path, package: &str) -> Result<PathBuf, LayoutError> {
    for base in [install_dir.join("lib"), install_dir.join("Lib")] {
        if !base.is_dir() {
            continue;
        }

        let direct = base.join("site-packages");
        if direct.join(package).exists() {
            return Ok(direct);
        }

        let mut versioned: Vec<PathBuf> = fs::read_dir(&base)
            .into_iter()
            .flatten()
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("python"))
            .map(|entry| entry.path().join("site-packages"))
            .collect();
        versioned.sort();

        if let Some(found) = versioned.into_iter().find(|sp| sp.join(package).exists()) {
            return Ok(found);
        }
    }

    Err(LayoutError::PackageNotFound {
        package: package.to_string(),
        install_dir: install_dir.to_path_buf(),
    })
}

/// Find the directory of `package` itself.
pub fn find_package_dir(install_dir: &Path, package: &str) -> Result<PathBuf, LayoutError> {
    find_site_packages(install_dir, package).map(|sp| sp.join(package))
}

/// Find the directory holding the project's native libraries.
///
/// Windows installs put DLLs next to executables in `bin/`; everything else
/// uses `lib/`.
pub fn find_lib_dir(install_dir: &Path, platform: Platform) -> Result<PathBuf, LayoutError> {
    if platform == Platform::Windows {
        let bin_dir = install_dir.join("bin");
        if bin_dir.is_dir() {
            return Ok(bin_dir);
        }
    }
    let lib_dir = install_dir.join("lib");
    if lib_dir.is_dir() {
        return Ok(lib_dir);
    }
    Err(LayoutError::LibDirNotFound(install_dir.to_path_buf()))
}
