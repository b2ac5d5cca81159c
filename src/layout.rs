//! Bundle directory layout and the binaries it holds.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::config::BundleConfig;
use crate::platform::Platform;

/// Why a binary is in the bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Extension module loaded directly by Python.
    Entry,
    /// Staged shared library.
    Dependency,
}

/// One binary under consideration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRef {
    pub path: PathBuf,
    pub role: Role,
}

/// Paths of a staged bundle.
///
/// ```text
/// <root>/
///   <package>/            primary package, entry modules
///     <lib_subdir>/       every owned native library
///   <companion_package>/  companion entry modules, loads ../<package>/<lib_subdir>
///   <companion_module>
/// ```
#[derive(Debug, Clone)]
pub struct BundleLayout {
    pub root: PathBuf,
    pub package_dir: PathBuf,
    pub companion_dir: PathBuf,
    pub lib_dir: PathBuf,
    pub platform: Platform,
}

impl BundleLayout {
    pub fn new(root: &Path, config: &BundleConfig, platform: Platform) -> Self {
        let package_dir = root.join(&config.package);
        Self {
            root: root.to_path_buf(),
            lib_dir: package_dir.join(platform.lib_subdir()),
            companion_dir: root.join(&config.companion_package),
            package_dir,
            platform,
        }
    }

    /// Extension modules directly inside the primary and companion packages.
    pub fn entry_binaries(&self) -> io::Result<Vec<PathBuf>> {
        let ext = self.platform.module_ext();
        let mut entries = files_in(&self.package_dir, |name| name.ends_with(ext))?;
        entries.extend(files_in(&self.companion_dir, |name| name.ends_with(ext))?);
        Ok(entries)
    }

    /// Shared libraries in the library subdirectory, excluding alias links.
    pub fn staged_libraries(&self) -> io::Result<Vec<PathBuf>> {
        let platform = self.platform;
        let libs = files_in(&self.lib_dir, |name| platform.is_shared_library(name))?;
        Ok(libs.into_iter().filter(|path| !path.is_symlink()).collect())
    }

    /// Every binary in the bundle, entries first.
    pub fn binaries(&self) -> io::Result<Vec<BinaryRef>> {
        let mut binaries = Vec::new();
        for (role, paths) in [
            (Role::Entry, self.entry_binaries()?),
            (Role::Dependency, self.staged_libraries()?),
        ] {
            binaries.extend(paths.into_iter().map(|path| BinaryRef { path, role }));
        }
        Ok(binaries)
    }

    /// Location-relative search path that makes `binary` find the library
    /// subdirectory, or `None` if the platform has no such token.
    #[must_use]
    pub fn search_path_token(&self, binary: &Path) -> Option<String> {
        let origin = self.platform.origin_token()?;
        let from = binary.parent().unwrap_or(&self.root);
        let relative = relative_path(from, &self.lib_dir);
        if relative.is_empty() {
            Some(origin.to_string())
        } else {
            Some(format!("{origin}/{relative}"))
        }
    }
}

/// Sorted regular files (or links) directly in `dir` whose name passes `keep`.
///
/// A missing directory has no files.
fn files_in(dir: &Path, keep: impl Fn(&str) -> bool) -> io::Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        if keep(&entry.file_name().to_string_lossy()) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Lexical `/`-separated path from directory `from` to `to`.
///
/// Both paths must share a prefix (they live in the same bundle); no
/// filesystem access or symlink resolution happens.
#[must_use]
pub fn relative_path(from: &Path, to: &Path) -> String {
    let from: Vec<Component<'_>> = from.components().filter(not_cur_dir).collect();
    let to: Vec<Component<'_>> = to.components().filter(not_cur_dir).collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut parts: Vec<String> = vec!["..".to_string(); from.len() - common];
    parts.extend(
        to[common..]
            .iter()
            .map(|c| c.as_os_str().to_string_lossy().into_owned()),
    );
    parts.join("/")
}

fn not_cur_dir(component: &Component<'_>) -> bool {
    *component != Component::CurDir
}
