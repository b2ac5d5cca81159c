//! Transitive closure of owned libraries.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::InspectionError;
use crate::format::BinaryFormat;
use crate::paths::find_library;

/// A dependency name bound to the real file that provides it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLibrary {
    pub name: String,
    /// Canonical path, symlinks followed.
    pub real_path: PathBuf,
}

/// Owned libraries required by a set of entry binaries, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosureSet {
    libraries: BTreeMap<String, ResolvedLibrary>,
}

impl ClosureSet {
    pub fn insert(&mut self, library: ResolvedLibrary) {
        self.libraries.insert(library.name.clone(), library);
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.libraries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.libraries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.libraries.is_empty()
    }

    /// Libraries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedLibrary> {
        self.libraries.values()
    }

    /// Library names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.libraries.keys().map(String::as_str).collect()
    }

    /// Libraries grouped by real file; names within a group are sorted.
    #[must_use]
    pub fn by_real_path(&self) -> BTreeMap<&Path, Vec<&ResolvedLibrary>> {
        let mut groups: BTreeMap<&Path, Vec<&ResolvedLibrary>> = BTreeMap::new();
        for library in self.libraries.values() {
            groups
                .entry(library.real_path.as_path())
                .or_default()
                .push(library);
        }
        groups
    }
}

/// An owned-looking dependency that the library directory does not provide.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("referenced lib {name} (needed by {}) not found in {}", referrer.display(), lib_dir.display())]
pub struct UnresolvedDependency {
    pub name: String,
    /// First binary seen referencing the name.
    pub referrer: PathBuf,
    pub lib_dir: PathBuf,
}

/// Outcome of one resolution run.
#[derive(Debug, Default)]
pub struct Resolution {
    pub closure: ClosureSet,
    pub unresolved: Vec<UnresolvedDependency>,
    pub inspection_failures: Vec<InspectionError>,
}

impl Resolution {
    /// Inspect `binary`, degrading a failure to "no dependencies".
    fn dependencies_of(
        &mut self,
        format: &dyn BinaryFormat,
        binary: &Path,
        lib_dir: &Path,
    ) -> Vec<String> {
        match format.inspect(binary, lib_dir) {
            Ok(inspection) => inspection.dependencies,
            Err(err) => {
                warn!("{err}; assuming no dependencies");
                self.inspection_failures.push(err);
                Vec::new()
            }
        }
    }
}

/// Compute the owned libraries transitively required by `entries`.
///
/// Each name is processed at most once and each real file is inspected at
/// most once, so cycles terminate. The resulting [`ClosureSet`] does not
/// depend on processing order.
pub fn resolve_closure(
    format: &dyn BinaryFormat,
    entries: &[PathBuf],
    lib_dir: &Path,
) -> Resolution {
    let mut resolution = Resolution::default();
    let mut to_process: Vec<(String, PathBuf)> = Vec::new();
    let mut queued: HashSet<String> = HashSet::new();
    let mut inspected: HashSet<PathBuf> = HashSet::new();

    for entry in entries {
        for name in resolution.dependencies_of(format, entry, lib_dir) {
            if queued.insert(name.clone()) {
                to_process.push((name, entry.clone()));
            }
        }
    }

    while let Some((name, referrer)) = to_process.pop() {
        if resolution.closure.contains(&name) {
            continue;
        }

        let Some(candidate) = find_library(lib_dir, &name) else {
            let unresolved = UnresolvedDependency {
                name,
                referrer,
                lib_dir: lib_dir.to_path_buf(),
            };
            warn!("{unresolved}");
            resolution.unresolved.push(unresolved);
            continue;
        };

        let real_path = match fs::canonicalize(&candidate) {
            Ok(path) => path,
            Err(err) => {
                let unresolved = UnresolvedDependency {
                    name,
                    referrer,
                    lib_dir: lib_dir.to_path_buf(),
                };
                warn!(
                    "{unresolved} ({} is a broken alias: {err})",
                    candidate.display()
                );
                resolution.unresolved.push(unresolved);
                continue;
            }
        };

        debug!(%name, real_path = %real_path.display(), "resolved");
        resolution.closure.insert(ResolvedLibrary {
            name,
            real_path: real_path.clone(),
        });

        if !inspected.insert(real_path.clone()) {
            continue;
        }
        for dep in resolution.dependencies_of(format, &real_path, lib_dir) {
            if !resolution.closure.contains(&dep) && queued.insert(dep.clone()) {
                to_process.push((dep, real_path.clone()));
            }
        }
    }

    info!(
        libraries = resolution.closure.len(),
        unresolved = resolution.unresolved.len(),
        "resolved native library closure"
    );
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RewriteError;
    use crate::format::Inspection;
    use crate::platform::Platform;
    use std::collections::HashMap;
    use tempfile::TempDir;

    /// Dependency graph keyed by file name; reports every edge as a candidate.
    struct GraphFormat {
        edges: HashMap<&'static str, Vec<&'static str>>,
    }

    impl BinaryFormat for GraphFormat {
        fn platform(&self) -> Platform {
            Platform::MacOs
        }

        fn inspect(&self, binary: &Path, _lib_dir: &Path) -> Result<Inspection, InspectionError> {
            let name = binary.file_name().unwrap().to_string_lossy();
            match self.edges.get(name.as_ref()) {
                Some(deps) => Ok(Inspection {
                    dependencies: deps.iter().map(|d| d.to_string()).collect(),
                    search_paths: Vec::new(),
                }),
                None => Err(InspectionError::MissingFile(binary.to_path_buf())),
            }
        }

        fn rewrite_search_path(&self, _binary: &Path, _token: &str) -> Result<(), RewriteError> {
            Ok(())
        }
    }

    fn lib_dir_with(names: &[&str]) -> TempDir {
        let temp = TempDir::new().unwrap();
        for name in names {
            fs::write(temp.path().join(name), name).unwrap();
        }
        temp
    }

    #[test]
    fn test_cycle_terminates() {
        let lib = lib_dir_with(&["libA", "libB"]);
        let format = GraphFormat {
            edges: HashMap::from([
                ("mod", vec!["libA"]),
                ("libA", vec!["libB"]),
                ("libB", vec!["libA"]),
            ]),
        };

        let resolution = resolve_closure(&format, &[PathBuf::from("mod")], lib.path());
        assert_eq!(resolution.closure.names(), vec!["libA", "libB"]);
        assert!(resolution.unresolved.is_empty());
    }

    #[test]
    fn test_missing_library_is_reported_once() {
        let lib = lib_dir_with(&["libA"]);
        let format = GraphFormat {
            edges: HashMap::from([
                ("mod1", vec!["libA", "libZ"]),
                ("mod2", vec!["libZ"]),
                ("libA", vec!["libZ"]),
            ]),
        };

        let entries = [PathBuf::from("mod1"), PathBuf::from("mod2")];
        let resolution = resolve_closure(&format, &entries, lib.path());
        assert_eq!(resolution.closure.names(), vec!["libA"]);
        assert_eq!(resolution.unresolved.len(), 1);
        assert_eq!(resolution.unresolved[0].name, "libZ");
    }

    #[test]
    fn test_inspection_failure_degrades_to_no_dependencies() {
        let lib = lib_dir_with(&["libA"]);
        let format = GraphFormat {
            edges: HashMap::from([("mod", vec!["libA"])]),
        };

        // libA has no entry in the graph, so inspecting it fails
        let resolution = resolve_closure(&format, &[PathBuf::from("mod")], lib.path());
        assert_eq!(resolution.closure.names(), vec!["libA"]);
        assert_eq!(resolution.inspection_failures.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_aliases_share_real_path() {
        let lib = lib_dir_with(&["libA.so.1.0"]);
        std::os::unix::fs::symlink("libA.so.1.0", lib.path().join("libA.so.1")).unwrap();
        std::os::unix::fs::symlink("libA.so.1.0", lib.path().join("libA.so")).unwrap();
        let format = GraphFormat {
            edges: HashMap::from([
                ("mod", vec!["libA.so.1", "libA.so"]),
                ("libA.so.1.0", vec![]),
            ]),
        };

        let resolution = resolve_closure(&format, &[PathBuf::from("mod")], lib.path());
        assert_eq!(resolution.closure.len(), 2);
        let groups = resolution.closure.by_real_path();
        assert_eq!(groups.len(), 1);
        let names: Vec<&str> = groups
            .values()
            .next()
            .unwrap()
            .iter()
            .map(|l| l.name.as_str())
            .collect();
        assert_eq!(names, vec!["libA.so", "libA.so.1"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_dangling_alias_is_unresolved() {
        let lib = lib_dir_with(&[]);
        std::os::unix::fs::symlink("libgone.so.1.0", lib.path().join("libgone.so.1")).unwrap();
        let format = GraphFormat {
            edges: HashMap::from([("mod", vec!["libgone.so.1"])]),
        };

        let resolution = resolve_closure(&format, &[PathBuf::from("mod")], lib.path());
        assert!(resolution.closure.is_empty());
        assert_eq!(resolution.unresolved[0].name, "libgone.so.1");
    }
}
