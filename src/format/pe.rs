//! PE inspection with dumpbin.
//!
//! PE images carry no search-path records, so nothing is rewritten in the
//! binaries. Instead the package's `__init__.py` registers the bundled DLL
//! directory before any extension module is imported.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{ensure_exists, BinaryFormat, Inspection};
use crate::classify::{classify_dll, Ownership};
use crate::error::{InspectionError, RewriteError};
use crate::layout::BundleLayout;
use crate::platform::Platform;
use crate::tools::ToolRunner;

const DEPENDENTS_HEADER: &str = "Image has the following dependencies";

/// Line that marks a loader init as already patched.
const PATCH_MARKER: &str = "_os.add_dll_directory(_libs_dir)";

/// PE adapter.
pub struct PeFormat<'a> {
    tools: &'a dyn ToolRunner,
}

impl<'a> PeFormat<'a> {
    pub fn new(tools: &'a dyn ToolRunner) -> Self {
        Self { tools }
    }
}

impl BinaryFormat for PeFormat<'_> {
    fn platform(&self) -> Platform {
        Platform::Windows
    }

    fn inspect(&self, binary: &Path, lib_dir: &Path) -> Result<Inspection, InspectionError> {
        ensure_exists(binary)?;

        let args: Vec<OsString> = vec!["/dependents".into(), binary.into()];
        let output = self
            .tools
            .run("dumpbin", &args)
            .map_err(|source| InspectionError::Tool {
                binary: binary.to_path_buf(),
                source,
            })?;
        if !output.success {
            return Err(InspectionError::Failed {
                binary: binary.to_path_buf(),
                tool: "dumpbin",
                stderr: output.stderr.trim().to_string(),
            });
        }

        let dependencies = parse_dumpbin_dependents(&output.stdout)
            .into_iter()
            .filter(|name| classify_dll(name, lib_dir) == Ownership::Owned)
            .collect();

        Ok(Inspection {
            dependencies,
            search_paths: Vec::new(),
        })
    }

    fn rewrite_search_path(&self, binary: &Path, _token: &str) -> Result<(), RewriteError> {
        debug!(binary = %binary.display(), "PE binaries carry no search paths");
        Ok(())
    }

    fn relocate_package(&self, layout: &BundleLayout) -> Result<Option<PathBuf>, RewriteError> {
        let init_path = layout.package_dir.join("__init__.py");
        let existing = match fs::read_to_string(&init_path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(RewriteError::InitPatch {
                    path: init_path,
                    source,
                });
            }
        };

        if existing.contains(PATCH_MARKER) {
            info!(path = %init_path.display(), "loader init already registers the DLL directory");
            return Ok(None);
        }

        let patched = insert_loader_patch(&existing, &loader_patch(layout.platform.lib_subdir()));
        fs::write(&init_path, patched).map_err(|source| RewriteError::InitPatch {
            path: init_path.clone(),
            source,
        })?;
        info!(path = %init_path.display(), "patched loader init for DLL loading");
        Ok(Some(init_path))
    }
}

/// Parse `dumpbin /dependents` output into DLL names.
///
/// ```text
///   Image has the following dependencies:
///
///     vtkCommonCore-9.3.dll
///     KERNEL32.dll
///
///   Summary
/// ```
#[must_use]
pub fn parse_dumpbin_dependents(output: &str) -> Vec<String> {
    let mut deps = Vec::new();
    let mut in_section = false;

    for line in output.lines() {
        let stripped = line.trim();
        if stripped.contains(DEPENDENTS_HEADER) {
            in_section = true;
            continue;
        }
        if !in_section {
            continue;
        }
        if stripped.is_empty() {
            if deps.is_empty() {
                continue;
            }
            break;
        }
        if stripped.to_ascii_lowercase().ends_with(".dll") {
            deps.push(stripped.to_string());
        }
    }

    deps
}

/// Python source that registers `<package>/<libs_rel_path>` for DLL lookup.
#[must_use]
pub fn loader_patch(libs_rel_path: &str) -> String {
    format!(
        "import os as _os\n\
         import sys as _sys\n\
         if _sys.platform == 'win32':\n\
         \x20   _libs_dir = _os.path.join(_os.path.dirname(__file__), '{libs_rel_path}')\n\
         \x20   if _os.path.isdir(_libs_dir):\n\
         \x20       {PATCH_MARKER}\n\
         \x20       _os.environ['PATH'] = _libs_dir + _os.pathsep + _os.environ.get('PATH', '')\n"
    )
}

/// Insert `patch` into `source` after its preamble.
///
/// The preamble is the module docstring, `from __future__` imports, comments
/// and blank lines; `from __future__` must stay first or Python rejects the
/// module.
#[must_use]
pub fn insert_loader_patch(source: &str, patch: &str) -> String {
    let lines: Vec<&str> = source.split_inclusive('\n').collect();
    let mut insert_pos = 0;
    let mut in_docstring: Option<&str> = None;

    for (i, line) in lines.iter().enumerate() {
        let stripped = line.trim();
        if let Some(quote) = in_docstring {
            insert_pos = i + 1;
            if stripped.contains(quote) {
                in_docstring = None;
            }
            continue;
        }
        if let Some(quote) = ["\"\"\"", "'''"]
            .into_iter()
            .find(|q| stripped.starts_with(q))
        {
            insert_pos = i + 1;
            if stripped.matches(quote).count() < 2 {
                in_docstring = Some(quote);
            }
            continue;
        }
        if stripped.starts_with("from __future__")
            || stripped.starts_with('#')
            || stripped.is_empty()
        {
            insert_pos = i + 1;
        } else {
            break;
        }
    }

    let mut patched = String::with_capacity(source.len() + patch.len() + 1);
    for line in &lines[..insert_pos] {
        patched.push_str(line);
    }
    if !patched.is_empty() && !patched.ends_with('\n') {
        patched.push('\n');
    }
    patched.push_str(patch);
    for line in &lines[insert_pos..] {
        patched.push_str(line);
    }
    patched
}
