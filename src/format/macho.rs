//! Mach-O inspection with otool, rewriting with install_name_tool.
//!
//! Any change to a Mach-O file invalidates its code signature and the loader
//! refuses unsigned code on Apple silicon, so every rewrite ends with an ad hoc
//! `codesign`.

use std::ffi::OsString;
use std::path::Path;

use tracing::{debug, warn};

use super::{ensure_exists, BinaryFormat, Inspection};
use crate::error::{InspectionError, RewriteError};
use crate::platform::Platform;
use crate::tools::{command_line, ToolRunner};

/// Marker for load commands resolved through `LC_RPATH`.
const RPATH_MARKER: &str = "@rpath/";

/// Mach-O adapter.
pub struct MachOFormat<'a> {
    tools: &'a dyn ToolRunner,
}

impl<'a> MachOFormat<'a> {
    pub fn new(tools: &'a dyn ToolRunner) -> Self {
        Self { tools }
    }

    fn otool(&self, flag: &str, binary: &Path) -> Result<String, InspectionError> {
        let args: Vec<OsString> = vec![flag.into(), binary.into()];
        let output = self
            .tools
            .run("otool", &args)
            .map_err(|source| InspectionError::Tool {
                binary: binary.to_path_buf(),
                source,
            })?;
        if !output.success {
            return Err(InspectionError::Failed {
                binary: binary.to_path_buf(),
                tool: "otool",
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }

    fn rpaths(&self, binary: &Path) -> Result<Vec<String>, InspectionError> {
        ensure_exists(binary)?;
        self.otool("-l", binary).map(|out| parse_otool_rpaths(&out))
    }

    fn run_rewrite(
        &self,
        program: &str,
        args: Vec<OsString>,
        binary: &Path,
    ) -> Result<(), RewriteError> {
        let output = self
            .tools
            .run(program, &args)
            .map_err(|source| RewriteError::Tool {
                binary: binary.to_path_buf(),
                source,
            })?;
        if !output.success {
            return Err(RewriteError::Failed {
                binary: binary.to_path_buf(),
                command: command_line(program, &args),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

impl BinaryFormat for MachOFormat<'_> {
    fn platform(&self) -> Platform {
        Platform::MacOs
    }

    /// Every `@rpath/` load command is a bundle candidate. Absolute paths and
    /// system frameworks are left out; whether the library really exists in
    /// `lib_dir` is decided by the resolver.
    fn inspect(&self, binary: &Path, _lib_dir: &Path) -> Result<Inspection, InspectionError> {
        ensure_exists(binary)?;
        let dependencies = parse_otool_dependencies(&self.otool("-L", binary)?);
        let search_paths = parse_otool_rpaths(&self.otool("-l", binary)?);
        Ok(Inspection {
            dependencies,
            search_paths,
        })
    }

    fn rewrite_search_path(&self, binary: &Path, token: &str) -> Result<(), RewriteError> {
        let existing = self
            .rpaths(binary)
            .map_err(|source| RewriteError::Inspection {
                binary: binary.to_path_buf(),
                source,
            })?;

        // Every edit is attempted and the binary is always re-signed, even
        // after a failed edit; the first failure is reported.
        let mut first_failure = None;
        let mut needs_add = true;
        for old in &existing {
            if old == token {
                needs_add = false;
                continue;
            }
            debug!(binary = %binary.display(), rpath = %old, "deleting rpath");
            let deleted = self.run_rewrite(
                "install_name_tool",
                vec!["-delete_rpath".into(), old.into(), binary.into()],
                binary,
            );
            if let Err(err) = deleted {
                first_failure.get_or_insert(err);
            }
        }
        if needs_add {
            let added = self.run_rewrite(
                "install_name_tool",
                vec!["-add_rpath".into(), token.into(), binary.into()],
                binary,
            );
            if let Err(err) = added {
                first_failure.get_or_insert(err);
            }
        }

        let signed = self.run_rewrite(
            "codesign",
            vec!["--force".into(), "--sign".into(), "-".into(), binary.into()],
            binary,
        );
        match (first_failure, signed) {
            (Some(err), Err(sign_err)) => {
                warn!("{sign_err}");
                Err(err)
            }
            (Some(err), Ok(())) => Err(err),
            (None, signed) => signed,
        }
    }
}

/// Parse `otool -L` output into `@rpath/` dependency names.
///
/// The first line names the binary itself and is skipped:
/// ```text
/// /tmp/vtkCommonCore.so:
///     @rpath/libvtkCommonCore-9.3.1.dylib (compatibility version 1.0.0, current version 9.3.1)
///     /usr/lib/libc++.1.dylib (compatibility version 1.0.0, current version 1700.255.0)
/// ```
#[must_use]
pub fn parse_otool_dependencies(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let install_name = line.split_whitespace().next()?;
            install_name.strip_prefix(RPATH_MARKER)
        })
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `otool -l` output into `LC_RPATH` values.
///
/// ```text
/// Load command 18
///           cmd LC_RPATH
///       cmdsize 48
///          path /opt/build/Install/lib (offset 12)
/// ```
#[must_use]
pub fn parse_otool_rpaths(output: &str) -> Vec<String> {
    let lines: Vec<&str> = output.lines().collect();
    let mut rpaths = Vec::new();

    for (i, line) in lines.iter().enumerate() {
        if !line.contains("cmd LC_RPATH") {
            continue;
        }
        let path = lines
            .iter()
            .skip(i + 1)
            .take(3)
            .find_map(|l| l.split_once("path ").map(|(_, rest)| rest));
        if let Some(rest) = path {
            let value = rest.split(" (").next().unwrap_or(rest).trim();
            rpaths.push(value.to_string());
        }
    }

    rpaths
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_otool_dependencies_keeps_rpath_entries_only() {
        let output = "\
/tmp/vtkCommonCore.so:
\t@rpath/libvtkCommonCore-9.3.1.dylib (compatibility version 1.0.0, current version 9.3.1)
\t/usr/lib/libc++.1.dylib (compatibility version 1.0.0, current version 1700.255.0)
\t/System/Library/Frameworks/Cocoa.framework/Versions/A/Cocoa (compatibility version 1.0.0)
\t@rpath/libvtksys-9.3.1.dylib (compatibility version 1.0.0, current version 9.3.1)
";
        assert_eq!(
            parse_otool_dependencies(output),
            vec!["libvtkCommonCore-9.3.1.dylib", "libvtksys-9.3.1.dylib"]
        );
    }

    #[test]
    fn test_parse_otool_dependencies_skips_header_line() {
        // A dylib whose own path starts with the marker must not count itself
        let output = "@rpath/libX.dylib:\n";
        assert!(parse_otool_dependencies(output).is_empty());
    }

    #[test]
    fn test_parse_otool_rpaths() {
        let output = "\
Load command 17
          cmd LC_LOAD_DYLIB
      cmdsize 56
         name /usr/lib/libSystem.B.dylib (offset 24)
Load command 18
          cmd LC_RPATH
      cmdsize 48
         path /opt/build/Install/lib (offset 12)
Load command 19
          cmd LC_RPATH
      cmdsize 32
         path @loader_path/.dylibs (offset 12)
";
        assert_eq!(
            parse_otool_rpaths(output),
            vec!["/opt/build/Install/lib", "@loader_path/.dylibs"]
        );
    }
}
