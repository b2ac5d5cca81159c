//! ELF inspection with readelf, rewriting with patchelf.
//!
//! `readelf -d` reads the dynamic section directly instead of asking the host
//! dynamic linker (as `ldd` does), so it also works for cross-built binaries.

use std::ffi::OsString;
use std::path::Path;

use tracing::debug;

use super::{ensure_exists, BinaryFormat, Inspection};
use crate::classify::{classify, Ownership};
use crate::error::{InspectionError, RewriteError};
use crate::platform::Platform;
use crate::tools::{command_line, ToolRunner};

/// Dynamic section entries we care about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadelfDynamic {
    /// `DT_NEEDED` sonames.
    pub needed: Vec<String>,
    /// `DT_RUNPATH` and `DT_RPATH` entries, split on `:`.
    pub search_paths: Vec<String>,
}

/// ELF adapter.
pub struct ElfFormat<'a> {
    tools: &'a dyn ToolRunner,
}

impl<'a> ElfFormat<'a> {
    pub fn new(tools: &'a dyn ToolRunner) -> Self {
        Self { tools }
    }
}

impl BinaryFormat for ElfFormat<'_> {
    fn platform(&self) -> Platform {
        Platform::Linux
    }

    /// Only `NEEDED` names that exist in `lib_dir` are returned; system
    /// libraries resolve elsewhere and are dropped here.
    fn inspect(&self, binary: &Path, lib_dir: &Path) -> Result<Inspection, InspectionError> {
        ensure_exists(binary)?;

        let args: Vec<OsString> = vec!["-d".into(), binary.into()];
        let output = self
            .tools
            .run("readelf", &args)
            .map_err(|source| InspectionError::Tool {
                binary: binary.to_path_buf(),
                source,
            })?;

        // Wrong-format and truncated files are errors, never empty inspections
        if !output.success {
            return Err(InspectionError::Failed {
                binary: binary.to_path_buf(),
                tool: "readelf",
                stderr: output.stderr.trim().to_string(),
            });
        }

        let dynamic = parse_readelf_output(&output.stdout);
        let (dependencies, foreign): (Vec<String>, Vec<String>) = dynamic
            .needed
            .into_iter()
            .partition(|name| classify(name, lib_dir) == Ownership::Owned);
        if !foreign.is_empty() {
            debug!(binary = %binary.display(), ?foreign, "skipping foreign libraries");
        }

        Ok(Inspection {
            dependencies,
            search_paths: dynamic.search_paths,
        })
    }

    fn rewrite_search_path(&self, binary: &Path, token: &str) -> Result<(), RewriteError> {
        let args: Vec<OsString> = vec!["--set-rpath".into(), token.into(), binary.into()];
        let output = self
            .tools
            .run("patchelf", &args)
            .map_err(|source| RewriteError::Tool {
                binary: binary.to_path_buf(),
                source,
            })?;
        if !output.success {
            return Err(RewriteError::Failed {
                binary: binary.to_path_buf(),
                command: command_line("patchelf", &args),
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Parse `readelf -d` output.
///
/// Example readelf output:
/// ```text
/// Dynamic section at offset 0x2d0e0 contains 28 entries:
///   Tag        Type                         Name/Value
///  0x0000000000000001 (NEEDED)             Shared library: [libvtkCommonCore-9.3.so.1]
///  0x0000000000000001 (NEEDED)             Shared library: [libc.so.6]
///  0x000000000000001d (RUNPATH)            Library runpath: [/opt/build/Install/lib]
/// ```
#[must_use]
pub fn parse_readelf_output(output: &str) -> ReadelfDynamic {
    let mut dynamic = ReadelfDynamic::default();

    for line in output.lines() {
        let Some(value) = bracketed(line) else {
            continue;
        };
        if line.contains("(NEEDED)") && line.contains("Shared library:") {
            dynamic.needed.push(value.to_string());
        } else if line.contains("(RUNPATH)") || line.contains("(RPATH)") {
            dynamic.search_paths.extend(
                value
                    .split(':')
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_string),
            );
        }
    }

    dynamic
}

fn bracketed(line: &str) -> Option<&str> {
    let start = line.find('[')?;
    let end = line.rfind(']')?;
    (end > start).then(|| &line[start + 1..end])
}
