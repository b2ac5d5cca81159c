//! Binary format adapters.
//!
//! One [`BinaryFormat`] per format family, each pairing an inspector (what a
//! binary depends on, where it searches) with a rewriter (point those search
//! paths into the bundle). The adapter is chosen once from the target
//! [`Platform`]; the resolver, stager and verifier only see the trait.

mod elf;
mod macho;
mod pe;

pub use elf::{parse_readelf_output, ElfFormat, ReadelfDynamic};
pub use macho::{parse_otool_dependencies, parse_otool_rpaths, MachOFormat};
pub use pe::{insert_loader_patch, loader_patch, parse_dumpbin_dependents, PeFormat};

use std::path::{Path, PathBuf};

use crate::error::{InspectionError, RewriteError};
use crate::layout::BundleLayout;
use crate::platform::Platform;
use crate::tools::ToolRunner;

/// What a binary references, as read from its metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inspection {
    /// Owned-candidate dependency names (format-specific filtering applied).
    pub dependencies: Vec<String>,
    /// Embedded library search-path records, in file order.
    pub search_paths: Vec<String>,
}

/// Inspector and rewriter for one binary format family.
pub trait BinaryFormat {
    fn platform(&self) -> Platform;

    /// Read dependency names and search-path records without modifying the
    /// binary. `lib_dir` is the directory owned libraries live in.
    fn inspect(&self, binary: &Path, lib_dir: &Path) -> Result<Inspection, InspectionError>;

    /// Make `token` the binary's only search-path record.
    fn rewrite_search_path(&self, binary: &Path, token: &str) -> Result<(), RewriteError>;

    /// Package-level relocation for formats that cannot carry search paths.
    ///
    /// Returns the patched file, if any.
    fn relocate_package(&self, _layout: &BundleLayout) -> Result<Option<PathBuf>, RewriteError> {
        Ok(None)
    }
}

/// Select the adapter for `platform`.
pub fn for_platform<'a>(
    platform: Platform,
    tools: &'a dyn ToolRunner,
) -> Box<dyn BinaryFormat + 'a> {
    match platform {
        Platform::MacOs => Box::new(MachOFormat::new(tools)),
        Platform::Linux => Box::new(ElfFormat::new(tools)),
        Platform::Windows => Box::new(PeFormat::new(tools)),
    }
}

fn ensure_exists(binary: &Path) -> Result<(), InspectionError> {
    if binary.exists() {
        Ok(())
    } else {
        Err(InspectionError::MissingFile(binary.to_path_buf()))
    }
}
