//! Native library closure and relocation for self-contained Python wheels.
//!
//! Given the compiled extension modules of an installation tree, this crate
//! finds every project-built shared library they need (transitively), copies
//! those into one library directory inside the package, and rewrites search
//! paths so the bundle loads from wherever it is unpacked.
//!
//! Binary metadata is read with `otool` (Mach-O), `readelf` (ELF) or
//! `dumpbin` (PE) through the [`ToolRunner`] capability, never by executing
//! the binaries, so cross-built trees work too.

mod classify;
mod config;
mod copy;
mod error;
pub mod format;
mod layout;
mod package;
mod paths;
pub mod pipeline;
mod platform;
mod relocate;
mod resolve;
mod stage;
mod tools;
mod verify;
pub mod wheel;

pub use classify::{classify, classify_dll, is_system_dll, Ownership, SYSTEM_DLL_PREFIXES};
pub use config::BundleConfig;
pub use copy::{copy_dir_filtered, create_alias, make_writable, replace_file, same_content};
pub use error::{InspectionError, LayoutError, RewriteError, StagingError, ToolError};
pub use format::{BinaryFormat, Inspection};
pub use layout::{relative_path, BinaryRef, BundleLayout, Role};
pub use package::{stage_companion_package, stage_primary_package};
pub use paths::{find_lib_dir, find_library, find_package_dir, find_site_packages};
pub use platform::Platform;
pub use relocate::{relocate_bundle, RelocationReport};
pub use resolve::{resolve_closure, ClosureSet, Resolution, ResolvedLibrary, UnresolvedDependency};
pub use stage::{stage_libraries, StageReport};
pub use tools::{SystemTools, ToolOutput, ToolRunner};
pub use verify::{verify_bundle, VerificationReport, Violation};
