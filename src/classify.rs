//! Foreign/owned classification of dependency names.
//!
//! A dependency is owned when the project's library directory provides it.
//! Anything else (libc, system frameworks, the C++ runtime) is foreign and is
//! neither copied nor rewritten. PE imports additionally have to clear a list
//! of DLL name prefixes that Windows always supplies.

use std::path::Path;

use crate::paths::find_library;

/// DLL name prefixes that are never bundled, matched case-insensitively.
pub const SYSTEM_DLL_PREFIXES: &[&str] = &[
    "api-ms-",
    "ext-ms-",
    "kernel32",
    "kernelbase",
    "ntdll",
    "user32",
    "gdi32",
    "advapi32",
    "shell32",
    "ole32",
    "oleaut32",
    "msvcrt",
    "ucrtbase",
    "vcruntime",
    "msvcp",
    "combase",
    "sechost",
    "rpcrt4",
    "bcrypt",
    "cfgmgr32",
    "crypt32",
    "ws2_32",
    "winspool",
    "comdlg32",
    "shlwapi",
    "setupapi",
    "imm32",
    "version",
    "winmm",
    "iphlpapi",
    "userenv",
    "dbghelp",
    "mswsock",
    "opengl32",
    "python3",
];

/// Who provides a dependency at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Built by the project; must be bundled.
    Owned,
    /// Provided by the target system; never bundled.
    Foreign,
}

/// Is `name` a DLL that Windows supplies itself?
#[must_use]
pub fn is_system_dll(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SYSTEM_DLL_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Classify a Mach-O or ELF dependency by presence in `lib_dir`.
#[must_use]
pub fn classify(name: &str, lib_dir: &Path) -> Ownership {
    if find_library(lib_dir, name).is_some() {
        Ownership::Owned
    } else {
        Ownership::Foreign
    }
}

/// Classify a PE import: present in `lib_dir` and not a system DLL.
#[must_use]
pub fn classify_dll(name: &str, lib_dir: &Path) -> Ownership {
    if is_system_dll(name) {
        return Ownership::Foreign;
    }
    classify(name, lib_dir)
}
