//! Target platform and the per-platform bundle conventions.

use std::fmt;
use std::str::FromStr;

/// Target platform of a bundle.
///
/// Each platform maps to one binary format family: Mach-O on macOS, ELF on
/// Linux and PE on Windows. The platform is always passed explicitly so the
/// same process can build (or test) bundles for every family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    MacOs,
    Linux,
    Windows,
}

impl Platform {
    /// Platform of the running host, if it is one we can bundle for.
    #[must_use]
    pub fn host() -> Option<Self> {
        match std::env::consts::OS {
            "macos" => Some(Self::MacOs),
            "linux" => Some(Self::Linux),
            "windows" => Some(Self::Windows),
            _ => None,
        }
    }

    /// File extension of compiled Python extension modules.
    #[must_use]
    pub fn module_ext(self) -> &'static str {
        match self {
            Self::MacOs | Self::Linux => ".so",
            Self::Windows => ".pyd",
        }
    }

    /// File extension of native shared libraries.
    #[must_use]
    pub fn lib_ext(self) -> &'static str {
        match self {
            Self::MacOs => ".dylib",
            Self::Linux => ".so",
            Self::Windows => ".dll",
        }
    }

    /// Name of the library subdirectory inside the primary package.
    #[must_use]
    pub fn lib_subdir(self) -> &'static str {
        match self {
            Self::MacOs => ".dylibs",
            Self::Linux | Self::Windows => ".libs",
        }
    }

    /// Loader token meaning "the directory of the binary being loaded".
    ///
    /// `None` on Windows, where DLL lookup is not driven by binary metadata.
    #[must_use]
    pub fn origin_token(self) -> Option<&'static str> {
        match self {
            Self::MacOs => Some("@loader_path"),
            Self::Linux => Some("$ORIGIN"),
            Self::Windows => None,
        }
    }

    /// Does this platform enforce library search paths stored in binaries?
    #[must_use]
    pub fn has_search_paths(self) -> bool {
        self.origin_token().is_some()
    }

    /// Is `file_name` a shared library by this platform's naming rules?
    ///
    /// ELF sonames are usually versioned (`libfoo.so.1.2`), so those count too.
    #[must_use]
    pub fn is_shared_library(self, file_name: &str) -> bool {
        match self {
            Self::Linux => file_name.ends_with(".so") || file_name.contains(".so."),
            Self::MacOs => file_name.ends_with(".dylib"),
            Self::Windows => file_name.to_ascii_lowercase().ends_with(".dll"),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MacOs => "macos",
            Self::Linux => "linux",
            Self::Windows => "windows",
        };
        f.write_str(name)
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "macos" | "darwin" | "osx" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            "windows" | "win32" => Ok(Self::Windows),
            other => Err(format!(
                "unknown platform '{other}' (expected macos, linux or windows)"
            )),
        }
    }
}
