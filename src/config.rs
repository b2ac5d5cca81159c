//! Bundle configuration.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_README: &str =
    "# vmtk - the Vascular Modeling Toolkit\n\nSee https://www.vmtk.org for documentation.\n";

/// What goes into the bundle and how the distribution is described.
///
/// Loaded from JSON; every field is optional and falls back to the defaults
/// for the vmtk wheel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Primary package; hosts the library subdirectory.
    pub package: String,
    /// Companion package whose modules share the primary package's libraries.
    pub companion_package: String,
    /// Top-level module shipped next to the companion package.
    pub companion_module: String,
    /// Distribution name written to the manifest.
    pub distribution: String,
    pub description: String,
    pub requires_python: String,
    pub dependencies: Vec<String>,
    /// Console script as `name = module:function`.
    pub console_script: Option<String>,
    pub readme: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            package: "vmtk".to_string(),
            companion_package: "vtkmodules".to_string(),
            companion_module: "vtk.py".to_string(),
            distribution: "amplifierai-vmtk".to_string(),
            description: "vmtk - the Vascular Modeling Toolkit".to_string(),
            requires_python: ">=3.13".to_string(),
            dependencies: vec!["numpy>=1.26".to_string()],
            console_script: None,
            readme: DEFAULT_README.to_string(),
        }
    }
}

impl BundleConfig {
    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read bundle config: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse bundle config JSON: {}", path.display()))
    }

    /// Distribution name as it appears in wheel file names.
    #[must_use]
    pub fn wheel_name(&self) -> String {
        self.distribution.replace(['-', '.'], "_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bundle.json");
        fs::write(&path, r#"{ "package": "mytool", "dependencies": [] }"#).unwrap();

        let config = BundleConfig::load(&path).unwrap();
        assert_eq!(config.package, "mytool");
        assert!(config.dependencies.is_empty());
        assert_eq!(config.companion_package, "vtkmodules");
        assert_eq!(config.console_script, None);
    }

    #[test]
    fn test_invalid_config_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bundle.json");
        fs::write(&path, "not-json").unwrap();

        let message = BundleConfig::load(&path).unwrap_err().to_string();
        assert!(message.contains("Failed to parse bundle config JSON"));
    }

    #[test]
    fn test_wheel_name() {
        assert_eq!(BundleConfig::default().wheel_name(), "amplifierai_vmtk");
    }
}
