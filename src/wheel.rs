//! Packaging manifest and wheel building.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::config::BundleConfig;
use crate::platform::Platform;
use crate::tools::{command_line, ToolRunner};

/// Render `pyproject.toml` for the staged bundle.
#[must_use]
pub fn render_pyproject(config: &BundleConfig, platform: Platform, version: &str) -> String {
    let mod_ext = platform.module_ext();
    let lib_ext = platform.lib_ext();
    let subdir = platform.lib_subdir();

    let mut package_data = vec![
        format!("\"*{mod_ext}\""),
        format!("\"{subdir}/*{lib_ext}\""),
        "\"share/*.xml\"".to_string(),
    ];
    if platform == Platform::Linux {
        package_data.push(format!("\"{subdir}/*.so.*\""));
    }
    let companion_data = [format!("\"*{mod_ext}\""), format!("\"**/*{mod_ext}\"")];

    let dependencies = config
        .dependencies
        .iter()
        .map(|d| format!("\"{d}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let script = config.console_script.as_deref();
    let scripts = match script.and_then(|s| s.split_once('=')) {
        Some((name, target)) => format!(
            "\n[project.scripts]\n{} = \"{}\"\n",
            name.trim(),
            target.trim()
        ),
        None => String::new(),
    };

    let companion_module = config
        .companion_module
        .strip_suffix(".py")
        .unwrap_or(&config.companion_module);

    format!(
        r#"[build-system]
requires = ["setuptools>=68.0", "wheel"]
build-backend = "setuptools.build_meta"

[project]
name = "{name}"
version = "{version}"
description = "{description}"
requires-python = "{requires_python}"
dependencies = [{dependencies}]
{scripts}
[tool.setuptools.packages.find]
include = ["{package}*", "{companion}*"]

[tool.setuptools.package-data]
{package} = [
    {package_data}
]
{companion} = [
    {companion_data}
]

[tool.setuptools]
py-modules = ["{companion_module}"]
"#,
        name = config.distribution,
        description = config.description,
        requires_python = config.requires_python,
        package = config.package,
        companion = config.companion_package,
        package_data = package_data.join(",\n    "),
        companion_data = companion_data.join(",\n    "),
    )
}

/// Write `pyproject.toml` and `README.md` into the staging directory.
pub fn write_manifest(
    staging_dir: &Path,
    config: &BundleConfig,
    platform: Platform,
    version: &str,
) -> Result<()> {
    let pyproject = staging_dir.join("pyproject.toml");
    fs::write(&pyproject, render_pyproject(config, platform, version))
        .with_context(|| format!("Failed to write {}", pyproject.display()))?;

    let readme = staging_dir.join("README.md");
    fs::write(&readme, &config.readme)
        .with_context(|| format!("Failed to write {}", readme.display()))?;
    Ok(())
}

/// Wheel platform tag for `platform` as reported by `platform.machine()`.
#[must_use]
pub fn platform_tag(platform: Platform, machine: &str) -> String {
    match platform {
        Platform::MacOs => format!("macosx_11_0_{machine}"),
        Platform::Linux => format!("linux_{machine}"),
        Platform::Windows => {
            if machine == "AMD64" || machine == "x86_64" {
                "win_amd64".to_string()
            } else {
                format!("win_{}", machine.to_ascii_lowercase())
            }
        }
    }
}

const TAG_SCRIPT: &str = concat!(
    "import platform, sys; ",
    "print(f'cp{sys.version_info.major}{sys.version_info.minor}'); ",
    "print(platform.machine())",
);

/// Interpreter tag (`cp313`) and machine name of `python`.
pub fn interpreter_info(tools: &dyn ToolRunner, python: &str) -> Result<(String, String)> {
    let args: Vec<OsString> = vec!["-c".into(), TAG_SCRIPT.into()];
    let output = tools.run(python, &args)?;
    if !output.success {
        bail!("{python} failed: {}", output.stderr.trim());
    }
    let mut lines = output.stdout.lines().map(str::trim);
    match (lines.next(), lines.next()) {
        (Some(py), Some(machine)) if py.starts_with("cp") && !machine.is_empty() => {
            Ok((py.to_string(), machine.to_string()))
        }
        _ => bail!(
            "unexpected interpreter info from {python}: {:?}",
            output.stdout
        ),
    }
}

fn run_checked(tools: &dyn ToolRunner, program: &str, args: Vec<OsString>) -> Result<()> {
    let output = tools.run(program, &args)?;
    if !output.success {
        bail!(
            "Command failed: {}\n{}",
            command_line(program, &args),
            output.stderr.trim()
        );
    }
    Ok(())
}

/// Newest wheel in `dir` whose file name starts with `prefix` and ends with `suffix`.
fn newest_wheel(dir: &Path, prefix: &str, suffix: &str) -> Result<Option<PathBuf>> {
    let mut wheels: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to read {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            name.starts_with(prefix) && name.ends_with(suffix)
        })
        .collect();
    wheels.sort();
    Ok(wheels.pop())
}

/// Build the wheel from `staging_dir` into `output_dir` and retag it for
/// `platform` and the interpreter that built it.
pub fn build_wheel(
    tools: &dyn ToolRunner,
    python: &str,
    staging_dir: &Path,
    output_dir: &Path,
    config: &BundleConfig,
    platform: Platform,
) -> Result<PathBuf> {
    info!("Building wheel...");
    run_checked(
        tools,
        python,
        vec![
            "-m".into(),
            "build".into(),
            "--wheel".into(),
            "--outdir".into(),
            output_dir.into(),
            staging_dir.into(),
        ],
    )?;

    let prefix = format!("{}-", config.wheel_name());
    let Some(wheel_path) = newest_wheel(output_dir, &prefix, ".whl")? else {
        bail!("No wheel file produced!");
    };

    let (py_ver, machine) = interpreter_info(tools, python)?;
    let plat_tag = platform_tag(platform, &machine);
    info!("Fixing wheel tags to {py_ver}-{py_ver}-{plat_tag}...");
    run_checked(
        tools,
        python,
        vec![
            "-m".into(),
            "wheel".into(),
            "tags".into(),
            format!("--python-tag={py_ver}").into(),
            format!("--abi-tag={py_ver}").into(),
            format!("--platform-tag={plat_tag}").into(),
            wheel_path.clone().into(),
        ],
    )?;

    let suffix = format!("-{py_ver}-{py_ver}-{plat_tag}.whl");
    match newest_wheel(output_dir, &prefix, &suffix)? {
        Some(tagged) if tagged != wheel_path => {
            fs::remove_file(&wheel_path)
                .with_context(|| format!("Failed to remove untagged {}", wheel_path.display()))?;
            Ok(tagged)
        }
        _ => Ok(wheel_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_tags() {
        assert_eq!(platform_tag(Platform::MacOs, "arm64"), "macosx_11_0_arm64");
        assert_eq!(platform_tag(Platform::Linux, "x86_64"), "linux_x86_64");
        assert_eq!(platform_tag(Platform::Windows, "AMD64"), "win_amd64");
        assert_eq!(platform_tag(Platform::Windows, "ARM64"), "win_arm64");
    }

    #[test]
    fn test_pyproject_linux_includes_versioned_sonames() {
        let text = render_pyproject(&BundleConfig::default(), Platform::Linux, "1.6.0");
        assert!(text.contains("name = \"amplifierai-vmtk\""));
        assert!(text.contains("version = \"1.6.0\""));
        assert!(text.contains("\".libs/*.so.*\""));
        assert!(text.contains("py-modules = [\"vtk\"]"));
        assert!(text.contains("dependencies = [\"numpy>=1.26\"]"));
        assert!(!text.contains("[project.scripts]"));
    }

    #[test]
    fn test_pyproject_macos_uses_dylibs() {
        let mut config = BundleConfig::default();
        config.console_script = Some("vmtk = vmtk.vmtk_main:main".to_string());
        let text = render_pyproject(&config, Platform::MacOs, "2.0.0");
        assert!(text.contains("\".dylibs/*.dylib\""));
        assert!(!text.contains("*.so.*"));
        let scripts = "[project.scripts]\nvmtk = \"vmtk.vmtk_main:main\"";
        assert!(text.contains(scripts));
    }
}
