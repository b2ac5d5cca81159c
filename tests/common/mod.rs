//! Fake toolchain and installation trees for integration tests.
//!
//! Fake binaries are small files containing `fake:<id>`; their metadata lives
//! in [`FakeTools`] keyed by that id, so copies of a file share metadata just
//! like copies of a real binary share their load commands.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use native_bundle::{Platform, ToolError, ToolOutput, ToolRunner};
use tempfile::TempDir;

const NOT_ELF: &str = "Not an ELF file - it has the wrong magic bytes at the start";

const READELF_HEADER: &str = "\nDynamic section at offset 0x2d0e0 contains 28 entries:\n  \
    Tag        Type                         Name/Value\n";

#[derive(Debug, Clone, Default)]
pub struct FakeBinary {
    /// Raw dependency entries as the platform tool prints them.
    pub deps: Vec<String>,
    pub rpaths: Vec<String>,
}

#[derive(Default)]
pub struct FakeTools {
    binaries: RefCell<HashMap<String, FakeBinary>>,
    calls: RefCell<Vec<String>>,
    signed: RefCell<HashSet<String>>,
    /// File names whose rewrite commands fail.
    broken_rewrites: RefCell<HashSet<String>>,
    /// install_name_tool flags that fail for every file.
    broken_flags: RefCell<HashSet<String>>,
}

impl FakeTools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a fake binary to `path` and register its metadata.
    pub fn add_binary(&self, path: &Path, deps: &[&str], rpaths: &[&str]) {
        let id = path.to_string_lossy().into_owned();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, format!("fake:{id}")).unwrap();
        self.binaries.borrow_mut().insert(
            id,
            FakeBinary {
                deps: deps.iter().map(|d| d.to_string()).collect(),
                rpaths: rpaths.iter().map(|r| r.to_string()).collect(),
            },
        );
    }

    pub fn break_rewrites_of(&self, file_name: &str) {
        self.broken_rewrites
            .borrow_mut()
            .insert(file_name.to_string());
    }

    pub fn break_flag(&self, flag: &str) {
        self.broken_flags.borrow_mut().insert(flag.to_string());
    }

    /// Current metadata of the binary stored at `path`.
    pub fn metadata(&self, path: &Path) -> FakeBinary {
        let id = read_id(path).expect("not a fake binary");
        self.binaries.borrow()[&id].clone()
    }

    pub fn is_signed(&self, path: &Path) -> bool {
        read_id(path).is_some_and(|id| self.signed.borrow().contains(&id))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, program: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(program))
            .count()
    }

    fn with_binary(
        &self,
        path: &Path,
        f: impl FnOnce(&mut FakeBinary) -> ToolOutput,
    ) -> ToolOutput {
        let Some(id) = read_id(path) else {
            return ToolOutput::failed(NOT_ELF);
        };
        let mut binaries = self.binaries.borrow_mut();
        match binaries.get_mut(&id) {
            Some(binary) => f(binary),
            None => ToolOutput::failed(format!("unknown fake binary {id}")),
        }
    }

    fn rewrite_blocked(&self, path: &Path) -> bool {
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        self.broken_rewrites.borrow().contains(&name)
    }
}

fn read_id(path: &Path) -> Option<String> {
    fs::read_to_string(path)
        .ok()?
        .strip_prefix("fake:")
        .map(str::to_string)
}

impl ToolRunner for FakeTools {
    fn run(&self, program: &str, args: &[OsString]) -> Result<ToolOutput, ToolError> {
        let args: Vec<String> = args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        self.calls
            .borrow_mut()
            .push(format!("{program} {}", args.join(" ")));
        let last = PathBuf::from(args.last().cloned().unwrap_or_default());

        let output = match (program, args.first().map(String::as_str)) {
            ("otool", Some("-L")) => self.with_binary(&last, |b| {
                let mut out = format!("{}:\n", last.display());
                for dep in &b.deps {
                    out.push_str(&format!(
                        "\t{dep} (compatibility version 1.0.0, current version 1.0.0)\n"
                    ));
                }
                ToolOutput::ok(out)
            }),
            ("otool", Some("-l")) => self.with_binary(&last, |b| {
                let mut out = String::new();
                for (i, rpath) in b.rpaths.iter().enumerate() {
                    out.push_str(&format!("Load command {}\n", i + 10));
                    out.push_str("          cmd LC_RPATH\n      cmdsize 32\n");
                    out.push_str(&format!("         path {rpath} (offset 12)\n"));
                }
                ToolOutput::ok(out)
            }),
            ("install_name_tool", Some(flag)) => {
                if self.rewrite_blocked(&last) || self.broken_flags.borrow().contains(flag) {
                    return Ok(ToolOutput::failed("install_name_tool: fatal error"));
                }
                let value = args[1].clone();
                let flag = flag.to_string();
                self.with_binary(&last, |b| match flag.as_str() {
                    "-delete_rpath" => match b.rpaths.iter().position(|r| *r == value) {
                        Some(i) => {
                            b.rpaths.remove(i);
                            ToolOutput::ok("")
                        }
                        None => ToolOutput::failed(format!("no LC_RPATH with path: {value}")),
                    },
                    "-add_rpath" if b.rpaths.contains(&value) => {
                        ToolOutput::failed(format!("would duplicate LC_RPATH {value}"))
                    }
                    "-add_rpath" => {
                        b.rpaths.push(value.clone());
                        ToolOutput::ok("")
                    }
                    other => ToolOutput::failed(format!("unknown flag {other}")),
                })
            }
            ("codesign", _) => match read_id(&last) {
                Some(id) => {
                    self.signed.borrow_mut().insert(id);
                    ToolOutput::ok("")
                }
                None => ToolOutput::failed("codesign: not a Mach-O file"),
            },
            ("readelf", Some("-d")) => self.with_binary(&last, |b| {
                let mut out = String::from(READELF_HEADER);
                for dep in &b.deps {
                    out.push_str(&format!(
                        " 0x0000000000000001 (NEEDED)             Shared library: [{dep}]\n"
                    ));
                }
                if !b.rpaths.is_empty() {
                    out.push_str(&format!(
                        " 0x000000000000001d (RUNPATH)            Library runpath: [{}]\n",
                        b.rpaths.join(":")
                    ));
                }
                ToolOutput::ok(out)
            }),
            ("patchelf", Some("--set-rpath")) => {
                if self.rewrite_blocked(&last) {
                    return Ok(ToolOutput::failed("patchelf: cannot open file"));
                }
                let token = args[1].clone();
                self.with_binary(&last, |b| {
                    b.rpaths = vec![token];
                    ToolOutput::ok("")
                })
            }
            ("dumpbin", Some("/dependents")) => self.with_binary(&last, |b| {
                let mut out = format!("Dump of file {}\n\nFile Type: DLL\n\n", last.display());
                out.push_str("  Image has the following dependencies:\n\n");
                for dep in &b.deps {
                    out.push_str(&format!("    {dep}\n"));
                }
                out.push_str("\n  Summary\n\n        1000 .data\n");
                ToolOutput::ok(out)
            }),
            ("python3", Some("-c")) => ToolOutput::ok("cp313\nx86_64\n"),
            ("python3", Some("-m")) => fake_python_module(&args),
            _ => {
                return Err(ToolError::NotFound {
                    program: program.to_string(),
                })
            }
        };
        Ok(output)
    }
}

/// `python -m build` and `python -m wheel tags`.
fn fake_python_module(args: &[String]) -> ToolOutput {
    match args.get(1).map(String::as_str) {
        Some("build") => {
            let outdir = PathBuf::from(&args[4]);
            let wheel = outdir.join("amplifierai_vmtk-1.6.0-py3-none-any.whl");
            fs::write(wheel, "wheel").unwrap();
            ToolOutput::ok("Successfully built")
        }
        Some("wheel") => {
            let wheel = PathBuf::from(args.last().unwrap());
            let tag = |prefix: &str| {
                args.iter()
                    .find_map(|a| a.strip_prefix(prefix))
                    .unwrap()
                    .to_string()
            };
            let name = format!(
                "amplifierai_vmtk-1.6.0-{}-{}-{}.whl",
                tag("--python-tag="),
                tag("--abi-tag="),
                tag("--platform-tag=")
            );
            fs::copy(&wheel, wheel.with_file_name(name)).unwrap();
            ToolOutput::ok("")
        }
        _ => ToolOutput::failed("No module named that"),
    }
}

/// A mock `build/Install` tree for one platform.
pub struct InstallTree {
    pub temp: TempDir,
    pub install_dir: PathBuf,
    pub site_packages: PathBuf,
    pub lib_dir: PathBuf,
    pub platform: Platform,
}

impl InstallTree {
    pub fn new(platform: Platform) -> Self {
        let temp = TempDir::new().unwrap();
        let install_dir = temp.path().join("Install");
        let site_packages = install_dir.join("lib/python3.13/site-packages");
        fs::create_dir_all(site_packages.join("vmtk")).unwrap();
        fs::create_dir_all(site_packages.join("vtkmodules")).unwrap();
        let vmtk_init = site_packages.join("vmtk/__init__.py");
        fs::write(vmtk_init, "\"\"\"vmtk.\"\"\"\n").unwrap();
        let vtk_shim = site_packages.join("vtk.py");
        fs::write(vtk_shim, "from vtkmodules.all import *\n").unwrap();

        let lib_dir = match platform {
            Platform::Windows => install_dir.join("bin"),
            _ => install_dir.join("lib"),
        };
        fs::create_dir_all(&lib_dir).unwrap();

        Self {
            temp,
            install_dir,
            site_packages,
            lib_dir,
            platform,
        }
    }

    pub fn lib_dir_str(&self) -> String {
        self.lib_dir.to_string_lossy().into_owned()
    }

    /// Extension module `name` (without extension) in `package`.
    pub fn add_module(
        &self,
        tools: &FakeTools,
        package: &str,
        name: &str,
        deps: &[&str],
        rpaths: &[&str],
    ) -> PathBuf {
        let path = self
            .site_packages
            .join(package)
            .join(format!("{name}{}", self.platform.module_ext()));
        tools.add_binary(&path, deps, rpaths);
        path
    }

    pub fn add_lib(
        &self,
        tools: &FakeTools,
        name: &str,
        deps: &[&str],
        rpaths: &[&str],
    ) -> PathBuf {
        let path = self.lib_dir.join(name);
        tools.add_binary(&path, deps, rpaths);
        path
    }

    /// Scratch directory next to the install tree.
    pub fn scratch(&self, name: &str) -> PathBuf {
        let dir = self.temp.path().join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }
}

/// Sorted file names in `dir`.
pub fn listing(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
