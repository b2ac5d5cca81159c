//! File and directory copying utilities.

use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read};
use std::path::Path;

/// Make a file writable by its owner.
///
/// Installed libraries are often read-only; staged copies must be patchable.
pub fn make_writable(path: &Path) -> io::Result<()> {
    let mut perms = fs::metadata(path)?.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        perms.set_mode(perms.mode() | 0o200);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
    }
    fs::set_permissions(path, perms)
}

/// Copy a directory recursively, skipping entries whose name is in `ignore`.
///
/// Symlinks are recreated rather than followed. Existing files are replaced
/// and every copy is left writable. Returns the number of files copied.
pub fn copy_dir_filtered(src: &Path, dst: &Path, ignore: &[&str]) -> Result<usize> {
    let mut copied = 0;

    fs::create_dir_all(dst).with_context(|| format!("Failed to create {}", dst.display()))?;

    for entry in fs::read_dir(src).with_context(|| format!("Failed to read {}", src.display()))? {
        let entry = entry?;
        if ignore.iter().any(|name| entry.file_name() == **name) {
            continue;
        }
        let path = entry.path();
        let dest_path = dst.join(entry.file_name());

        if path.is_symlink() {
            let target = fs::read_link(&path)?;
            if !dest_path.exists() && !dest_path.is_symlink() {
                create_link(&target, &path, &dest_path)?;
            }
        } else if path.is_dir() {
            copied += copy_dir_filtered(&path, &dest_path, ignore)?;
        } else {
            replace_file(&path, &dest_path).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    path.display(),
                    dest_path.display()
                )
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(unix)]
fn create_link(target: &Path, _src: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_link(_target: &Path, src: &Path, link: &Path) -> io::Result<()> {
    fs::copy(src, link).map(|_| ())
}

/// Replace `dest` with a copy of `src`, removing whatever was there first.
pub fn replace_file(src: &Path, dest: &Path) -> io::Result<()> {
    if dest.is_symlink() || dest.exists() {
        fs::remove_file(dest)?;
    }
    fs::copy(src, dest)?;
    make_writable(dest)
}

/// Do two files have identical content?
pub fn same_content(a: &Path, b: &Path) -> io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }

    let mut fa = io::BufReader::new(fs::File::open(a)?);
    let mut fb = io::BufReader::new(fs::File::open(b)?);
    let mut buf_a = [0u8; 8192];
    let mut buf_b = [0u8; 8192];
    loop {
        let n = fa.read(&mut buf_a)?;
        if n == 0 {
            return Ok(true);
        }
        fb.read_exact(&mut buf_b[..n])?;
        if buf_a[..n] != buf_b[..n] {
            return Ok(false);
        }
    }
}

/// Make `link` an alias of the sibling file `target_name`.
///
/// Creates a relative symlink on unix and a plain copy elsewhere. Returns
/// `Ok(false)` if an identical alias already existed.
pub fn create_alias(target_name: &str, link: &Path) -> io::Result<bool> {
    #[cfg(unix)]
    {
        if link.is_symlink() && fs::read_link(link)? == Path::new(target_name) {
            return Ok(false);
        }
        if link.is_symlink() || link.exists() {
            fs::remove_file(link)?;
        }
        std::os::unix::fs::symlink(target_name, link)?;
    }
    #[cfg(not(unix))]
    {
        let dir = link.parent().unwrap_or_else(|| Path::new("."));
        replace_file(&dir.join(target_name), link)?;
    }
    Ok(true)
}
