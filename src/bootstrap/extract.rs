use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};

use flate2::read::GzDecoder;

use crate::error::{Result, WebautoError};

/// Extract an archive into `dest_dir`, dispatching on the suffix.
pub fn extract_archive(archive: &Path, dest_dir: &Path, ext: &str) -> Result<()> {
    match ext {
        ".tar.gz" => extract_tar_gz(archive, dest_dir),
        ".zip" => extract_zip(archive, dest_dir),
        ".tar.xz" => extract_tar_xz(archive, dest_dir),
        other => Err(WebautoError::ExtractFailed(format!(
            "unsupported archive format: {other}"
        ))),
    }
}

/// Join an archive entry path onto `dest_dir`, rejecting anything that
/// would escape it (absolute paths, `..` components, drive prefixes).
fn safe_join(dest_dir: &Path, entry: &Path) -> Result<PathBuf> {
    let mut target = dest_dir.to_path_buf();
    for component in entry.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(WebautoError::InvalidArchivePath(
                    entry.display().to_string(),
                ))
            }
        }
    }
    Ok(target)
}

fn extract_tar_gz(archive: &Path, dest_dir: &Path) -> Result<()> {
    eprintln!("   ▸ Extracting runtime archive...");

    let file = File::open(archive)?;
    let decoder = GzDecoder::new(file);
    let mut tar = tar::Archive::new(decoder);
    unpack_tar(&mut tar, dest_dir)?;

    eprintln!("     ✓ Complete");
    Ok(())
}

/// `.tar.xz` support pipes a system `xz -d -c` child into the tar reader;
/// no xz decoder is bundled.
fn extract_tar_xz(archive: &Path, dest_dir: &Path) -> Result<()> {
    eprintln!("   ▸ Extracting runtime archive...");

    let mut child = Command::new("xz")
        .args(["-d", "-c"])
        .arg(archive)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                WebautoError::ExtractFailed(
                    "xz command not found (required for .tar.xz extraction). \
                     Install it with: apt-get install xz-utils (Debian/Ubuntu) \
                     or yum install xz (RHEL/CentOS)"
                        .to_string(),
                )
            } else {
                e.into()
            }
        })?;

    let stdout = child.stdout.take().ok_or_else(|| {
        WebautoError::ExtractFailed("failed to capture xz output".to_string())
    })?;

    let mut tar = tar::Archive::new(stdout);
    let unpack_result = unpack_tar(&mut tar, dest_dir);

    // Close the pipe before waiting so xz cannot block on a full buffer
    // after an aborted unpack.
    drop(tar);
    let status = child.wait()?;
    unpack_result?;
    if !status.success() {
        return Err(WebautoError::ExtractFailed(format!(
            "xz decompression failed with {status}"
        )));
    }

    eprintln!("     ✓ Complete");
    Ok(())
}

fn unpack_tar<R: Read>(archive: &mut tar::Archive<R>, dest_dir: &Path) -> Result<()> {
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        let target = safe_join(dest_dir, &entry_path)?;
        let entry_type = entry.header().entry_type();

        match entry_type {
            tar::EntryType::Directory => {
                fs::create_dir_all(&target)?;
                set_mode(&target, entry.header().mode().ok());
            }
            tar::EntryType::Regular => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                let mut out = File::create(&target)?;
                io::copy(&mut entry, &mut out)?;
                set_mode(&target, entry.header().mode().ok());
            }
            tar::EntryType::Symlink => {
                if let Some(link) = entry.link_name()? {
                    if let Err(e) = make_symlink(&link, &target) {
                        if e.kind() != io::ErrorKind::AlreadyExists {
                            tracing::warn!(
                                "failed to create symlink {}: {e}",
                                target.display()
                            );
                        }
                    }
                }
            }
            other => {
                tracing::warn!(
                    "skipping unsupported archive entry type {:?} in {}",
                    other,
                    entry_path.display()
                );
            }
        }
    }
    Ok(())
}

fn extract_zip(archive: &Path, dest_dir: &Path) -> Result<()> {
    eprintln!("   ▸ Extracting runtime archive...");

    let file = File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| WebautoError::ExtractFailed(format!("failed to open zip: {e}")))?;

    fs::create_dir_all(dest_dir)?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| WebautoError::ExtractFailed(format!("failed to read zip entry {i}: {e}")))?;

        // enclosed_name() returns None for traversal attempts
        let entry_path = match entry.enclosed_name() {
            Some(p) => p.to_path_buf(),
            None => {
                return Err(WebautoError::InvalidArchivePath(entry.name().to_string()));
            }
        };
        let target = safe_join(dest_dir, &entry_path)?;

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut out = File::create(&target)?;
            io::copy(&mut entry, &mut out)?;
            set_mode(&target, entry.unix_mode());
        }
    }

    eprintln!("     ✓ Complete");
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: Option<u32>) {
    use std::os::unix::fs::PermissionsExt;
    if let Some(mode) = mode {
        if mode != 0 {
            let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
        }
    }
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: Option<u32>) {}

#[cfg(unix)]
fn make_symlink(link: &Path, target: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link, target)
}

#[cfg(not(unix))]
fn make_symlink(_link: &Path, target: &Path) -> io::Result<()> {
    // Symlinks need elevated rights on Windows; warn-and-continue semantics
    // are handled by the caller.
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("symlinks not supported, skipping {}", target.display()),
    ))
}
