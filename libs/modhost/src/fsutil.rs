//! Filesystem helpers for archive extraction and module directory moves.

use std::fs;
use std::path::Path;

use crate::error::ModuleError;

/// Extracts a zip archive into `dest`.
///
/// # Errors
/// `ModuleError::Io` on filesystem failures, `ModuleError::Archive` when the
/// archive is unreadable.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), ModuleError> {
    let file = fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file)?;
    zip.extract(dest)?;
    Ok(())
}

/// Creates `path` as an empty directory, removing any previous content.
///
/// # Errors
/// `ModuleError::Io` on filesystem failures.
pub fn recreate_dir(path: &Path) -> Result<(), ModuleError> {
    if path.exists() {
        fs::remove_dir_all(path)?;
    }
    fs::create_dir_all(path)?;
    Ok(())
}

/// Moves a directory into place, creating the destination's parent first.
///
/// # Errors
/// `ModuleError::Io` on filesystem failures.
pub fn move_dir(from: &Path, to: &Path) -> Result<(), ModuleError> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(from, to)?;
    Ok(())
}

/// Recursively removes a directory; missing directories are fine.
///
/// # Errors
/// `ModuleError::Io` on filesystem failures other than absence.
pub fn remove_dir(path: &Path) -> Result<(), ModuleError> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}
