//! Validation of caller-supplied directory and file names.
//!
//! Every path that reaches the filesystem is built from the storage root plus
//! components checked here, so no request can address anything outside the
//! root.

use std::path::{Component, Path, PathBuf};

use super::StorageError;

/// Suffix of the scratch files used for atomic replacement.
pub const TEMP_SUFFIX: &str = ".vault-tmp";

/// Validate a relative directory such as `"cats/2024"`.
///
/// An empty string (or one made only of separators and `.`) means the storage
/// root. Backslashes are treated as separators.
///
/// # Errors
///
/// Returns [`StorageError::InvalidPath`] for `..`, absolute paths and drive
/// or UNC prefixes.
pub fn relative_dir(raw: &str) -> Result<PathBuf, StorageError> {
    let normalised = raw.replace('\\', "/");
    let mut out = PathBuf::new();
    for component in Path::new(&normalised).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::InvalidPath(raw.to_owned()));
            }
        }
    }
    Ok(out)
}

/// Validate a bare file name.
///
/// # Errors
///
/// Returns [`StorageError::InvalidPath`] if the name is empty, is `.` or `..`,
/// contains a separator or NUL, or ends with the scratch-file suffix.
pub fn file_name(raw: &str) -> Result<&str, StorageError> {
    let invalid = raw.is_empty()
        || raw == "."
        || raw == ".."
        || raw.contains(['/', '\\', '\0'])
        || raw.ends_with(TEMP_SUFFIX);
    if invalid {
        return Err(StorageError::InvalidPath(raw.to_owned()));
    }
    Ok(raw)
}

/// Render a root-relative path with `/` separators.
pub fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
