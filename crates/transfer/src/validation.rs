use std::path::{Component, Path, PathBuf};

use crate::TransferError;

/// Characters a file id may not contain.
const FILE_ID_FORBIDDEN: [char; 3] = ['.', '\\', '/'];

/// Validates that a caller-supplied file id cannot name a path.
pub fn validate_file_id(file_id: &str) -> Result<(), TransferError> {
    if file_id.contains(FILE_ID_FORBIDDEN) {
        return Err(TransferError::Validation(format!(
            "file id cannot contain path name separators: '{file_id}'"
        )));
    }
    Ok(())
}

/// Resolves a relative destination `name` against `storage_dir`.
///
/// Both directories must already be absolute and normalized. The result
/// must lie strictly inside `storage_dir` and must not be `working_dir` or
/// anything beneath it. Resolution is lexical; symlinks are not followed.
pub fn resolve_destination(
    storage_dir: &Path,
    working_dir: &Path,
    name: &str,
) -> Result<PathBuf, TransferError> {
    let resolved = normalize(&storage_dir.join(name));

    if resolved == storage_dir || !resolved.starts_with(storage_dir) {
        return Err(TransferError::Validation(format!(
            "file name cannot be outside of storage directory: '{name}'"
        )));
    }
    if resolved.starts_with(working_dir) {
        return Err(TransferError::Validation(format!(
            "file name cannot be in working directory: '{name}'"
        )));
    }
    Ok(resolved)
}

/// Lexically removes `.` and `..` components.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Prefix(_) | Component::RootDir | Component::Normal(_) => {
                out.push(component.as_os_str());
            }
        }
    }
    out
}
