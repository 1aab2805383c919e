//! Search-path lookup of executables.

use std::env;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::posix;

/// Resolve a program name to an executable path.
///
/// A name containing a path separator is validated as-is: it must name an
/// existing file the current process may execute, and is returned
/// unchanged.  A bare name is looked up in each directory of `$PATH`, in
/// order, and the first executable match wins; the match is always
/// returned as an absolute path.
///
/// This performs no side effects and spawns nothing; failure is reported
/// as [`Error::ExecutableNotFound`].
pub fn resolve(name: impl AsRef<Path>) -> Result<PathBuf> {
    let name = name.as_ref();
    if name.as_os_str().as_bytes().contains(&b'/') {
        if is_executable(name) {
            return Ok(name.to_path_buf());
        }
        return Err(Error::ExecutableNotFound(name.display().to_string()));
    }
    if let Some(path_var) = env::var_os("PATH")
        && let Some(found) = search(&path_var, name)?
    {
        return Ok(found);
    }
    Err(Error::ExecutableNotFound(name.display().to_string()))
}

/// Walks the directories of `path_var` in order; a match found through a
/// relative directory entry is resolved against the current directory, so
/// the returned path stays valid if the caller later changes directory.
pub(crate) fn search(path_var: &OsStr, name: &Path) -> Result<Option<PathBuf>> {
    for dir in env::split_paths(path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            if candidate.is_absolute() {
                return Ok(Some(candidate));
            }
            return Ok(Some(env::current_dir()?.join(candidate)));
        }
    }
    Ok(None)
}

fn is_executable(path: &Path) -> bool {
    path.is_file() && posix::access_x(path)
}
