use std::{fs, io, path::Path};

use tracing::debug;

use crate::error::PrepareError;

use super::mounts::MountProbe;

/// How a usable directory came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prepared {
    /// Directory and any missing parents were created.
    Created,
    /// Directory already existed, empty and unmounted.
    ReusedEmpty,
}

/// Ensures `path` is a usable store directory or mount anchor.
///
/// Missing paths are created with all parents. Existing paths must be empty,
/// unmounted directories. Nothing is ever removed or emptied.
pub fn prepare_path<P>(path: &Path, probe: &P) -> Result<Prepared, PrepareError>
where
    P: MountProbe + ?Sized,
{
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            // Dangling symlink: the name exists but points nowhere.
            if fs::symlink_metadata(path).is_ok() {
                return Err(PrepareError::NotADirectory(path.to_path_buf()));
            }
            fs::create_dir_all(path).map_err(|source| PrepareError::CreateFailed {
                path: path.to_path_buf(),
                source,
            })?;
            debug!(path = %path.display(), "created directory");
            return Ok(Prepared::Created);
        }
        Err(source) => {
            return Err(PrepareError::Inaccessible {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if !metadata.is_dir() {
        return Err(PrepareError::NotADirectory(path.to_path_buf()));
    }

    let mut entries = fs::read_dir(path).map_err(|source| PrepareError::Inaccessible {
        path: path.to_path_buf(),
        source,
    })?;
    match entries.next() {
        None => {}
        Some(Ok(_)) => return Err(PrepareError::NotEmpty(path.to_path_buf())),
        Some(Err(source)) => {
            return Err(PrepareError::Inaccessible {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    match probe.is_mount_point(path) {
        Ok(true) => Err(PrepareError::AlreadyMounted(path.to_path_buf())),
        Ok(false) => {
            debug!(path = %path.display(), "using existing empty directory");
            Ok(Prepared::ReusedEmpty)
        }
        Err(source) => Err(PrepareError::Inaccessible {
            path: path.to_path_buf(),
            source,
        }),
    }
}
