use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, error, warn};

use crate::{error::InspectionError, types::MountState};

/// Device field encfs writes into the mount table.
pub const ENCFS_DEVICE: &str = "encfs";
/// Filesystem type encfs registers with FUSE.
pub const ENCFS_FSTYPE: &str = "fuse.encfs";
/// Linux mount table location.
pub const DEFAULT_MOUNT_TABLE: &str = "/proc/mounts";

/// One row of the system mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Mount point path.
    pub mount_point: PathBuf,
    /// Device or filesystem name.
    pub device: String,
    /// Filesystem type.
    pub fstype: String,
}

/// Device and filesystem type that mark a mount as ours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSignature {
    device: String,
    fstype: String,
}

impl MountSignature {
    /// Constructs a signature from explicit values.
    pub fn new(device: impl Into<String>, fstype: impl Into<String>) -> Self {
        Self {
            device: device.into(),
            fstype: fstype.into(),
        }
    }

    /// Expected device field.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Expected filesystem type.
    pub fn fstype(&self) -> &str {
        &self.fstype
    }

    /// Both fields must match exactly.
    pub fn matches(&self, entry: &MountEntry) -> bool {
        entry.device == self.device && entry.fstype == self.fstype
    }
}

impl Default for MountSignature {
    fn default() -> Self {
        Self::new(ENCFS_DEVICE, ENCFS_FSTYPE)
    }
}

/// Source of mount-point and mount-table facts.
pub trait MountProbe: Send + Sync {
    /// Returns `true` when `path` is the root of a mounted filesystem.
    fn is_mount_point(&self, path: &Path) -> io::Result<bool>;
    /// Returns the current mount table.
    fn mount_table(&self) -> io::Result<Vec<MountEntry>>;
}

/// Probe backed by `stat` and the kernel mount table.
#[derive(Debug, Clone)]
pub struct SystemMountProbe {
    table_path: PathBuf,
}

impl SystemMountProbe {
    /// Uses `/proc/mounts`.
    pub fn new() -> Self {
        Self::with_table(DEFAULT_MOUNT_TABLE)
    }

    /// Uses a custom mount table file in `/proc/mounts` format.
    pub fn with_table(table_path: impl Into<PathBuf>) -> Self {
        Self {
            table_path: table_path.into(),
        }
    }

    /// Mount table file in use.
    pub fn table_path(&self) -> &Path {
        &self.table_path
    }
}

impl Default for SystemMountProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MountProbe for SystemMountProbe {
    fn is_mount_point(&self, path: &Path) -> io::Result<bool> {
        let metadata = match fs::symlink_metadata(path) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(error) => return Err(error),
        };
        if metadata.file_type().is_symlink() {
            return Ok(false);
        }
        let parent_metadata = fs::symlink_metadata(path.join(".."))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            Ok(metadata.dev() != parent_metadata.dev() || metadata.ino() == parent_metadata.ino())
        }
        #[cfg(not(unix))]
        {
            let _ = parent_metadata;
            Ok(false)
        }
    }

    fn mount_table(&self) -> io::Result<Vec<MountEntry>> {
        let contents = fs::read_to_string(&self.table_path)?;
        Ok(parse_mount_table(&contents))
    }
}

/// Parses `/proc/mounts` text: `{device} {mountpoint} {fstype} {options} {dump} {pass}`.
pub fn parse_mount_table(contents: &str) -> Vec<MountEntry> {
    contents.lines().filter_map(parse_mount_line).collect()
}

fn parse_mount_line(line: &str) -> Option<MountEntry> {
    let mut fields = line.split_whitespace();
    let device = fields.next()?;
    let mount_point = fields.next()?;
    let fstype = fields.next()?;
    Some(MountEntry {
        mount_point: PathBuf::from(unescape_mount_field(mount_point)),
        device: unescape_mount_field(device),
        fstype: fstype.to_owned(),
    })
}

/// Decodes the `\NNN` octal escapes the kernel uses for whitespace and backslashes.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        if bytes[index] == b'\\'
            && index + 4 <= bytes.len()
            && is_octal_escape(&bytes[index + 1..index + 4])
        {
            let value = bytes[index + 1..index + 4]
                .iter()
                .fold(0_u32, |acc, digit| acc * 8 + u32::from(digit - b'0'));
            if let Ok(byte) = u8::try_from(value) {
                decoded.push(byte);
                index += 4;
                continue;
            }
        }
        decoded.push(bytes[index]);
        index += 1;
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|digit| (b'0'..=b'7').contains(digit))
}

/// Resolves a path the way the kernel reports it in the mount table.
pub fn resolve_mount_path(path: &Path) -> PathBuf {
    fs::canonicalize(path)
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Classifies mount points by their mount-table signature.
#[derive(Debug, Clone)]
pub struct MountInspector<P>
where
    P: MountProbe,
{
    probe: P,
    signature: MountSignature,
}

impl<P> MountInspector<P>
where
    P: MountProbe,
{
    /// Constructs an inspector.
    pub fn new(probe: P, signature: MountSignature) -> Self {
        Self { probe, signature }
    }

    /// Underlying probe.
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Ownership signature in use.
    pub fn signature(&self) -> &MountSignature {
        &self.signature
    }

    /// Returns `true` when `path` is currently a mount point.
    pub fn is_mount_point(&self, path: &Path) -> Result<bool, InspectionError> {
        let resolved = resolve_mount_path(path);
        self.probe
            .is_mount_point(&resolved)
            .map_err(|source| InspectionError::Probe {
                path: resolved,
                source,
            })
    }

    /// Computes the mount state of `path`.
    ///
    /// The mount table is read once per call. When the same path is mounted
    /// more than once, the last (topmost) entry decides.
    pub fn inspect(&self, path: &Path) -> Result<MountState, InspectionError> {
        let resolved = resolve_mount_path(path);
        if !self.is_mount_point(&resolved)? {
            return Ok(MountState::Unmounted);
        }

        let entries = self
            .probe
            .mount_table()
            .map_err(InspectionError::MountTable)?;
        let entry = entries
            .iter()
            .rev()
            .find(|entry| entry.mount_point == resolved)
            .ok_or_else(|| InspectionError::EntryMissing(resolved.clone()))?;
        debug!(
            mount_point = %entry.mount_point.display(),
            device = %entry.device,
            fstype = %entry.fstype,
            "identified mount point"
        );
        if self.signature.matches(entry) {
            Ok(MountState::MountedOwned)
        } else {
            Ok(MountState::MountedForeign)
        }
    }

    /// Returns `true` only for a mount carrying the encfs signature.
    pub fn is_owned_mount(&self, path: &Path) -> bool {
        match self.inspect(path) {
            Ok(MountState::MountedOwned) => true,
            Ok(MountState::MountedForeign) => {
                warn!(path = %path.display(), "mount point is not of type encfs");
                false
            }
            Ok(MountState::Unmounted) => {
                warn!(path = %path.display(), "path is not a mount point");
                false
            }
            Err(inspection_error) => {
                error!(path = %path.display(), error = %inspection_error, "failed to identify mount point");
                false
            }
        }
    }
}
