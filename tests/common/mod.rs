#![allow(dead_code)]

use std::{
    fs, io,
    path::{Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use encmount::encfs::{
    mounts::{parse_mount_table, MountEntry, MountProbe},
    ToolBinaries,
};

/// Marker file the fake encfs drops into a mount point.
pub const MOUNTED_MARKER: &str = ".mounted";

/// Writes an executable script.
#[cfg(unix)]
pub fn write_script(path: &Path, body: &str) {
    fs::write(path, body).unwrap();
    let mut permissions = fs::metadata(path).unwrap().permissions();
    permissions.set_mode(0o755);
    fs::set_permissions(path, permissions).unwrap();
}

/// Fake encfs toolchain backed by marker files and a text mount table.
pub struct FakeTools {
    pub bin_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub table: PathBuf,
}

const FAKE_ENCFS: &str = r#"#!/usr/bin/env bash
set -euo pipefail
printf '%s\n' "$@" > "__LOGS__/encfs.args"
store="${@: -2:1}"
mount="${@: -1}"
IFS= read -r password || true
if [[ -f "$store/.encfs6.xml" ]]; then
  if [[ "$(cat "$store/.encfs6.xml")" != "$password" ]]; then
    echo "Error decoding volume key, password incorrect" >&2
    exit 1
  fi
else
  printf '%s' "$password" > "$store/.encfs6.xml"
fi
touch "$mount/.mounted"
escaped="${mount// /\\040}"
echo "encfs $escaped __FSTYPE__ rw,nosuid,nodev 0 0" >> "__TABLE__"
"#;

const FAKE_ENCFSCTL: &str = r#"#!/usr/bin/env bash
set -euo pipefail
printf '%s\n' "$@" >> "__LOGS__/encfsctl.args"
case "$1" in
  autocheckpasswd)
    IFS= read -r password || true
    if [[ ! -f "$2/.encfs6.xml" ]]; then
      echo "Unable to load or parse config file"
      exit 1
    fi
    if [[ "$(cat "$2/.encfs6.xml")" == "$password" ]]; then
      echo "Password is correct"
      exit 0
    fi
    echo "Invalid password"
    exit 1
    ;;
  autopasswd)
    IFS= read -r current || true
    IFS= read -r replacement || true
    if [[ "$(cat "$2/.encfs6.xml")" != "$current" ]]; then
      echo "Invalid password"
      exit 1
    fi
    printf '%s' "$replacement" > "$2/.encfs6.xml"
    echo "Volume Key successfully updated."
    ;;
  *)
    if [[ -f "$1/.encfs6.xml" ]]; then
      echo "Version 6 configuration; created by EncFS 1.9.5 (revision 20100713)"
      echo "Key Size: 192 bits"
      exit 0
    fi
    echo "Unable to load or parse config file"
    exit 1
    ;;
esac
"#;

const FAKE_FUSERMOUNT: &str = r#"#!/usr/bin/env bash
set -euo pipefail
printf '%s\n' "$@" >> "__LOGS__/fusermount.args"
if [[ "$1" == "-u" ]]; then
  rm -f "$2/.mounted"
  escaped="${2// /\\040}"
  grep -v -F " $escaped " "__TABLE__" > "__TABLE__.next" || true
  mv "__TABLE__.next" "__TABLE__"
fi
"#;

impl FakeTools {
    /// Installs fake tools that report mounts as `fuse.encfs`.
    #[cfg(unix)]
    pub fn install(root: &Path) -> Self {
        Self::install_with_fstype(root, "fuse.encfs")
    }

    /// Installs fake tools whose mounts carry `fstype`.
    #[cfg(unix)]
    pub fn install_with_fstype(root: &Path, fstype: &str) -> Self {
        let bin_dir = root.join("bin");
        let logs_dir = root.join("logs");
        fs::create_dir_all(&bin_dir).unwrap();
        fs::create_dir_all(&logs_dir).unwrap();
        let table = logs_dir.join("mounts");
        fs::write(&table, "proc /proc proc rw,nosuid,nodev,noexec 0 0\n").unwrap();

        let render = |template: &str| {
            template
                .replace("__LOGS__", &logs_dir.to_string_lossy())
                .replace("__TABLE__", &table.to_string_lossy())
                .replace("__FSTYPE__", fstype)
        };
        write_script(&bin_dir.join("encfs"), &render(FAKE_ENCFS));
        write_script(&bin_dir.join("encfsctl"), &render(FAKE_ENCFSCTL));
        write_script(&bin_dir.join("fusermount"), &render(FAKE_FUSERMOUNT));

        Self {
            bin_dir,
            logs_dir,
            table,
        }
    }

    pub fn binaries(&self) -> ToolBinaries {
        ToolBinaries {
            encfs: self.bin_dir.join("encfs").to_string_lossy().into_owned(),
            encfsctl: self.bin_dir.join("encfsctl").to_string_lossy().into_owned(),
            fusermount: self
                .bin_dir
                .join("fusermount")
                .to_string_lossy()
                .into_owned(),
        }
    }

    pub fn probe(&self) -> FakeProbe {
        FakeProbe {
            table: self.table.clone(),
        }
    }

    /// Argument lines recorded for `tool`, or `None` if it never ran.
    pub fn args_log(&self, tool: &str) -> Option<String> {
        fs::read_to_string(self.logs_dir.join(format!("{tool}.args"))).ok()
    }
}

/// Mount probe reading the fake marker files and mount table.
pub struct FakeProbe {
    table: PathBuf,
}

impl MountProbe for FakeProbe {
    fn is_mount_point(&self, path: &Path) -> io::Result<bool> {
        Ok(path.join(MOUNTED_MARKER).is_file())
    }

    fn mount_table(&self) -> io::Result<Vec<MountEntry>> {
        Ok(parse_mount_table(&fs::read_to_string(&self.table)?))
    }
}

/// Canonical scratch root so paths match what the inspector resolves.
pub fn scratch_root(temp_dir: &tempfile::TempDir) -> PathBuf {
    fs::canonicalize(temp_dir.path()).unwrap()
}
