use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Unix mode for the journal file.
pub const JOURNAL_FILE_MODE: u32 = 0o600;

/// Controller outcomes recorded in the journal. Credentials never appear here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    /// New store was created and mounted.
    StoreCreated {
        /// Store directory.
        store: PathBuf,
        /// Mount point.
        mount: PathBuf,
    },
    /// Existing store was mounted.
    Mounted {
        /// Store directory.
        store: PathBuf,
        /// Mount point.
        mount: PathBuf,
    },
    /// encfs mount was removed.
    Unmounted {
        /// Mount point.
        mount: PathBuf,
    },
    /// Unmount was declined because the path is not an encfs mount.
    UnmountRefused {
        /// Mount point.
        mount: PathBuf,
        /// Error code explaining the refusal.
        code: String,
    },
    /// Store password was rotated and verified.
    PasswordChanged {
        /// Store directory.
        store: PathBuf,
    },
    /// Store password was checked.
    PasswordChecked {
        /// Store directory.
        store: PathBuf,
        /// Whether the password was accepted.
        accepted: bool,
    },
    /// Operation failed for any other reason.
    OperationFailed {
        /// Operation name.
        operation: String,
        /// Stable error code.
        code: String,
    },
}

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JournalEntry {
    /// Time the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Identifier shared by every line written through one journal handle.
    pub session: Uuid,
    /// Recorded event.
    #[serde(flatten)]
    pub event: JournalEvent,
}

/// JSONL append-only operation journal.
pub struct OperationJournal {
    path: PathBuf,
    session: Uuid,
}

impl OperationJournal {
    /// Opens the journal at `path`, creating it private if missing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        drop(open_private_append(&path)?);
        set_private_permissions(&path)?;
        Ok(Self {
            path,
            session: Uuid::new_v4(),
        })
    }

    /// Appends one event as a JSON line.
    pub fn record(&self, event: JournalEvent) -> Result<()> {
        let entry = JournalEntry {
            timestamp: Utc::now(),
            session: self.session,
            event,
        };

        let mut file = open_private_append(&self.path)?;
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        file.write_all(&line)?;
        Ok(())
    }

    /// Journal file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Session identifier stamped on every line.
    pub fn session(&self) -> Uuid {
        self.session
    }
}

/// Reads every entry from a journal file.
pub fn read_entries(path: impl AsRef<Path>) -> Result<Vec<JournalEntry>> {
    let reader = BufReader::new(File::open(path)?);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        entries.push(serde_json::from_str(&line)?);
    }
    Ok(entries)
}

fn open_private_append(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(JOURNAL_FILE_MODE);
    }
    Ok(options.open(path)?)
}

fn set_private_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(JOURNAL_FILE_MODE))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
