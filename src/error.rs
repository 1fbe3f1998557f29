use std::{io, path::PathBuf, time::Duration};

use thiserror::Error;

/// Reasons a path cannot serve as a store directory or mount anchor.
#[derive(Debug, Error)]
pub enum PrepareError {
    /// Path exists but is not a directory.
    #[error("{0} exists and is not a directory")]
    NotADirectory(PathBuf),
    /// Directory already has entries.
    #[error("{0} is not empty")]
    NotEmpty(PathBuf),
    /// Directory is an active mount point.
    #[error("{0} is already a mount point in use")]
    AlreadyMounted(PathBuf),
    /// Directory (or one of its parents) could not be created.
    #[error("failed to create {path}: {source}")]
    CreateFailed {
        /// Path that was being created.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },
    /// Existing directory could not be listed or probed.
    #[error("{path} cannot be inspected: {source}")]
    Inaccessible {
        /// Path that was being inspected.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },
}

/// Inconsistencies hit while classifying a mount point.
#[derive(Debug, Error)]
pub enum InspectionError {
    /// Mount-point probe on the path itself failed.
    #[error("failed to probe {path}: {source}")]
    Probe {
        /// Probed path.
        path: PathBuf,
        /// Underlying I/O failure.
        source: io::Error,
    },
    /// System mount table could not be read.
    #[error("failed to read mount table: {0}")]
    MountTable(io::Error),
    /// Path reports as a mount point but has no mount table entry.
    #[error("{0} is a mount point but has no mount table entry")]
    EntryMissing(PathBuf),
}

/// Failures to run an external tool to completion.
#[derive(Debug, Error)]
pub enum InvocationError {
    /// Binary could not be located.
    #[error("required binary not found: {0}")]
    BinaryNotFound(String),
    /// Process could not be spawned or its pipes failed.
    #[error("failed to run {binary}: {source}")]
    Launch {
        /// Binary that was launched.
        binary: String,
        /// Underlying I/O failure.
        source: io::Error,
    },
    /// Process ended without an exit code.
    #[error("{0} was terminated by a signal")]
    Terminated(String),
    /// Process exceeded the configured timeout and was killed.
    #[error("{binary} did not finish within {}s", .timeout.as_secs())]
    TimedOut {
        /// Binary that timed out.
        binary: String,
        /// Configured timeout.
        timeout: Duration,
    },
}

/// Post-conditions on mount state that did not hold.
#[derive(Debug, Error)]
pub enum VerificationError {
    /// Mount point never appeared after the mount tool ran.
    #[error("{0} did not become a mount point")]
    NeverMounted(PathBuf),
    /// Something is mounted but it does not carry the encfs signature.
    #[error("{0} is mounted but is not an encfs mount")]
    MountedForeign(PathBuf),
    /// Mount state could not be determined.
    #[error(transparent)]
    Inspection(#[from] InspectionError),
    /// Mount point is still present after unmounting.
    #[error("{0} is still mounted")]
    StillMounted(PathBuf),
    /// Tool exited with a failure status.
    #[error("{tool} exited with status {status}")]
    ToolStatus {
        /// Tool name.
        tool: String,
        /// Exit status code.
        status: i32,
    },
}

/// Password check and rotation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// Tool explicitly rejected the password.
    #[error("password rejected")]
    Rejected,
    /// Tool output matched neither the accept nor the reject pattern.
    #[error("password check was inconclusive (exit status {status})")]
    Inconclusive {
        /// Exit status code.
        status: i32,
    },
    /// Key rewrap reported failure.
    #[error("volume key update failed (exit status {status})")]
    RewrapFailed {
        /// Exit status code.
        status: i32,
    },
    /// Rewrap appeared to succeed but the new password does not verify.
    #[error("volume key update could not be verified with the new password")]
    RewrapUnverified,
}

/// Reasons a directory is not reported as a valid store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreProbeError {
    /// Tool could not load a volume configuration.
    #[error("not an encfs store")]
    NotAStore,
    /// Tool output matched neither pattern.
    #[error("store probe was inconclusive (exit status {status})")]
    Inconclusive {
        /// Exit status code.
        status: i32,
    },
}

/// Top-level application errors.
#[derive(Debug, Error)]
pub enum EncmountError {
    /// Store or mount path failed preparation.
    #[error(transparent)]
    Prepare(#[from] PrepareError),
    /// Store directory does not exist.
    #[error("store directory does not exist: {0}")]
    StoreMissing(PathBuf),
    /// Nothing is mounted at the path.
    #[error("{0} is not a mount point, nothing to unmount")]
    NotMounted(PathBuf),
    /// Path is mounted by something other than encfs.
    #[error("refusing to act on non-encfs mount at {0}")]
    ForeignMount(PathBuf),
    /// Mount state could not be inspected.
    #[error(transparent)]
    Inspection(#[from] InspectionError),
    /// External tool could not run.
    #[error(transparent)]
    Invocation(#[from] InvocationError),
    /// Operation post-condition did not hold.
    #[error(transparent)]
    Verification(#[from] VerificationError),
    /// Password failure.
    #[error(transparent)]
    Credential(#[from] CredentialError),
    /// Store introspection failure.
    #[error(transparent)]
    StoreProbe(#[from] StoreProbeError),
    /// Input was syntactically valid but semantically unsupported.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// I/O error.
    #[error(transparent)]
    Io(#[from] io::Error),
    /// JSON serialization error.
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// A typed result used across the crate.
pub type Result<T> = std::result::Result<T, EncmountError>;

/// Generic invalid-input error.
pub const ERROR_CODE_INVALID_INPUT: &str = "E100";
/// Path preparation failure.
pub const ERROR_CODE_PREPARE: &str = "E101";
/// Store directory is missing.
pub const ERROR_CODE_STORE_MISSING: &str = "E102";
/// Nothing mounted at the path.
pub const ERROR_CODE_NOT_MOUNTED: &str = "E200";
/// Foreign mount refused.
pub const ERROR_CODE_FOREIGN_MOUNT: &str = "E201";
/// Mount post-condition failed.
pub const ERROR_CODE_VERIFICATION: &str = "E202";
/// Mount table inconsistency.
pub const ERROR_CODE_INSPECTION: &str = "E203";
/// Password rejected.
pub const ERROR_CODE_CREDENTIAL_REJECTED: &str = "E300";
/// Password check or rotation did not produce a clear verdict.
pub const ERROR_CODE_CREDENTIAL_UNVERIFIED: &str = "E301";
/// Directory is not a valid store.
pub const ERROR_CODE_NOT_A_STORE: &str = "E302";
/// Tool could not run.
pub const ERROR_CODE_INVOCATION: &str = "E400";
/// Filesystem or stream I/O failed.
pub const ERROR_CODE_IO: &str = "E900";
/// Internal serialization failure.
pub const ERROR_CODE_INTERNAL: &str = "E999";

const ERROR_EXPLANATION_E100: &str = r#"E100 invalid input

The command arguments or config values are syntactically valid but unsupported.

Common fixes:
  - Run `encmount help <command>` for exact argument usage.
  - Check `.encmount.toml` for zero timeouts or empty signature fields."#;
const ERROR_EXPLANATION_E101: &str = r#"E101 path preparation failed

Store and mount directories must be missing, or existing empty directories
that are not already mount points.

Recovery:
  - Choose a path that does not exist yet, or empty the directory.
  - If the path is mounted, unmount it first: `encmount unmount <path>`."#;
const ERROR_EXPLANATION_E102: &str = r#"E102 store directory missing

`mount` only opens existing stores.

Recovery:
  encmount create <store> <mount>"#;
const ERROR_EXPLANATION_E200: &str = r#"E200 not a mount point

The path is not currently mounted, so there was nothing to unmount.

Recovery:
  encmount status <mount>"#;
const ERROR_EXPLANATION_E201: &str = r#"E201 foreign mount

The path is mounted, but the mount table entry does not carry the encfs
device and filesystem type. encmount never unmounts filesystems it does not own.

Recovery:
  - Inspect the mount with `findmnt <mount>`.
  - Adjust `[signature]` in `.encmount.toml` if encfs reports a different type."#;
const ERROR_EXPLANATION_E202: &str = r#"E202 mount verification failed

The tool ran, but the mount point did not reach the expected state.

Recovery:
  - Run `encmount status <mount>`.
  - Check the credential and retry; raise `[mount] ready_timeout_millis` on slow systems."#;
const ERROR_EXPLANATION_E203: &str = r#"E203 mount table inconsistency

The path reports as a mount point but the mount table could not be read or
has no entry for it. This is usually transient.

Recovery:
  - Retry the command.
  - Verify `[mount] mount_table` points at a readable mount table."#;
const ERROR_EXPLANATION_E300: &str = r#"E300 password rejected

encfsctl reported that the password is invalid for this store."#;
const ERROR_EXPLANATION_E301: &str = r#"E301 credential result unverified

The password tool produced output that matched neither the success nor the
rejection pattern, or a rotated password did not verify afterwards.

Recovery:
  - Run `encmount check-password <store>` with each candidate password.
  - Check that the installed encfsctl version prints the expected messages."#;
const ERROR_EXPLANATION_E302: &str = r#"E302 not an encfs store

encfsctl could not load a volume configuration from the directory."#;
const ERROR_EXPLANATION_E400: &str = r#"E400 tool invocation failed

encfs, encfsctl, or fusermount could not be launched, was killed, or timed out.

Recovery:
  - Install the missing binary or set its path under `[tools]`.
  - Raise `[tools] timeout_seconds` if the tool is slow."#;
const ERROR_EXPLANATION_E900: &str = r#"E900 I/O failure

Filesystem or stream operations failed.

Recovery:
  - Check file permissions and available disk space."#;
const ERROR_EXPLANATION_E999: &str = r#"E999 internal runtime failure

An internal serialization error occurred.

Recovery:
  - Retry once with the same inputs.
  - If it persists, collect the command and stderr for diagnosis."#;

const KNOWN_ERROR_CODES: [&str; 13] = [
    ERROR_CODE_INVALID_INPUT,
    ERROR_CODE_PREPARE,
    ERROR_CODE_STORE_MISSING,
    ERROR_CODE_NOT_MOUNTED,
    ERROR_CODE_FOREIGN_MOUNT,
    ERROR_CODE_VERIFICATION,
    ERROR_CODE_INSPECTION,
    ERROR_CODE_CREDENTIAL_REJECTED,
    ERROR_CODE_CREDENTIAL_UNVERIFIED,
    ERROR_CODE_NOT_A_STORE,
    ERROR_CODE_INVOCATION,
    ERROR_CODE_IO,
    ERROR_CODE_INTERNAL,
];

/// Returns the stable error code for a runtime error.
pub fn classify_error_code(error: &EncmountError) -> &'static str {
    match error {
        EncmountError::InvalidInput(_) => ERROR_CODE_INVALID_INPUT,
        EncmountError::Prepare(_) => ERROR_CODE_PREPARE,
        EncmountError::StoreMissing(_) => ERROR_CODE_STORE_MISSING,
        EncmountError::NotMounted(_) => ERROR_CODE_NOT_MOUNTED,
        EncmountError::ForeignMount(_)
        | EncmountError::Verification(VerificationError::MountedForeign(_)) => {
            ERROR_CODE_FOREIGN_MOUNT
        }
        EncmountError::Inspection(_)
        | EncmountError::Verification(VerificationError::Inspection(_)) => ERROR_CODE_INSPECTION,
        EncmountError::Verification(_) => ERROR_CODE_VERIFICATION,
        EncmountError::Credential(CredentialError::Rejected) => ERROR_CODE_CREDENTIAL_REJECTED,
        EncmountError::Credential(_) => ERROR_CODE_CREDENTIAL_UNVERIFIED,
        EncmountError::StoreProbe(_) => ERROR_CODE_NOT_A_STORE,
        EncmountError::Invocation(_) => ERROR_CODE_INVOCATION,
        EncmountError::Io(_) => ERROR_CODE_IO,
        EncmountError::Serde(_) => ERROR_CODE_INTERNAL,
    }
}

/// Normalizes a user-provided error code for lookups.
pub fn normalize_error_code(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Returns an explanation block for a known error code.
pub fn explain_error_code(raw: &str) -> Option<&'static str> {
    let normalized = normalize_error_code(raw);
    match normalized.as_str() {
        ERROR_CODE_INVALID_INPUT => Some(ERROR_EXPLANATION_E100),
        ERROR_CODE_PREPARE => Some(ERROR_EXPLANATION_E101),
        ERROR_CODE_STORE_MISSING => Some(ERROR_EXPLANATION_E102),
        ERROR_CODE_NOT_MOUNTED => Some(ERROR_EXPLANATION_E200),
        ERROR_CODE_FOREIGN_MOUNT => Some(ERROR_EXPLANATION_E201),
        ERROR_CODE_VERIFICATION => Some(ERROR_EXPLANATION_E202),
        ERROR_CODE_INSPECTION => Some(ERROR_EXPLANATION_E203),
        ERROR_CODE_CREDENTIAL_REJECTED => Some(ERROR_EXPLANATION_E300),
        ERROR_CODE_CREDENTIAL_UNVERIFIED => Some(ERROR_EXPLANATION_E301),
        ERROR_CODE_NOT_A_STORE => Some(ERROR_EXPLANATION_E302),
        ERROR_CODE_INVOCATION => Some(ERROR_EXPLANATION_E400),
        ERROR_CODE_IO => Some(ERROR_EXPLANATION_E900),
        ERROR_CODE_INTERNAL => Some(ERROR_EXPLANATION_E999),
        _ => None,
    }
}

/// Stable list of explainable error codes.
pub fn known_error_codes() -> &'static [&'static str] {
    &KNOWN_ERROR_CODES
}
