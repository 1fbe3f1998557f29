//! Translation of encfs/encfsctl output into domain verdicts.
//!
//! The tools report results as human-readable text; the literal markers below
//! are the only coupling to their output format. Markers are matched against
//! stdout only.

use super::invoker::ToolOutput;

/// Printed by `encfsctl autopasswd` after a successful rewrap.
pub const VOLUME_KEY_UPDATED: &str = "Volume Key successfully updated";
/// Printed by encfsctl password commands on a wrong password.
pub const INVALID_PASSWORD: &str = "Invalid password";
/// Printed by `encfsctl autocheckpasswd` on a correct password.
pub const PASSWORD_CORRECT: &str = "Password is correct";
/// Printed by `encfsctl <dir>` when no store config is present.
pub const CONFIG_UNREADABLE: &str = "Unable to load or parse config file";
/// Printed by `encfsctl <dir>` when describing a readable store.
pub const KEY_SIZE: &str = "Key Size:";

/// Result of a password rewrap attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewrapOutcome {
    /// The tool confirmed the volume key was rewrapped.
    Updated,
    /// No confirmation and a failing status.
    Failed,
    /// No confirmation but a zero status; must be re-verified.
    Unrecognized,
}

/// Result of a password check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordVerdict {
    /// The password opens the store.
    Correct,
    /// The tool explicitly rejected the password.
    Invalid,
    /// Output matched neither the accept nor the reject pattern.
    Inconclusive,
}

/// Result of a store probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreVerdict {
    /// Directory holds a readable store config.
    Valid,
    /// Directory holds no store config, or the probe failed.
    NotAStore,
    /// The tool succeeded without describing a store.
    Inconclusive,
}

/// Classifies `encfsctl autopasswd` output.
pub fn classify_rewrap(output: &ToolOutput) -> RewrapOutcome {
    if contains_marker(&output.stdout, VOLUME_KEY_UPDATED) {
        RewrapOutcome::Updated
    } else if output.success() {
        RewrapOutcome::Unrecognized
    } else {
        RewrapOutcome::Failed
    }
}

/// Classifies `encfsctl autocheckpasswd` output.
pub fn classify_password_check(output: &ToolOutput) -> PasswordVerdict {
    if output.success() && contains_marker(&output.stdout, PASSWORD_CORRECT) {
        PasswordVerdict::Correct
    } else if !output.success() && contains_marker(&output.stdout, INVALID_PASSWORD) {
        PasswordVerdict::Invalid
    } else {
        PasswordVerdict::Inconclusive
    }
}

/// Classifies `encfsctl <dir>` output.
pub fn classify_store_probe(output: &ToolOutput) -> StoreVerdict {
    if output.success() && contains_marker(&output.stdout, KEY_SIZE) {
        StoreVerdict::Valid
    } else if !output.success() || contains_marker(&output.stdout, CONFIG_UNREADABLE) {
        StoreVerdict::NotAStore
    } else {
        StoreVerdict::Inconclusive
    }
}

fn contains_marker(haystack: &[u8], marker: &str) -> bool {
    let needle = marker.as_bytes();
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack
            .windows(needle.len())
            .any(|window| window == needle)
}
