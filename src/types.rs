use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};

use crate::error::{EncmountError, Result};

/// Characters that would split or truncate a line of piped input.
const LINE_BREAKING_CHARS: &[char] = &['\n', '\r', '\0'];

/// Password gating access to a store's decrypted view.
pub struct Credential {
    inner: Secret<String>,
}

impl Credential {
    /// Wraps a password value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            inner: Secret::new(value.into()),
        }
    }

    /// Exposes the password to a closure.
    pub fn expose<F, R>(&self, function: F) -> R
    where
        F: FnOnce(&str) -> R,
    {
        function(self.inner.expose_secret())
    }

    /// Returns `true` when the password is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.expose_secret().is_empty()
    }

    /// Rejects passwords that cannot travel as a single stdin line.
    pub fn ensure_single_line(&self) -> Result<()> {
        if self.inner.expose_secret().contains(LINE_BREAKING_CHARS) {
            return Err(EncmountError::InvalidInput(
                "password cannot contain line breaks or NUL bytes".to_owned(),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Secret bytes piped to a tool's stdin.
pub struct SecretValue {
    inner: Secret<Vec<u8>>,
}

impl SecretValue {
    /// Constructs a secret value from bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            inner: Secret::new(bytes),
        }
    }

    /// Builds a newline-terminated payload, one line per credential.
    ///
    /// Fails without building anything if any credential spans lines.
    pub fn from_lines(credentials: &[&Credential]) -> Result<Self> {
        for credential in credentials {
            credential.ensure_single_line()?;
        }
        let mut bytes = Vec::new();
        for credential in credentials {
            credential.expose(|value| bytes.extend_from_slice(value.as_bytes()));
            bytes.push(b'\n');
        }
        Ok(Self::new(bytes))
    }

    /// Exposes the secret bytes to a closure.
    pub fn expose<F, R>(&self, function: F) -> R
    where
        F: FnOnce(&[u8]) -> R,
    {
        function(self.inner.expose_secret())
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue([REDACTED])")
    }
}

/// Derived state of a mount point.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MountState {
    /// Path is not a mount point.
    Unmounted,
    /// Path is mounted by something without the encfs signature.
    MountedForeign,
    /// Path is an encfs mount.
    MountedOwned,
}

impl MountState {
    /// Stable label used in CLI output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unmounted => "unmounted",
            Self::MountedForeign => "mounted-foreign",
            Self::MountedOwned => "mounted-owned",
        }
    }

    /// Returns `true` for any mounted state.
    pub fn is_mounted(self) -> bool {
        !matches!(self, Self::Unmounted)
    }
}

impl std::fmt::Display for MountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
