use std::{
    path::Path,
    thread,
    time::{Duration, Instant},
};

use tracing::{debug, error, warn};

use crate::{
    error::{
        classify_error_code, CredentialError, EncmountError, InspectionError, PrepareError,
        Result, StoreProbeError, VerificationError,
    },
    types::{Credential, MountState, SecretValue},
};

use super::{
    invoker::{Invocation, Tool, ToolInvoker, ToolOutput},
    markers::{
        classify_password_check, classify_rewrap, classify_store_probe, PasswordVerdict,
        RewrapOutcome, StoreVerdict,
    },
    mounts::{resolve_mount_path, MountInspector, MountProbe},
    prepare::{prepare_path, Prepared},
};

/// Options passed to encfs when none are configured.
pub const DEFAULT_MOUNT_OPTIONS: &[&str] = &["--standard"];
/// How long a fresh mount may take to appear in the mount table.
pub const DEFAULT_MOUNT_READY_TIMEOUT: Duration = Duration::from_secs(3);
const MOUNT_READY_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Tunables for mount operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerOptions {
    /// Arguments placed before `--stdinpass` on the encfs command line.
    pub mount_options: Vec<String>,
    /// Upper bound for the post-mount readiness poll.
    pub mount_ready_timeout: Duration,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            mount_options: DEFAULT_MOUNT_OPTIONS
                .iter()
                .map(|option| (*option).to_owned())
                .collect(),
            mount_ready_timeout: DEFAULT_MOUNT_READY_TIMEOUT,
        }
    }
}

/// Verified encfs lifecycle operations.
///
/// Every `try_*` operation returns a structured error describing why it
/// failed. The boolean counterparts collapse that into `false` and log the
/// reason.
pub struct EncfsController<I, P>
where
    I: ToolInvoker,
    P: MountProbe,
{
    invoker: I,
    inspector: MountInspector<P>,
    options: ControllerOptions,
}

impl<I, P> EncfsController<I, P>
where
    I: ToolInvoker,
    P: MountProbe,
{
    /// Constructs a controller.
    pub fn new(invoker: I, inspector: MountInspector<P>, options: ControllerOptions) -> Self {
        Self {
            invoker,
            inspector,
            options,
        }
    }

    /// Tool runner in use.
    pub fn invoker(&self) -> &I {
        &self.invoker
    }

    /// Mount inspector in use.
    pub fn inspector(&self) -> &MountInspector<P> {
        &self.inspector
    }

    /// Mount tunables in use.
    pub fn options(&self) -> &ControllerOptions {
        &self.options
    }

    /// Ensures `path` can serve as a store directory or mount point.
    pub fn prepare(&self, path: &Path) -> std::result::Result<Prepared, PrepareError> {
        prepare_path(path, self.inspector.probe())
    }

    /// Current mount state of `path`.
    pub fn state(&self, path: &Path) -> std::result::Result<MountState, InspectionError> {
        self.inspector.inspect(path)
    }

    /// Returns `true` only for an encfs mount at `path`.
    pub fn is_owned_mount(&self, path: &Path) -> bool {
        self.inspector.is_owned_mount(path)
    }

    /// Prepares both directories, then mounts a new store.
    pub fn try_create(&self, store: &Path, mount: &Path, credential: &Credential) -> Result<()> {
        credential.ensure_single_line()?;
        let store_state = self.prepare(store)?;
        let mount_state = self.prepare(mount)?;
        debug!(
            store = %store.display(),
            store_state = ?store_state,
            mount = %mount.display(),
            mount_state = ?mount_state,
            "prepared store and mount directories"
        );
        self.try_mount(store, mount, credential)
    }

    /// Mounts an existing store and verifies the result in the mount table.
    pub fn try_mount(&self, store: &Path, mount: &Path, credential: &Credential) -> Result<()> {
        let payload = SecretValue::from_lines(&[credential])?;
        if !store.is_dir() {
            return Err(EncmountError::StoreMissing(store.to_path_buf()));
        }
        self.prepare(mount)?;

        let store = resolve_mount_path(store);
        let mount = resolve_mount_path(mount);
        let output = self.invoker.invoke(
            &Invocation::new(Tool::Encfs)
                .args(&self.options.mount_options)
                .arg("--stdinpass")
                .arg(&store)
                .arg(&mount)
                .stdin(payload),
        )?;

        match self.wait_for_owned_mount(&mount, output.success()) {
            Ok(()) => Ok(()),
            Err(VerificationError::NeverMounted(_)) if !output.success() => {
                Err(tool_status(Tool::Encfs, &output).into())
            }
            Err(verification_error) => Err(verification_error.into()),
        }
    }

    /// Unmounts an encfs mount, refusing anything else.
    pub fn try_unmount(&self, path: &Path) -> Result<()> {
        let path = resolve_mount_path(path);
        match self.inspector.inspect(&path)? {
            MountState::Unmounted => return Err(EncmountError::NotMounted(path)),
            MountState::MountedForeign => return Err(EncmountError::ForeignMount(path)),
            MountState::MountedOwned => {}
        }

        let output = self.invoker.invoke(
            &Invocation::new(Tool::Fusermount)
                .arg("-u")
                .arg(&path)
                .capture_output(),
        )?;
        if self.inspector.is_mount_point(&path)? {
            return Err(VerificationError::StillMounted(path).into());
        }
        if !output.success() {
            return Err(tool_status(Tool::Fusermount, &output).into());
        }
        Ok(())
    }

    /// Rewraps the volume key under `new` and verifies the new password.
    pub fn try_change_password(
        &self,
        store: &Path,
        current: &Credential,
        new: &Credential,
    ) -> Result<()> {
        let payload = SecretValue::from_lines(&[current, new])?;
        let output = self.invoker.invoke(
            &Invocation::new(Tool::Encfsctl)
                .arg("autopasswd")
                .arg(store)
                .stdin(payload)
                .capture_output(),
        )?;
        match classify_rewrap(&output) {
            RewrapOutcome::Updated => {
                debug!(store = %store.display(), "volume key rewrap reported success");
            }
            RewrapOutcome::Unrecognized => {
                debug!(
                    store = %store.display(),
                    "volume key rewrap output unrecognized, verifying new password"
                );
            }
            RewrapOutcome::Failed => {
                if classify_password_check(&output) == PasswordVerdict::Invalid {
                    return Err(CredentialError::Rejected.into());
                }
                return Err(CredentialError::RewrapFailed {
                    status: output.status_code,
                }
                .into());
            }
        }

        match self.try_check_password(store, new) {
            Ok(()) => Ok(()),
            Err(EncmountError::Credential(_)) => Err(CredentialError::RewrapUnverified.into()),
            Err(other) => Err(other),
        }
    }

    /// Checks `credential` against the store without mounting it.
    pub fn try_check_password(&self, store: &Path, credential: &Credential) -> Result<()> {
        let payload = SecretValue::from_lines(&[credential])?;
        let output = self.invoker.invoke(
            &Invocation::new(Tool::Encfsctl)
                .arg("autocheckpasswd")
                .arg(store)
                .stdin(payload)
                .capture_output(),
        )?;
        match classify_password_check(&output) {
            PasswordVerdict::Correct => Ok(()),
            PasswordVerdict::Invalid => Err(CredentialError::Rejected.into()),
            PasswordVerdict::Inconclusive => Err(CredentialError::Inconclusive {
                status: output.status_code,
            }
            .into()),
        }
    }

    /// Asks encfsctl whether `store` holds a readable volume config.
    pub fn try_is_valid_store(&self, store: &Path) -> Result<()> {
        let output = self
            .invoker
            .invoke(&Invocation::new(Tool::Encfsctl).arg(store).capture_output())?;
        match classify_store_probe(&output) {
            StoreVerdict::Valid => Ok(()),
            StoreVerdict::NotAStore => Err(StoreProbeError::NotAStore.into()),
            StoreVerdict::Inconclusive => Err(StoreProbeError::Inconclusive {
                status: output.status_code,
            }
            .into()),
        }
    }

    /// Boolean form of [`Self::try_create`].
    pub fn create(&self, store: &Path, mount: &Path, credential: &Credential) -> bool {
        report("create", self.try_create(store, mount, credential))
    }

    /// Boolean form of [`Self::try_mount`].
    pub fn mount(&self, store: &Path, mount: &Path, credential: &Credential) -> bool {
        report("mount", self.try_mount(store, mount, credential))
    }

    /// Boolean form of [`Self::try_unmount`].
    pub fn unmount(&self, path: &Path) -> bool {
        report("unmount", self.try_unmount(path))
    }

    /// Boolean form of [`Self::try_change_password`].
    pub fn change_password(&self, store: &Path, current: &Credential, new: &Credential) -> bool {
        report(
            "change_password",
            self.try_change_password(store, current, new),
        )
    }

    /// Boolean form of [`Self::try_check_password`].
    pub fn check_password(&self, store: &Path, credential: &Credential) -> bool {
        report("check_password", self.try_check_password(store, credential))
    }

    /// Boolean form of [`Self::try_is_valid_store`].
    pub fn is_valid_store(&self, store: &Path) -> bool {
        report("is_valid_store", self.try_is_valid_store(store))
    }

    fn wait_for_owned_mount(
        &self,
        mount: &Path,
        poll: bool,
    ) -> std::result::Result<(), VerificationError> {
        let deadline = Instant::now()
            + if poll {
                self.options.mount_ready_timeout
            } else {
                Duration::ZERO
            };
        loop {
            let pending = match self.inspector.inspect(mount) {
                Ok(MountState::MountedOwned) => return Ok(()),
                Ok(MountState::MountedForeign) => {
                    return Err(VerificationError::MountedForeign(mount.to_path_buf()))
                }
                Ok(MountState::Unmounted) => VerificationError::NeverMounted(mount.to_path_buf()),
                Err(inspection_error) => VerificationError::Inspection(inspection_error),
            };
            if Instant::now() >= deadline {
                return Err(pending);
            }
            thread::sleep(MOUNT_READY_POLL_INTERVAL);
        }
    }
}

fn tool_status(tool: Tool, output: &ToolOutput) -> VerificationError {
    debug!(tool = tool.name(), stderr = %output.stderr_text(), "tool reported failure");
    VerificationError::ToolStatus {
        tool: tool.name().to_owned(),
        status: output.status_code,
    }
}

fn report(operation: &'static str, result: Result<()>) -> bool {
    let failure = match result {
        Ok(()) => {
            debug!(operation, "operation succeeded");
            return true;
        }
        Err(failure) => failure,
    };
    let code = classify_error_code(&failure);
    match failure {
        EncmountError::NotMounted(_)
        | EncmountError::ForeignMount(_)
        | EncmountError::Credential(CredentialError::Rejected)
        | EncmountError::StoreProbe(StoreProbeError::NotAStore) => {
            warn!(operation, code, error = %failure, "operation declined");
        }
        _ => {
            error!(operation, code, error = %failure, "operation failed");
        }
    }
    false
}
