use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    io::{self, Read, Write},
    process::{Child, Command, ExitStatus, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{error::InvocationError, types::SecretValue};

const EXEC_BUSY_RETRY_ATTEMPTS: usize = 20;
const EXEC_BUSY_RETRY_DELAY: Duration = Duration::from_millis(10);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(10);
/// Default upper bound for one external tool run.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

/// External binaries driven by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// Creates or opens a store and mounts it.
    Encfs,
    /// Store introspection and password management.
    Encfsctl,
    /// FUSE unmount helper.
    Fusermount,
}

impl Tool {
    /// Canonical tool name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Encfs => "encfs",
            Self::Encfsctl => "encfsctl",
            Self::Fusermount => "fusermount",
        }
    }
}

/// One external tool run: explicit argument vector, optional stdin secret.
#[derive(Debug)]
pub struct Invocation {
    /// Tool to execute.
    pub tool: Tool,
    /// Discrete arguments, never shell-interpreted.
    pub args: Vec<OsString>,
    /// Secret payload written to stdin.
    pub stdin: Option<SecretValue>,
    /// Capture stdout/stderr instead of discarding them.
    pub capture_output: bool,
}

impl Invocation {
    /// Starts an invocation with no arguments.
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            args: Vec::new(),
            stdin: None,
            capture_output: false,
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, value: impl AsRef<OsStr>) -> Self {
        self.args.push(value.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(values.into_iter().map(|value| value.as_ref().to_os_string()));
        self
    }

    /// Sets the stdin payload.
    pub fn stdin(mut self, payload: SecretValue) -> Self {
        self.stdin = Some(payload);
        self
    }

    /// Captures stdout and stderr.
    pub fn capture_output(mut self) -> Self {
        self.capture_output = true;
        self
    }
}

/// Exit status and captured output of one tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit status code.
    pub status_code: i32,
    /// Standard output.
    pub stdout: Vec<u8>,
    /// Standard error.
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    /// Returns `true` for a zero exit status.
    pub fn success(&self) -> bool {
        self.status_code == 0
    }

    /// Lossy, trimmed stderr text for diagnostics.
    pub fn stderr_text(&self) -> Cow<'_, str> {
        match String::from_utf8_lossy(&self.stderr) {
            Cow::Borrowed(text) => Cow::Borrowed(text.trim()),
            Cow::Owned(text) => Cow::Owned(text.trim().to_owned()),
        }
    }
}

/// Executes external tools on behalf of the controller.
pub trait ToolInvoker: Send + Sync {
    /// Runs one invocation to completion.
    fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, InvocationError>;
}

/// Binary names or paths for each tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBinaries {
    /// encfs binary.
    pub encfs: String,
    /// encfsctl binary.
    pub encfsctl: String,
    /// fusermount binary.
    pub fusermount: String,
}

impl ToolBinaries {
    /// Binary configured for `tool`.
    pub fn binary_for(&self, tool: Tool) -> &str {
        match tool {
            Tool::Encfs => &self.encfs,
            Tool::Encfsctl => &self.encfsctl,
            Tool::Fusermount => &self.fusermount,
        }
    }
}

impl Default for ToolBinaries {
    fn default() -> Self {
        Self {
            encfs: Tool::Encfs.name().to_owned(),
            encfsctl: Tool::Encfsctl.name().to_owned(),
            fusermount: Tool::Fusermount.name().to_owned(),
        }
    }
}

/// Runs tools as child processes with a bounded wait.
#[derive(Debug, Clone)]
pub struct SystemToolInvoker {
    binaries: ToolBinaries,
    timeout: Option<Duration>,
}

impl SystemToolInvoker {
    /// Uses default binary names and timeout.
    pub fn new() -> Self {
        Self::with_binaries(ToolBinaries::default())
    }

    /// Uses custom binaries with the default timeout.
    pub fn with_binaries(binaries: ToolBinaries) -> Self {
        Self {
            binaries,
            timeout: Some(DEFAULT_TOOL_TIMEOUT),
        }
    }

    /// Replaces the timeout; `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configured binaries.
    pub fn binaries(&self) -> &ToolBinaries {
        &self.binaries
    }
}

impl Default for SystemToolInvoker {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolInvoker for SystemToolInvoker {
    fn invoke(&self, invocation: &Invocation) -> Result<ToolOutput, InvocationError> {
        let binary = self.binaries.binary_for(invocation.tool);
        let mut child = retry_exec_busy(|| {
            let mut command = Command::new(binary);
            command.args(&invocation.args).stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
            if invocation.capture_output {
                command.stdout(Stdio::piped()).stderr(Stdio::piped());
            } else {
                command.stdout(Stdio::null()).stderr(Stdio::null());
            }
            command.spawn()
        })
        .map_err(|error| map_command_execution_error(binary, error))?;

        let stdout_reader = child.stdout.take().map(spawn_pipe_reader);
        let stderr_reader = child.stderr.take().map(spawn_pipe_reader);

        if let (Some(payload), Some(mut pipe)) = (&invocation.stdin, child.stdin.take()) {
            let written = payload.expose(|bytes| pipe.write_all(bytes));
            drop(pipe);
            if let Err(error) = written {
                if error.kind() != io::ErrorKind::BrokenPipe {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(launch_error(binary, error));
                }
            }
        }

        let status = wait_with_timeout(&mut child, binary, self.timeout)?;
        let stdout = collect_pipe(stdout_reader, binary)?;
        let stderr = collect_pipe(stderr_reader, binary)?;
        let status_code = status
            .code()
            .ok_or_else(|| InvocationError::Terminated(binary.to_owned()))?;
        Ok(ToolOutput {
            status_code,
            stdout,
            stderr,
        })
    }
}

fn spawn_pipe_reader<R>(mut pipe: R) -> JoinHandle<io::Result<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut bytes = Vec::new();
        pipe.read_to_end(&mut bytes)?;
        Ok(bytes)
    })
}

fn collect_pipe(
    reader: Option<JoinHandle<io::Result<Vec<u8>>>>,
    binary: &str,
) -> Result<Vec<u8>, InvocationError> {
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };
    reader
        .join()
        .map_err(|_| launch_error(binary, io::Error::other("output reader panicked")))?
        .map_err(|error| launch_error(binary, error))
}

fn wait_with_timeout(
    child: &mut Child,
    binary: &str,
    timeout: Option<Duration>,
) -> Result<ExitStatus, InvocationError> {
    let Some(timeout) = timeout else {
        return child.wait().map_err(|error| launch_error(binary, error));
    };

    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|error| launch_error(binary, error))?
        {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(InvocationError::TimedOut {
                binary: binary.to_owned(),
                timeout,
            });
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}

fn launch_error(binary: &str, source: io::Error) -> InvocationError {
    InvocationError::Launch {
        binary: binary.to_owned(),
        source,
    }
}

fn map_command_execution_error(binary: &str, error: io::Error) -> InvocationError {
    if error.kind() == io::ErrorKind::NotFound {
        return InvocationError::BinaryNotFound(binary.to_owned());
    }
    launch_error(binary, error)
}

fn retry_exec_busy<T, F>(mut operation: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let mut last_error = None;
    for attempt in 0..EXEC_BUSY_RETRY_ATTEMPTS {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) if is_exec_busy_error(&error) && attempt + 1 < EXEC_BUSY_RETRY_ATTEMPTS => {
                last_error = Some(error);
                thread::sleep(EXEC_BUSY_RETRY_DELAY);
            }
            Err(error) => return Err(error),
        }
    }

    Err(last_error.unwrap_or_else(|| io::Error::other("command execution failed")))
}

fn is_exec_busy_error(error: &io::Error) -> bool {
    error.kind() == io::ErrorKind::ExecutableFileBusy || error.raw_os_error() == Some(26)
}
