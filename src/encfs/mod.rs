//! encfs mount lifecycle: path preparation, mount inspection, tool
//! invocation, and the controller that verifies each operation.

/// External tool runner.
pub mod invoker;
/// Output markers and their translation into verdicts.
pub mod markers;
/// Mount table parsing and ownership checks.
pub mod mounts;

mod controller;
mod prepare;

pub use controller::{
    ControllerOptions, EncfsController, DEFAULT_MOUNT_OPTIONS, DEFAULT_MOUNT_READY_TIMEOUT,
};
pub use invoker::{
    Invocation, SystemToolInvoker, Tool, ToolBinaries, ToolInvoker, ToolOutput,
    DEFAULT_TOOL_TIMEOUT,
};
pub use mounts::{MountEntry, MountInspector, MountProbe, MountSignature, SystemMountProbe};
pub use prepare::{prepare_path, Prepared};
