mod commands;
mod output;
mod secret_input;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::error::Result;

pub use output::render_error;

const PATH_ARG_HELP: &str = "Directory path. Spaces and shell metacharacters are passed through literally.";
const ERROR_CODE_ARG_HELP: &str = "Error code from CLI stderr (example: `E201`).";
const ERROR_FORMAT_ARG_HELP: &str = "Error output format (`text` or `json`).";
const STDIN_ARG_HELP: &str =
    "Read credentials from stdin, one per line (trailing CR/LF trimmed) instead of prompting.";
const CLI_AFTER_HELP: &str = r#"Examples:
  encmount create ~/private.enc ~/private
  encmount unmount ~/private
  encmount mount ~/private.enc ~/private
  printf 'old\nnew\n' | encmount passwd ~/private.enc --stdin
  encmount status ~/private
  encmount explain E201

Logging:
  ENCMOUNT_LOG=debug encmount mount ~/private.enc ~/private

More help:
  encmount help <command>
"#;
const CREATE_COMMAND_AFTER_HELP: &str = r#"Examples:
  encmount create ~/private.enc ~/private
  printf 'PASSWORD\n' | encmount create /tmp/t/e /tmp/t/d --stdin

Notes:
  - Both directories must be missing or empty and must not be mount points.
  - Directories created before a failed mount are left in place.
"#;
const MOUNT_COMMAND_AFTER_HELP: &str = r#"Examples:
  encmount mount ~/private.enc ~/private

Recovery:
  If the store does not exist yet, run `encmount create <store> <mount>`.
"#;
const UNMOUNT_COMMAND_AFTER_HELP: &str = r#"Examples:
  encmount unmount ~/private

Notes:
  - Only encfs mounts are unmounted; anything else is refused (E201).
"#;
const PASSWD_COMMAND_AFTER_HELP: &str = r#"Examples:
  encmount passwd ~/private.enc
  printf 'old\nnew\n' | encmount passwd ~/private.enc --stdin

Notes:
  - The new password is verified after the volume key is rewrapped.
"#;
const STATUS_COMMAND_AFTER_HELP: &str = r#"Examples:
  encmount status ~/private

Output:
  unmounted | mounted-foreign | mounted-owned
"#;
const EXPLAIN_COMMAND_AFTER_HELP: &str = r#"Examples:
  encmount explain E201
  encmount explain e300

Tip:
  Error codes are shown in stderr output, for example `error[E201]: ...`.
"#;

/// Top-level command line parser.
#[derive(Debug, Parser)]
#[command(
    name = "encmount",
    version,
    about = "Verified create, mount, unmount, and password management for encfs stores.",
    after_help = CLI_AFTER_HELP,
    infer_subcommands = true,
    arg_required_else_help = true,
    next_line_help = true
)]
pub struct Cli {
    /// Config file override path.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Disable config loading and discovery.
    #[arg(long)]
    pub no_config: bool,
    /// Log at debug level unless `ENCMOUNT_LOG` is set.
    #[arg(long, short)]
    pub verbose: bool,
    /// Error output format.
    #[arg(long, value_enum, default_value_t = ErrorFormatArg::Text, help = ERROR_FORMAT_ARG_HELP)]
    pub error_format: ErrorFormatArg,
    /// Subcommand.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported CLI commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Creates a new store and mounts it.
    #[command(after_help = CREATE_COMMAND_AFTER_HELP)]
    Create {
        /// Store (ciphertext) directory.
        #[arg(help = PATH_ARG_HELP)]
        store: PathBuf,
        /// Mount point (plaintext view).
        #[arg(help = PATH_ARG_HELP)]
        mount: PathBuf,
        /// Read the password from stdin.
        #[arg(long, help = STDIN_ARG_HELP)]
        stdin: bool,
    },
    /// Mounts an existing store.
    #[command(after_help = MOUNT_COMMAND_AFTER_HELP)]
    Mount {
        /// Store (ciphertext) directory.
        #[arg(help = PATH_ARG_HELP)]
        store: PathBuf,
        /// Mount point (plaintext view).
        #[arg(help = PATH_ARG_HELP)]
        mount: PathBuf,
        /// Read the password from stdin.
        #[arg(long, help = STDIN_ARG_HELP)]
        stdin: bool,
    },
    /// Unmounts an encfs mount point.
    #[command(visible_alias = "umount", after_help = UNMOUNT_COMMAND_AFTER_HELP)]
    Unmount {
        /// Mount point.
        #[arg(help = PATH_ARG_HELP)]
        mount: PathBuf,
    },
    /// Changes a store password.
    #[command(after_help = PASSWD_COMMAND_AFTER_HELP)]
    Passwd {
        /// Store directory.
        #[arg(help = PATH_ARG_HELP)]
        store: PathBuf,
        /// Read current and new password from stdin.
        #[arg(long, help = STDIN_ARG_HELP)]
        stdin: bool,
    },
    /// Checks a store password without mounting.
    CheckPassword {
        /// Store directory.
        #[arg(help = PATH_ARG_HELP)]
        store: PathBuf,
        /// Read the password from stdin.
        #[arg(long, help = STDIN_ARG_HELP)]
        stdin: bool,
    },
    /// Checks whether a directory holds an encfs store.
    IsValid {
        /// Directory to probe.
        #[arg(help = PATH_ARG_HELP)]
        store: PathBuf,
    },
    /// Prints the mount state of a path.
    #[command(after_help = STATUS_COMMAND_AFTER_HELP)]
    Status {
        /// Path to inspect.
        #[arg(help = PATH_ARG_HELP)]
        mount: PathBuf,
        /// Print structured JSON output.
        #[arg(long)]
        json: bool,
    },
    /// Creates or validates a directory for use as store or mount point.
    Prepare {
        /// Directory path.
        #[arg(help = PATH_ARG_HELP)]
        path: PathBuf,
    },
    /// Explains a stable error code with recovery guidance.
    #[command(after_help = EXPLAIN_COMMAND_AFTER_HELP)]
    Explain {
        /// Error code from stderr (for example: `E201`).
        #[arg(help = ERROR_CODE_ARG_HELP)]
        code: String,
    },
}

impl Command {
    /// Operation name used in logs and the journal.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Mount { .. } => "mount",
            Self::Unmount { .. } => "unmount",
            Self::Passwd { .. } => "change_password",
            Self::CheckPassword { .. } => "check_password",
            Self::IsValid { .. } => "is_valid_store",
            Self::Status { .. } => "status",
            Self::Prepare { .. } => "prepare",
            Self::Explain { .. } => "explain",
        }
    }
}

/// Error format argument.
#[derive(Debug, Clone, Copy, ValueEnum, Eq, PartialEq)]
pub enum ErrorFormatArg {
    /// Human-readable text diagnostics.
    Text,
    /// Machine-readable JSON diagnostics.
    Json,
}

/// Runs CLI and returns process exit code.
pub fn run(cli: Cli) -> Result<i32> {
    commands::run(cli)
}
