use std::{
    fs,
    path::{Component, Path, PathBuf},
    time::Duration,
};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use serde::{Deserialize, Serialize};

use crate::{
    encfs::{
        mounts::DEFAULT_MOUNT_TABLE, ControllerOptions, EncfsController, MountInspector,
        MountSignature, SystemMountProbe, SystemToolInvoker, ToolBinaries, DEFAULT_MOUNT_OPTIONS,
        DEFAULT_MOUNT_READY_TIMEOUT, DEFAULT_TOOL_TIMEOUT,
    },
    error::{EncmountError, Result},
};

const CONFIG_VERSION_V1: u32 = 1;
const RESERVED_MOUNT_OPTIONS: [&str; 3] = ["--stdinpass", "-S", "--extpass"];

/// Default bootstrap config file name.
pub const CONFIG_FILE_NAME: &str = ".encmount.toml";
/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "ENCMOUNT_CONFIG";

/// Source used to select the effective config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigSource {
    /// Selected via `--config` CLI flag.
    Flag,
    /// Selected via `ENCMOUNT_CONFIG` environment variable.
    Env,
    /// Selected by walking from the current working directory to root.
    Discovered,
    /// No config file selected.
    None,
}

/// Resolved config selection before parsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSelection {
    /// Source used for selection.
    pub source: ConfigSource,
    /// Selected path when a config file was found.
    pub path: Option<PathBuf>,
}

/// Raw TOML shape for one `.encmount.toml` file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EncmountConfigFile {
    /// Schema version.
    pub version: u32,
    /// External tool locations and limits.
    #[serde(default)]
    pub tools: ToolsConfigFile,
    /// Mount behavior.
    #[serde(default)]
    pub mount: MountConfigFile,
    /// Mount ownership signature.
    #[serde(default)]
    pub signature: SignatureConfigFile,
    /// Operation journal.
    #[serde(default)]
    pub journal: JournalConfigFile,
}

/// Raw `[tools]` section from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfigFile {
    /// encfs binary name or path.
    pub encfs: Option<String>,
    /// encfsctl binary name or path.
    pub encfsctl: Option<String>,
    /// fusermount binary name or path.
    pub fusermount: Option<String>,
    /// Per-invocation timeout.
    pub timeout_seconds: Option<u64>,
}

/// Raw `[mount]` section from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MountConfigFile {
    /// encfs options placed before `--stdinpass`.
    pub options: Option<Vec<String>>,
    /// Post-mount readiness poll window.
    pub ready_timeout_millis: Option<u64>,
    /// Mount table file in `/proc/mounts` format.
    pub mount_table: Option<String>,
}

/// Raw `[signature]` section from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SignatureConfigFile {
    /// Expected mount table device field.
    pub device: Option<String>,
    /// Expected mount table filesystem type.
    pub fstype: Option<String>,
}

/// Raw `[journal]` section from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct JournalConfigFile {
    /// JSONL journal location.
    pub path: Option<String>,
}

/// Effective, validated configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncmountConfig {
    /// Config file this was loaded from, if any.
    pub source_path: Option<PathBuf>,
    /// Tool binaries.
    pub binaries: ToolBinaries,
    /// Per-invocation timeout.
    pub tool_timeout: Duration,
    /// encfs options placed before `--stdinpass`.
    pub mount_options: Vec<String>,
    /// Post-mount readiness poll window.
    pub mount_ready_timeout: Duration,
    /// Mount table file.
    pub mount_table: PathBuf,
    /// Mount ownership signature.
    pub signature: MountSignature,
    /// Operation journal location.
    pub journal_path: Option<PathBuf>,
}

impl Default for EncmountConfig {
    fn default() -> Self {
        Self {
            source_path: None,
            binaries: ToolBinaries::default(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            mount_options: DEFAULT_MOUNT_OPTIONS
                .iter()
                .map(|option| (*option).to_owned())
                .collect(),
            mount_ready_timeout: DEFAULT_MOUNT_READY_TIMEOUT,
            mount_table: PathBuf::from(DEFAULT_MOUNT_TABLE),
            signature: MountSignature::default(),
            journal_path: None,
        }
    }
}

impl EncmountConfig {
    /// Loads and validates a config file from disk.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let absolute_path = absolutize_path(path.as_ref(), &cwd);
        if !absolute_path.exists() {
            return Err(EncmountError::InvalidInput(format!(
                "config file does not exist: {}",
                absolute_path.display()
            )));
        }

        validate_config_file_permissions(&absolute_path)?;
        let raw = fs::read_to_string(&absolute_path)?;
        Self::parse_from_str(&raw, &absolute_path)
    }

    /// Parses and validates config from TOML text.
    pub fn parse_from_str(raw: &str, source_path: impl AsRef<Path>) -> Result<Self> {
        let parsed = toml::from_str::<EncmountConfigFile>(raw).map_err(|error| {
            EncmountError::InvalidInput(format!("invalid config TOML: {error}"))
        })?;
        build_config(parsed, source_path.as_ref())
    }

    /// Loads the selected config file, or defaults when none was selected.
    pub fn load(selection: &ConfigSelection) -> Result<Self> {
        match selection.path.as_deref() {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    /// Mount tunables for the controller.
    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            mount_options: self.mount_options.clone(),
            mount_ready_timeout: self.mount_ready_timeout,
        }
    }

    /// Builds a controller driving the real tools and mount table.
    pub fn build_controller(&self) -> EncfsController<SystemToolInvoker, SystemMountProbe> {
        EncfsController::new(
            SystemToolInvoker::with_binaries(self.binaries.clone())
                .with_timeout(Some(self.tool_timeout)),
            MountInspector::new(
                SystemMountProbe::with_table(self.mount_table.clone()),
                self.signature.clone(),
            ),
            self.controller_options(),
        )
    }
}

/// Resolves which config file should be used.
pub fn resolve_config_path(
    explicit_path: Option<&Path>,
    env_path: Option<&str>,
    no_config: bool,
    cwd: impl AsRef<Path>,
) -> Result<ConfigSelection> {
    if no_config {
        return Ok(ConfigSelection {
            source: ConfigSource::None,
            path: None,
        });
    }

    let cwd = cwd.as_ref();
    if let Some(path) = explicit_path {
        let candidate = absolutize_path(path, cwd);
        if !is_regular_config_candidate(&candidate) {
            return Err(EncmountError::InvalidInput(format!(
                "config file must be a regular file: {}",
                candidate.display()
            )));
        }
        return Ok(ConfigSelection {
            source: ConfigSource::Flag,
            path: Some(candidate),
        });
    }

    if let Some(value) = env_path {
        if value.trim().is_empty() {
            return Err(EncmountError::InvalidInput(format!(
                "{CONFIG_ENV_VAR} cannot be empty"
            )));
        }

        let candidate = absolutize_path(Path::new(value), cwd);
        if !is_regular_config_candidate(&candidate) {
            return Err(EncmountError::InvalidInput(format!(
                "config file must be a regular file: {}",
                candidate.display()
            )));
        }
        return Ok(ConfigSelection {
            source: ConfigSource::Env,
            path: Some(candidate),
        });
    }

    if let Some(discovered) = discover_config(cwd) {
        return Ok(ConfigSelection {
            source: ConfigSource::Discovered,
            path: Some(discovered),
        });
    }

    Ok(ConfigSelection {
        source: ConfigSource::None,
        path: None,
    })
}

/// Walks from `start_dir` to the filesystem root looking for a config file.
pub fn discover_config(start_dir: impl AsRef<Path>) -> Option<PathBuf> {
    let mut current = start_dir.as_ref();
    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if is_regular_config_candidate(&candidate) {
            return Some(candidate);
        }

        let parent = current.parent()?;
        current = parent;
    }
}

fn build_config(raw: EncmountConfigFile, source_path: &Path) -> Result<EncmountConfig> {
    validate_raw_config(&raw)?;

    let source_path = absolutize_path(source_path, &std::env::current_dir()?);
    let source_dir = source_path.parent().unwrap_or(Path::new("."));
    let defaults = EncmountConfig::default();

    let binaries = ToolBinaries {
        encfs: resolve_binary_value(raw.tools.encfs, defaults.binaries.encfs, source_dir)?,
        encfsctl: resolve_binary_value(raw.tools.encfsctl, defaults.binaries.encfsctl, source_dir)?,
        fusermount: resolve_binary_value(
            raw.tools.fusermount,
            defaults.binaries.fusermount,
            source_dir,
        )?,
    };

    let mount_table = match raw.mount.mount_table.as_deref() {
        Some(value) => resolve_path_value(value, source_dir)?,
        None => defaults.mount_table,
    };
    let journal_path = raw
        .journal
        .path
        .as_deref()
        .map(|value| resolve_path_value(value, source_dir))
        .transpose()?;

    Ok(EncmountConfig {
        source_path: Some(source_path),
        binaries,
        tool_timeout: raw
            .tools
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(defaults.tool_timeout),
        mount_options: raw.mount.options.unwrap_or(defaults.mount_options),
        mount_ready_timeout: raw
            .mount
            .ready_timeout_millis
            .map(Duration::from_millis)
            .unwrap_or(defaults.mount_ready_timeout),
        mount_table,
        signature: MountSignature::new(
            raw.signature
                .device
                .unwrap_or_else(|| defaults.signature.device().to_owned()),
            raw.signature
                .fstype
                .unwrap_or_else(|| defaults.signature.fstype().to_owned()),
        ),
        journal_path,
    })
}

fn validate_raw_config(config: &EncmountConfigFile) -> Result<()> {
    if config.version != CONFIG_VERSION_V1 {
        return Err(EncmountError::InvalidInput(format!(
            "unsupported config version {} (expected {})",
            config.version, CONFIG_VERSION_V1
        )));
    }

    for (label, value) in [
        ("tools.encfs", &config.tools.encfs),
        ("tools.encfsctl", &config.tools.encfsctl),
        ("tools.fusermount", &config.tools.fusermount),
        ("mount.mount_table", &config.mount.mount_table),
        ("journal.path", &config.journal.path),
        ("signature.device", &config.signature.device),
        ("signature.fstype", &config.signature.fstype),
    ] {
        if let Some(value) = value {
            validate_non_empty_literal(value, label)?;
        }
    }

    if config.tools.timeout_seconds == Some(0) {
        return Err(EncmountError::InvalidInput(
            "tools.timeout_seconds must be greater than zero".to_owned(),
        ));
    }
    if config.mount.ready_timeout_millis == Some(0) {
        return Err(EncmountError::InvalidInput(
            "mount.ready_timeout_millis must be greater than zero".to_owned(),
        ));
    }

    if let Some(options) = config.mount.options.as_ref() {
        for option in options {
            validate_mount_option(option)?;
        }
    }

    Ok(())
}

fn validate_mount_option(option: &str) -> Result<()> {
    if option.trim().is_empty() {
        return Err(EncmountError::InvalidInput(
            "mount.options entries cannot be empty".to_owned(),
        ));
    }
    let name = option.split('=').next().unwrap_or(option);
    if RESERVED_MOUNT_OPTIONS.contains(&name) {
        return Err(EncmountError::InvalidInput(format!(
            "mount.options cannot contain '{name}': credentials are always passed on stdin"
        )));
    }
    Ok(())
}

fn resolve_binary_value(
    value: Option<String>,
    default: String,
    source_dir: &Path,
) -> Result<String> {
    let Some(value) = value else {
        return Ok(default);
    };
    if !value.contains('/') && !value.starts_with('~') {
        return Ok(value);
    }
    let resolved = resolve_path_value(&value, source_dir)?;
    Ok(resolved.to_string_lossy().into_owned())
}

fn resolve_path_value(value: &str, source_dir: &Path) -> Result<PathBuf> {
    validate_non_empty_literal(value, "path")?;

    let expanded = expand_home(value)?;
    let absolute = if expanded.is_absolute() {
        expanded
    } else {
        source_dir.join(expanded)
    };

    if let Ok(canonical) = fs::canonicalize(&absolute) {
        return Ok(canonical);
    }
    Ok(normalize_path(&absolute))
}

fn validate_non_empty_literal(value: &str, label: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EncmountError::InvalidInput(format!(
            "{label} cannot be empty"
        )));
    }
    Ok(())
}

fn expand_home(value: &str) -> Result<PathBuf> {
    if value == "~" {
        let home = std::env::var_os("HOME")
            .ok_or_else(|| EncmountError::InvalidInput("HOME is not set".to_owned()))?;
        return Ok(PathBuf::from(home));
    }

    if let Some(rest) = value.strip_prefix("~/") {
        let home = std::env::var_os("HOME")
            .ok_or_else(|| EncmountError::InvalidInput("HOME is not set".to_owned()))?;
        return Ok(PathBuf::from(home).join(rest));
    }

    if value.starts_with('~') {
        return Err(EncmountError::InvalidInput(
            "only '~' and '~/' home expansion are supported".to_owned(),
        ));
    }

    Ok(PathBuf::from(value))
}

fn normalize_path(path: &Path) -> PathBuf {
    let is_absolute = path.is_absolute();
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() && !is_absolute {
                    normalized.push("..");
                }
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    if normalized.as_os_str().is_empty() {
        if is_absolute {
            PathBuf::from(std::path::MAIN_SEPARATOR.to_string())
        } else {
            PathBuf::from(".")
        }
    } else {
        normalized
    }
}

fn absolutize_path(path: &Path, cwd: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&cwd.join(path))
    }
}

fn validate_config_file_permissions(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)?;
    if metadata.file_type().is_symlink() || !metadata.file_type().is_file() {
        return Err(EncmountError::InvalidInput(format!(
            "config path must be a regular file: {}",
            path.display()
        )));
    }

    #[cfg(unix)]
    {
        let mode = metadata.permissions().mode() & 0o777;
        if mode & 0o022 != 0 {
            return Err(EncmountError::InvalidInput(format!(
                "config file must not be group/world writable: {}",
                path.display()
            )));
        }
    }

    Ok(())
}

fn is_regular_config_candidate(path: &Path) -> bool {
    let Ok(metadata) = fs::symlink_metadata(path) else {
        return false;
    };
    !metadata.file_type().is_symlink() && metadata.file_type().is_file()
}
