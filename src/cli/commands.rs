use std::{env::VarError, path::Path};

use tracing::{debug, error};

use crate::{
    config::{resolve_config_path, EncmountConfig, CONFIG_ENV_VAR},
    encfs::{EncfsController, MountProbe, Prepared, ToolInvoker},
    error::{
        classify_error_code, explain_error_code, known_error_codes, CredentialError,
        EncmountError, Result,
    },
    journal::{JournalEvent, OperationJournal},
};

use super::{
    output::{self, OutputStatus},
    secret_input::{collect_credentials, CredentialPrompt},
    Cli, Command,
};

#[derive(Debug, serde::Serialize)]
struct StatusOutput<'a> {
    path: &'a Path,
    state: &'static str,
}

struct Outcome {
    message: String,
    event: Option<JournalEvent>,
}

impl Outcome {
    fn message(message: String) -> Self {
        Self {
            message,
            event: None,
        }
    }

    fn journaled(message: String, event: JournalEvent) -> Self {
        Self {
            message,
            event: Some(event),
        }
    }
}

pub(crate) fn run(cli: Cli) -> Result<i32> {
    if let Command::Explain { code } = &cli.command {
        return run_explain(code);
    }

    let config = load_config(&cli)?;
    let journal = config.journal_path.as_deref().and_then(open_journal);
    let controller = config.build_controller();

    let operation = cli.command.operation();
    let result = execute(&controller, &cli.command);
    record(journal.as_ref(), failure_event(operation, &cli.command, &result));
    let outcome = result?;
    record(journal.as_ref(), outcome.event);

    match output::stdout_line(&outcome.message) {
        Ok(OutputStatus::Written) | Ok(OutputStatus::BrokenPipe) => Ok(0),
        Err(error) => Err(EncmountError::Io(error)),
    }
}

fn execute<I, P>(controller: &EncfsController<I, P>, command: &Command) -> Result<Outcome>
where
    I: ToolInvoker,
    P: MountProbe,
{
    debug!(operation = command.operation(), "running command");
    match command {
        Command::Create {
            store,
            mount,
            stdin,
        } => {
            let credentials = collect_credentials(&[CredentialPrompt::New], *stdin)?;
            controller.try_create(store, mount, &credentials[0])?;
            Ok(Outcome::journaled(
                format!(
                    "created {} and mounted it at {}",
                    store.display(),
                    mount.display()
                ),
                JournalEvent::StoreCreated {
                    store: store.clone(),
                    mount: mount.clone(),
                },
            ))
        }
        Command::Mount {
            store,
            mount,
            stdin,
        } => {
            let credentials = collect_credentials(&[CredentialPrompt::Existing], *stdin)?;
            controller.try_mount(store, mount, &credentials[0])?;
            Ok(Outcome::journaled(
                format!("mounted {} at {}", store.display(), mount.display()),
                JournalEvent::Mounted {
                    store: store.clone(),
                    mount: mount.clone(),
                },
            ))
        }
        Command::Unmount { mount } => {
            controller.try_unmount(mount)?;
            Ok(Outcome::journaled(
                format!("unmounted {}", mount.display()),
                JournalEvent::Unmounted {
                    mount: mount.clone(),
                },
            ))
        }
        Command::Passwd { store, stdin } => {
            let credentials = collect_credentials(
                &[CredentialPrompt::Current, CredentialPrompt::New],
                *stdin,
            )?;
            controller.try_change_password(store, &credentials[0], &credentials[1])?;
            Ok(Outcome::journaled(
                "password changed".to_owned(),
                JournalEvent::PasswordChanged {
                    store: store.clone(),
                },
            ))
        }
        Command::CheckPassword { store, stdin } => {
            let credentials = collect_credentials(&[CredentialPrompt::Existing], *stdin)?;
            controller.try_check_password(store, &credentials[0])?;
            Ok(Outcome::journaled(
                "password accepted".to_owned(),
                JournalEvent::PasswordChecked {
                    store: store.clone(),
                    accepted: true,
                },
            ))
        }
        Command::IsValid { store } => {
            controller.try_is_valid_store(store)?;
            Ok(Outcome::message(format!(
                "valid encfs store: {}",
                store.display()
            )))
        }
        Command::Status { mount, json } => {
            let state = controller.state(mount)?;
            if *json {
                return Ok(Outcome::message(serde_json::to_string_pretty(
                    &StatusOutput {
                        path: mount,
                        state: state.as_str(),
                    },
                )?));
            }
            Ok(Outcome::message(state.as_str().to_owned()))
        }
        Command::Prepare { path } => {
            let message = match controller.prepare(path)? {
                Prepared::Created => format!("created {}", path.display()),
                Prepared::ReusedEmpty => format!("ready {}", path.display()),
            };
            Ok(Outcome::message(message))
        }
        Command::Explain { code } => Err(EncmountError::InvalidInput(format!(
            "explain {code} is handled before controller setup"
        ))),
    }
}

fn failure_event(
    operation: &'static str,
    command: &Command,
    result: &Result<Outcome>,
) -> Option<JournalEvent> {
    let Err(failure) = result else {
        return None;
    };
    let code = classify_error_code(failure).to_owned();
    match (command, failure) {
        (Command::Unmount { mount }, EncmountError::NotMounted(_))
        | (Command::Unmount { mount }, EncmountError::ForeignMount(_)) => {
            Some(JournalEvent::UnmountRefused {
                mount: mount.clone(),
                code,
            })
        }
        (Command::CheckPassword { store, .. }, EncmountError::Credential(CredentialError::Rejected)) => {
            Some(JournalEvent::PasswordChecked {
                store: store.clone(),
                accepted: false,
            })
        }
        (Command::Status { .. } | Command::Prepare { .. } | Command::IsValid { .. }, _) => None,
        (_, EncmountError::InvalidInput(_)) => None,
        _ => Some(JournalEvent::OperationFailed {
            operation: operation.to_owned(),
            code,
        }),
    }
}

fn open_journal(path: &Path) -> Option<OperationJournal> {
    match OperationJournal::open(path) {
        Ok(journal) => Some(journal),
        Err(open_error) => {
            error!(
                path = %path.display(),
                error = %open_error,
                "failed to open operation journal, continuing without it"
            );
            None
        }
    }
}

fn record(journal: Option<&OperationJournal>, event: Option<JournalEvent>) {
    let (Some(journal), Some(event)) = (journal, event) else {
        return;
    };
    if let Err(journal_error) = journal.record(event) {
        error!(
            path = %journal.path().display(),
            error = %journal_error,
            "failed to append operation journal"
        );
    }
}

fn load_config(cli: &Cli) -> Result<EncmountConfig> {
    let cwd = std::env::current_dir()?;
    let env_value = match std::env::var(CONFIG_ENV_VAR) {
        Ok(value) => Some(value),
        Err(VarError::NotPresent) => None,
        Err(VarError::NotUnicode(_)) => {
            return Err(EncmountError::InvalidInput(format!(
                "{CONFIG_ENV_VAR} must be valid UTF-8"
            )))
        }
    };
    let selection = resolve_config_path(
        cli.config.as_deref(),
        env_value.as_deref(),
        cli.no_config,
        &cwd,
    )?;
    debug!(source = ?selection.source, path = ?selection.path, "selected config");
    EncmountConfig::load(&selection)
}

fn run_explain(code: &str) -> Result<i32> {
    let Some(explanation) = explain_error_code(code) else {
        return Err(EncmountError::InvalidInput(format!(
            "unknown error code '{}'; known codes: {}",
            code.trim(),
            known_error_codes().join(", ")
        )));
    };
    match output::stdout_line(explanation) {
        Ok(OutputStatus::Written) | Ok(OutputStatus::BrokenPipe) => Ok(0),
        Err(error) => Err(EncmountError::Io(error)),
    }
}
