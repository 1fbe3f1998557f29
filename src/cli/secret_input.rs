use std::io::{self, BufRead};

use crate::{
    error::{EncmountError, Result},
    types::Credential,
};

/// Kind of password a command needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CredentialPrompt {
    /// Password of an existing store.
    Existing,
    /// Current password before rotation.
    Current,
    /// New password, confirmed when prompting interactively.
    New,
}

/// Collects one credential per prompt from stdin lines or the terminal.
pub(crate) fn collect_credentials(
    prompts: &[CredentialPrompt],
    stdin: bool,
) -> Result<Vec<Credential>> {
    if stdin {
        return read_stdin_credentials(io::stdin().lock(), prompts.len());
    }
    prompts.iter().map(|prompt| prompt_credential(*prompt)).collect()
}

pub(crate) fn read_stdin_credentials(reader: impl BufRead, count: usize) -> Result<Vec<Credential>> {
    let mut lines = reader.lines();
    let mut credentials = Vec::with_capacity(count);
    for index in 0..count {
        let mut line = lines.next().transpose()?.ok_or_else(|| {
            EncmountError::InvalidInput(format!(
                "stdin ended before credential {} of {count}",
                index + 1
            ))
        })?;
        while line.ends_with('\r') {
            line.pop();
        }
        credentials.push(non_empty(line)?);
    }
    Ok(credentials)
}

fn prompt_credential(prompt: CredentialPrompt) -> Result<Credential> {
    match prompt {
        CredentialPrompt::Existing => non_empty(rpassword::prompt_password("Password: ")?),
        CredentialPrompt::Current => non_empty(rpassword::prompt_password("Current password: ")?),
        CredentialPrompt::New => {
            let first = rpassword::prompt_password("New password: ")?;
            let second = rpassword::prompt_password("Confirm new password: ")?;
            if first != second {
                return Err(EncmountError::InvalidInput(
                    "passwords do not match".to_owned(),
                ));
            }
            non_empty(first)
        }
    }
}

fn non_empty(value: String) -> Result<Credential> {
    if value.is_empty() {
        return Err(EncmountError::InvalidInput(
            "password cannot be empty".to_owned(),
        ));
    }
    Ok(Credential::new(value))
}
