use std::io::{self, Write};

use crate::error::{classify_error_code, EncmountError};

use super::ErrorFormatArg;

/// Result of writing to an output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputStatus {
    /// Write completed.
    Written,
    /// Stream was closed by the reader.
    BrokenPipe,
}

fn map_result(result: io::Result<()>) -> io::Result<OutputStatus> {
    match result {
        Ok(()) => Ok(OutputStatus::Written),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => Ok(OutputStatus::BrokenPipe),
        Err(error) => Err(error),
    }
}

/// Writes text and a newline to stdout.
pub(crate) fn stdout_line(text: &str) -> io::Result<OutputStatus> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    map_result(
        handle
            .write_all(text.as_bytes())
            .and_then(|_| handle.write_all(b"\n"))
            .and_then(|_| handle.flush()),
    )
}

/// Formats an error for stderr: `error[E201]: ...` or a JSON object.
pub fn render_error(error: &EncmountError, format: ErrorFormatArg) -> String {
    let code = classify_error_code(error);
    match format {
        ErrorFormatArg::Text => format!(
            "error[{code}]: {error}\nhint: run `encmount explain {code}` for recovery steps"
        ),
        ErrorFormatArg::Json => serde_json::json!({
            "error": {
                "code": code,
                "message": error.to_string(),
                "explain": format!("encmount explain {code}"),
            }
        })
        .to_string(),
    }
}
