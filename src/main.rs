use std::io::Write;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use encmount::cli::{render_error, run, Cli};

const LOG_ENV_VAR: &str = "ENCMOUNT_LOG";

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(format!("encmount={default_level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let error_format = cli.error_format;
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            let stderr = std::io::stderr();
            let mut handle = stderr.lock();
            let _ = handle.write_all(format!("{}\n", render_error(&error, error_format)).as_bytes());
            let _ = handle.flush();
            std::process::exit(1);
        }
    }
}
